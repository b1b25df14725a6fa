use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{is_stale, merge_update, DeviceCodeStore, StoreError, DEFAULT_TTL};
use crate::device_code::DeviceCode;

/// Default period between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Maps {
    codes: HashMap<String, DeviceCode>,
    user_codes: HashMap<String, String>,
}

impl Maps {
    fn sweep(&mut self, ttl: Duration) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .codes
            .values()
            .filter(|code| is_stale(code, ttl, now))
            .map(|code| code.device_code.clone())
            .collect();
        for device_code in &expired {
            self.evict(device_code);
        }
        expired.len()
    }

    /// Remove a record and its index entry, if the entry still points at it.
    fn evict(&mut self, device_code: &str) -> Option<DeviceCode> {
        let code = self.codes.remove(device_code)?;
        if self.user_codes.get(&code.user_code).map(String::as_str) == Some(device_code) {
            self.user_codes.remove(&code.user_code);
        }
        Some(code)
    }

    fn live(&self, device_code: &str, ttl: Duration, now: DateTime<Utc>) -> Option<&DeviceCode> {
        self.codes
            .get(device_code)
            .filter(|code| !is_stale(code, ttl, now))
    }
}

/// In-process device-code store.
///
/// Both indexes sit behind a single reader/writer lock. Expired records are
/// hidden from reads immediately and physically removed by a sweep task
/// started with [`start_sweeper`](Self::start_sweeper).
///
/// # Example
/// ```
/// use devauth::store::MemoryDeviceCodeStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryDeviceCodeStore::new();
/// store.start_sweeper();
/// // ...
/// store.shutdown().await;
/// # }
/// ```
pub struct MemoryDeviceCodeStore {
    maps: Arc<RwLock<Maps>>,
    ttl: Duration,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    stop: CancellationToken,
}

impl Default for MemoryDeviceCodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDeviceCodeStore {
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_TTL, DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_settings(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            maps: Arc::new(RwLock::new(Maps::default())),
            ttl,
            sweep_interval,
            sweeper: Mutex::new(None),
            stop: CancellationToken::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Spawn the periodic sweep on the current tokio runtime.
    ///
    /// Returns `false` without spawning if a sweeper already exists or the
    /// store has been shut down.
    pub fn start_sweeper(&self) -> bool {
        let Ok(mut slot) = self.sweeper.lock() else {
            return false;
        };
        if slot.is_some() || self.stop.is_cancelled() {
            return false;
        }

        let maps = Arc::clone(&self.maps);
        let ttl = self.ttl;
        let period = self.sweep_interval;
        let stop = self.stop.clone();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => sweep_once(&maps, ttl),
                }
            }
            tracing::debug!("device code sweeper stopped");
        }));
        true
    }

    /// Stop the sweep task and wait for it to finish.
    pub async fn shutdown(&self) {
        self.stop.cancel();
        let handle = self.sweeper.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "device code sweeper ended abnormally");
            }
        }
    }

    /// Remove every record older than the TTL. Returns how many went.
    pub fn sweep_expired(&self) -> Result<usize, StoreError> {
        let mut maps = self.maps.write()?;
        Ok(maps.sweep(self.ttl))
    }

    /// Number of records held, expired or not.
    pub fn len(&self) -> usize {
        self.maps.read().map(|maps| maps.codes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sweep_once(maps: &RwLock<Maps>, ttl: Duration) {
    match maps.write() {
        Ok(mut guard) => {
            let removed = guard.sweep(ttl);
            if removed > 0 {
                tracing::debug!(removed, "swept expired device codes");
            }
        }
        Err(_) => tracing::warn!("device code sweep skipped: store lock poisoned"),
    }
}

impl Drop for MemoryDeviceCodeStore {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[async_trait]
impl DeviceCodeStore for MemoryDeviceCodeStore {
    async fn save(&self, code: &DeviceCode) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut maps = self.maps.write()?;
        if maps.codes.contains_key(&code.device_code) {
            if maps.live(&code.device_code, self.ttl, now).is_some() {
                return Err(StoreError::AlreadyExists("device code".to_string()));
            }
            maps.evict(&code.device_code);
        }
        if let Some(owner) = maps.user_codes.get(&code.user_code).cloned() {
            if maps.live(&owner, self.ttl, now).is_some() {
                return Err(StoreError::AlreadyExists("user code".to_string()));
            }
            // Expired but not yet swept.
            maps.evict(&owner);
        }
        maps.user_codes
            .insert(code.user_code.clone(), code.device_code.clone());
        maps.codes.insert(code.device_code.clone(), code.clone());
        Ok(())
    }

    async fn get(&self, device_code: &str) -> Result<DeviceCode, StoreError> {
        let maps = self.maps.read()?;
        maps.live(device_code, self.ttl, Utc::now())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_user_code(&self, user_code: &str) -> Result<DeviceCode, StoreError> {
        let maps = self.maps.read()?;
        let device_code = maps
            .user_codes
            .get(user_code)
            .ok_or(StoreError::UserCodeNotFound)?;
        maps.live(device_code, self.ttl, Utc::now())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, code: &DeviceCode) -> Result<(), StoreError> {
        let ttl = self.ttl;
        let mut maps = self.maps.write()?;
        let existing = maps
            .codes
            .get_mut(&code.device_code)
            .filter(|existing| !is_stale(existing, ttl, Utc::now()))
            .ok_or(StoreError::NotFound)?;
        *existing = merge_update(existing, code)?;
        Ok(())
    }

    async fn record_poll(
        &self,
        device_code: &str,
        at: DateTime<Utc>,
    ) -> Result<DeviceCode, StoreError> {
        let ttl = self.ttl;
        let mut maps = self.maps.write()?;
        let existing = maps
            .codes
            .get_mut(device_code)
            .filter(|existing| !is_stale(existing, ttl, Utc::now()))
            .ok_or(StoreError::NotFound)?;
        existing.last_poll = existing.last_poll.max(Some(at));
        Ok(existing.clone())
    }

    async fn delete(&self, device_code: &str) -> Result<(), StoreError> {
        let mut maps = self.maps.write()?;
        let code = maps.evict(device_code).ok_or(StoreError::NotFound)?;
        // An expired record is removed all the same, but reads already
        // treat it as gone.
        if is_stale(&code, self.ttl, Utc::now()) {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
