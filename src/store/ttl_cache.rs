use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::StoreError;

/// Minimal key-value cache with native per-key expiry.
///
/// Shaped after the Redis `GET`/`SET EX`/`TTL`/`DEL` commands so a shared
/// cache can back [`CacheDeviceCodeStore`](super::CacheDeviceCodeStore).
#[async_trait]
pub trait TtlCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remaining lifetime of a key. `None` if the key is missing or has no
    /// expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process [`TtlCache`] for single-node deployments and tests.
///
/// Expired keys are dropped lazily on access. Uses tokio's clock, so paused
/// test time drives expiry.
#[derive(Debug, Default)]
pub struct MemoryTtlCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryTtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        let mut entries = self.entries.lock()?;
        let now = Instant::now();
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }
}

#[async_trait]
impl TtlCache for MemoryTtlCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.live(key)?.map(|entry| entry.value))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Err(StoreError::Backend("ttl must be positive".to_string()));
        }
        self.entries.lock()?.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        Ok(self
            .live(key)?
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now())))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let existed = self.live(key)?.is_some();
        self.entries.lock()?.remove(key);
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn keys_expire_with_the_clock() {
        let cache = MemoryTtlCache::new();
        cache
            .set_with_ttl("k", "v", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.ttl("k").await.unwrap(), Some(Duration::from_secs(6)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.ttl("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let cache = MemoryTtlCache::new();
        cache
            .set_with_ttl("k", "v", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let cache = MemoryTtlCache::new();
        let err = cache.set_with_ttl("k", "v", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
