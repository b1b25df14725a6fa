use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    is_stale, merge_update, remaining_ttl, DeviceCodeStore, StoreError, TtlCache, DEFAULT_TTL,
};
use crate::device_code::DeviceCode;

const DEVICE_KEY_PREFIX: &str = "device_code:";
const USER_KEY_PREFIX: &str = "user_code:";
const POLL_KEY_PREFIX: &str = "last_poll:";

/// Device-code store on top of a shared [`TtlCache`].
///
/// Each record occupies two keys: `device_code:{code}` holds the JSON
/// record and `user_code:{code}` holds the device code. Both carry the same
/// remaining TTL. The pair is written one key at a time, so a crash between
/// the writes can leave one key behind until it expires.
///
/// Polls write only a third key, `last_poll:{code}`, so a poll racing a
/// verify never rewrites the record. `update` re-reads the record right
/// before its write and merges onto it; two verifies landing inside that
/// single read-write gap are last-writer-wins.
pub struct CacheDeviceCodeStore<C: TtlCache> {
    cache: Arc<C>,
    ttl: Duration,
}

impl<C: TtlCache> CacheDeviceCodeStore<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self::with_ttl(cache, DEFAULT_TTL)
    }

    pub fn with_ttl(cache: Arc<C>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    fn device_key(device_code: &str) -> String {
        format!("{DEVICE_KEY_PREFIX}{device_code}")
    }

    fn user_key(user_code: &str) -> String {
        format!("{USER_KEY_PREFIX}{user_code}")
    }

    fn poll_key(device_code: &str) -> String {
        format!("{POLL_KEY_PREFIX}{device_code}")
    }

    /// Lifetime left on the primary key, falling back to the record age.
    fn remaining(
        &self,
        key_ttl: Option<Duration>,
        stored: &DeviceCode,
        now: DateTime<Utc>,
    ) -> Result<Duration, StoreError> {
        match key_ttl {
            Some(left) if !left.is_zero() => Ok(left),
            _ => remaining_ttl(stored, self.ttl, now).ok_or(StoreError::NotFound),
        }
    }

    /// Fold the separately stored poll time into a record.
    async fn with_last_poll(&self, mut code: DeviceCode) -> Result<DeviceCode, StoreError> {
        if let Some(raw) = self.cache.get(&Self::poll_key(&code.device_code)).await? {
            let at = DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| StoreError::Serialization(format!("invalid poll time {raw:?}: {e}")))?
                .with_timezone(&Utc);
            code.last_poll = code.last_poll.max(Some(at));
        }
        Ok(code)
    }

    /// Whether the user-code index is held by a record that is still live.
    async fn user_code_taken(&self, user_key: &str) -> Result<bool, StoreError> {
        let Some(owner) = self.cache.get(user_key).await? else {
            return Ok(false);
        };
        Ok(matches!(
            self.load_raw(&owner).await?,
            Some(code) if !is_stale(&code, self.ttl, Utc::now())
        ))
    }

    /// Load the stored record without applying the TTL check.
    async fn load_raw(&self, device_code: &str) -> Result<Option<DeviceCode>, StoreError> {
        match self.cache.get(&Self::device_key(device_code)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<C: TtlCache + 'static> DeviceCodeStore for CacheDeviceCodeStore<C> {
    async fn save(&self, code: &DeviceCode) -> Result<(), StoreError> {
        let device_key = Self::device_key(&code.device_code);
        let user_key = Self::user_key(&code.user_code);
        if self.user_code_taken(&user_key).await? {
            return Err(StoreError::AlreadyExists("user code".to_string()));
        }

        let payload = serde_json::to_string(code)?;
        self.cache
            .set_with_ttl(&device_key, &payload, self.ttl)
            .await?;
        if let Err(err) = self
            .cache
            .set_with_ttl(&user_key, &code.device_code, self.ttl)
            .await
        {
            // The record is unusable without its index.
            if let Err(cleanup) = self.cache.delete(&device_key).await {
                tracing::warn!(error = %cleanup, "failed to roll back device code after index write failure");
            }
            return Err(err);
        }
        Ok(())
    }

    async fn get(&self, device_code: &str) -> Result<DeviceCode, StoreError> {
        match self.load_raw(device_code).await? {
            Some(code) if !is_stale(&code, self.ttl, Utc::now()) => self.with_last_poll(code).await,
            _ => Err(StoreError::NotFound),
        }
    }

    async fn get_by_user_code(&self, user_code: &str) -> Result<DeviceCode, StoreError> {
        let device_code = self
            .cache
            .get(&Self::user_key(user_code))
            .await?
            .ok_or(StoreError::UserCodeNotFound)?;
        self.get(&device_code).await
    }

    async fn update(&self, code: &DeviceCode) -> Result<(), StoreError> {
        let device_key = Self::device_key(&code.device_code);
        let key_ttl = self.cache.ttl(&device_key).await?;
        // Read as late as possible so the merge sees the newest decision.
        let existing = self
            .load_raw(&code.device_code)
            .await?
            .ok_or(StoreError::NotFound)?;
        let now = Utc::now();
        if is_stale(&existing, self.ttl, now) {
            return Err(StoreError::NotFound);
        }
        let remaining = self.remaining(key_ttl, &existing, now)?;

        let merged = merge_update(&existing, code)?;
        let payload = serde_json::to_string(&merged)?;
        self.cache
            .set_with_ttl(&device_key, &payload, remaining)
            .await?;
        self.cache
            .set_with_ttl(&Self::user_key(&existing.user_code), &merged.device_code, remaining)
            .await?;
        Ok(())
    }

    async fn record_poll(
        &self,
        device_code: &str,
        at: DateTime<Utc>,
    ) -> Result<DeviceCode, StoreError> {
        let key_ttl = self.cache.ttl(&Self::device_key(device_code)).await?;
        let mut code = self.get(device_code).await?;
        let remaining = self.remaining(key_ttl, &code, Utc::now())?;
        let stamp = code.last_poll.map_or(at, |seen| seen.max(at));
        self.cache
            .set_with_ttl(&Self::poll_key(device_code), &stamp.to_rfc3339(), remaining)
            .await?;
        code.last_poll = Some(stamp);
        Ok(code)
    }

    async fn delete(&self, device_code: &str) -> Result<(), StoreError> {
        let existing = self
            .load_raw(device_code)
            .await?
            .ok_or(StoreError::NotFound)?;
        let user_key = Self::user_key(&existing.user_code);
        self.cache.delete(&Self::device_key(device_code)).await?;
        self.cache.delete(&Self::poll_key(device_code)).await?;
        // The index may already belong to a newer record.
        if self.cache.get(&user_key).await?.as_deref() == Some(device_code) {
            self.cache.delete(&user_key).await?;
        }
        if is_stale(&existing, self.ttl, Utc::now()) {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
