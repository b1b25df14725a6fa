//! Device-code persistence.
//!
//! [`DeviceCodeStore`] is the one contract every backing satisfies.
//! [`MemoryDeviceCodeStore`] keeps records in process and sweeps them on a
//! timer; [`CacheDeviceCodeStore`] writes through a [`TtlCache`] and lets
//! the cache expire keys on its own.

pub mod cache;
pub mod error;
pub mod memory;
pub mod rest;
pub mod ttl_cache;

pub use cache::CacheDeviceCodeStore;
pub use error::StoreError;
pub use memory::MemoryDeviceCodeStore;
pub use rest::RestTtlCache;
pub use ttl_cache::{MemoryTtlCache, TtlCache};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::device_code::{DeviceCode, DeviceCodeStatus};

/// Fixed lifetime of a stored device code.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Storage abstraction for device codes, keyed by device code with a
/// secondary index on user code.
#[async_trait]
pub trait DeviceCodeStore: Send + Sync {
    /// Insert a new record under both keys.
    async fn save(&self, code: &DeviceCode) -> Result<(), StoreError>;

    /// Fetch by device code. Records past the TTL are `NotFound`.
    async fn get(&self, device_code: &str) -> Result<DeviceCode, StoreError>;

    /// Fetch by user code. A missing index entry is `UserCodeNotFound`.
    async fn get_by_user_code(&self, user_code: &str) -> Result<DeviceCode, StoreError>;

    /// Overwrite an existing record.
    ///
    /// `created_at` and `user_code` are taken from the stored copy, and the
    /// remaining lifetime is kept rather than reset. A decision already in
    /// the store is never reverted: a pending copy keeps the stored
    /// decision, and a copy carrying the opposite decision is `Conflict`.
    async fn update(&self, code: &DeviceCode) -> Result<(), StoreError>;

    /// Set `last_poll` without touching any other field and return the
    /// record as currently stored.
    async fn record_poll(
        &self,
        device_code: &str,
        at: DateTime<Utc>,
    ) -> Result<DeviceCode, StoreError>;

    /// Remove the record and its user-code index entry.
    async fn delete(&self, device_code: &str) -> Result<(), StoreError>;
}

/// Whether a record has outlived the store TTL.
pub(crate) fn is_stale(code: &DeviceCode, ttl: Duration, now: DateTime<Utc>) -> bool {
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => now - code.created_at > ttl,
        Err(_) => false,
    }
}

/// Lifetime left for a record, or `None` once it is spent.
pub(crate) fn remaining_ttl(code: &DeviceCode, ttl: Duration, now: DateTime<Utc>) -> Option<Duration> {
    let age = (now - code.created_at).to_std().unwrap_or(Duration::ZERO);
    ttl.checked_sub(age).filter(|left| !left.is_zero())
}

/// Apply an incoming write on top of the stored record.
pub(crate) fn merge_update(stored: &DeviceCode, incoming: &DeviceCode) -> Result<DeviceCode, StoreError> {
    let mut merged = DeviceCode {
        created_at: stored.created_at,
        user_code: stored.user_code.clone(),
        last_poll: stored.last_poll.max(incoming.last_poll),
        ..incoming.clone()
    };
    let decided = stored.status();
    if decided != DeviceCodeStatus::Pending {
        let requested = incoming.status();
        if requested != DeviceCodeStatus::Pending && requested != decided {
            return Err(StoreError::Conflict);
        }
        merged.approved = stored.approved;
        merged.denied = stored.denied;
        merged.access_token = stored.access_token.clone();
    }
    Ok(merged)
}
