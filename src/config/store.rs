use std::sync::Arc;

use super::{ConfigError, DeviceAuthConfig, StoreBackend};
use crate::store::{CacheDeviceCodeStore, DeviceCodeStore, MemoryDeviceCodeStore, RestTtlCache};

/// A configured device-code store plus whatever background work it owns.
pub struct StoreHandle {
    store: Arc<dyn DeviceCodeStore>,
    memory: Option<Arc<MemoryDeviceCodeStore>>,
}

impl StoreHandle {
    /// Build the configured backend. The memory backend's sweeper is
    /// started here, so this must run inside a tokio runtime.
    pub fn from_config(config: &DeviceAuthConfig) -> Result<Self, ConfigError> {
        match config.store.backend {
            StoreBackend::Memory => {
                let memory = Arc::new(MemoryDeviceCodeStore::with_settings(
                    config.ttl(),
                    config.sweep_interval(),
                ));
                memory.start_sweeper();
                Ok(Self {
                    store: memory.clone(),
                    memory: Some(memory),
                })
            }
            StoreBackend::Cache => {
                let url = config.store.cache_url.as_deref().ok_or_else(|| {
                    ConfigError::InvalidValue {
                        key: "store.cache_url".to_string(),
                        message: "required for the cache backend".to_string(),
                    }
                })?;
                let token = config.store.cache_token.clone().unwrap_or_default();
                let cache = RestTtlCache::new(url, token)?;
                Ok(Self {
                    store: Arc::new(CacheDeviceCodeStore::with_ttl(
                        Arc::new(cache),
                        config.ttl(),
                    )),
                    memory: None,
                })
            }
        }
    }

    pub fn store(&self) -> Arc<dyn DeviceCodeStore> {
        Arc::clone(&self.store)
    }

    /// Stop background work owned by the store.
    pub async fn shutdown(&self) {
        if let Some(memory) = &self.memory {
            memory.shutdown().await;
        }
    }
}
