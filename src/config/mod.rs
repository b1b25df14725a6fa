//! Configuration system (layered: defaults < config file < environment).

pub mod store;

pub use store::StoreHandle;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::{OAuth2Provider, OAuth2ProviderConfig, ProviderError, ProviderRegistry};
use crate::store::StoreError;

const ENV_EXPIRES_IN: &str = "DEVAUTH_EXPIRES_IN";
const ENV_INTERVAL: &str = "DEVAUTH_INTERVAL";
const ENV_VERIFICATION_URI: &str = "DEVAUTH_VERIFICATION_URI";
const ENV_STORE_BACKEND: &str = "DEVAUTH_STORE_BACKEND";
const ENV_SWEEP_INTERVAL: &str = "DEVAUTH_SWEEP_INTERVAL";
const ENV_CACHE_URL: &str = "DEVAUTH_CACHE_URL";
const ENV_CACHE_TOKEN: &str = "DEVAUTH_CACHE_TOKEN";

/// Every environment variable the loader reads.
pub const ENV_VARS: [&str; 7] = [
    ENV_EXPIRES_IN,
    ENV_INTERVAL,
    ENV_VERIFICATION_URI,
    ENV_STORE_BACKEND,
    ENV_SWEEP_INTERVAL,
    ENV_CACHE_URL,
    ENV_CACHE_TOKEN,
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("Store setup failed: {0}")]
    Store(#[from] StoreError),
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Device-code lifetime and polling policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub expires_in_secs: u64,
    pub interval_secs: u64,
    pub verification_uri: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            expires_in_secs: 600,
            interval_secs: 5,
            verification_uri: "http://localhost:8080/device".to_string(),
        }
    }
}

/// Which [`DeviceCodeStore`](crate::store::DeviceCodeStore) to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub sweep_interval_secs: u64,
    pub cache_url: Option<String>,
    pub cache_token: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            sweep_interval_secs: 60,
            cache_url: None,
            cache_token: None,
        }
    }
}

/// Top-level configuration.
///
/// # Example
/// ```
/// use devauth::config::DeviceAuthConfig;
///
/// let config = DeviceAuthConfig::from_toml_str(r#"
///     [device]
///     expires_in_secs = 300
/// "#)?;
/// assert_eq!(config.device.expires_in_secs, 300);
/// assert_eq!(config.device.interval_secs, 5);
/// # Ok::<(), devauth::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceAuthConfig {
    pub device: DeviceSettings,
    pub store: StoreSettings,
    pub providers: Vec<OAuth2ProviderConfig>,
}

impl DeviceAuthConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Default config location (`~/.devauth/config.toml`).
    pub fn default_path() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".devauth"))
            .unwrap_or_else(|| PathBuf::from(".devauth"))
            .join("config.toml")
    }

    /// Load defaults, then the config file, then the process environment.
    ///
    /// An explicit `path` must exist. Without one, the default path is used
    /// if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => {
                let default = Self::default_path();
                if default.is_file() {
                    Self::read_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        tracing::debug!(
            backend = ?config.store.backend,
            providers = config.providers.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Overlay values from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_EXPIRES_IN) {
            self.device.expires_in_secs = parse_secs(ENV_EXPIRES_IN, &value)?;
        }
        if let Some(value) = lookup(ENV_INTERVAL) {
            self.device.interval_secs = parse_secs(ENV_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(ENV_VERIFICATION_URI) {
            self.device.verification_uri = value;
        }
        if let Some(value) = lookup(ENV_STORE_BACKEND) {
            self.store.backend = match value.trim().to_ascii_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "cache" => StoreBackend::Cache,
                other => {
                    return Err(ConfigError::invalid(
                        ENV_STORE_BACKEND,
                        format!("unknown backend {other} (expected memory or cache)"),
                    ))
                }
            };
        }
        if let Some(value) = lookup(ENV_SWEEP_INTERVAL) {
            self.store.sweep_interval_secs = parse_secs(ENV_SWEEP_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(ENV_CACHE_URL) {
            self.store.cache_url = Some(value);
        }
        if let Some(value) = lookup(ENV_CACHE_TOKEN) {
            self.store.cache_token = Some(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.expires_in_secs == 0 {
            return Err(ConfigError::invalid("device.expires_in_secs", "must be positive"));
        }
        if self.device.interval_secs > self.device.expires_in_secs {
            return Err(ConfigError::invalid(
                "device.interval_secs",
                "must not exceed expires_in_secs",
            ));
        }
        if let Err(e) = url::Url::parse(&self.device.verification_uri) {
            return Err(ConfigError::invalid("device.verification_uri", e.to_string()));
        }
        if self.store.sweep_interval_secs == 0 {
            return Err(ConfigError::invalid("store.sweep_interval_secs", "must be positive"));
        }
        if self.store.backend == StoreBackend::Cache && self.store.cache_url.is_none() {
            return Err(ConfigError::invalid(
                "store.cache_url",
                "required for the cache backend",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::invalid(
                    "providers",
                    format!("duplicate provider {}", provider.name),
                ));
            }
        }
        Ok(())
    }

    /// Store lifetime of a device code.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.device.expires_in_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.store.sweep_interval_secs)
    }

    /// Build an [`OAuth2Provider`] per configured provider.
    pub fn build_registry(&self) -> Result<ProviderRegistry, ConfigError> {
        let client = reqwest::Client::new();
        let mut registry = ProviderRegistry::new();
        for provider in &self.providers {
            let provider = OAuth2Provider::with_client(client.clone(), provider.clone())?;
            registry.register(Arc::new(provider));
        }
        Ok(registry)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("expected seconds, got {value:?}")))
}
