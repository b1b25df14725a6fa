//! Identity provider capability.
//!
//! Flows only see [`IdentityProvider`]. New providers are added by
//! implementing the trait and registering an instance with
//! [`ProviderRegistry`].

pub mod error;
pub mod oauth2;

pub use error::ProviderError;
pub use oauth2::{OAuth2Provider, OAuth2ProviderConfig};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::account::UserProfile;
use crate::error::DeviceAuthError;

/// Token returned by a provider's code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// A third-party login the flows can delegate to.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    /// CSRF state the provider expects back on its callback.
    fn state(&self) -> &str;

    fn redirect_url(&self) -> &str;

    fn error_url(&self) -> &str;

    fn is_enabled(&self) -> bool;

    async fn exchange(&self, code: &str) -> Result<ProviderToken, ProviderError>;

    async fn exchange_with_redirect(
        &self,
        code: &str,
        redirect_url: &str,
    ) -> Result<ProviderToken, ProviderError>;

    async fn user_info(&self, access_token: &str) -> Result<UserProfile, ProviderError>;

    fn auth_url(&self) -> String;

    fn auth_url_with_redirect(&self, redirect_url: &str) -> String;
}

/// Name-to-instance lookup for configured providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("providers", &names)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn IdentityProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn IdentityProvider>, DeviceAuthError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| DeviceAuthError::InvalidProvider(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
