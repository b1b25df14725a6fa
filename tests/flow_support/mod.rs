#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use devauth::account::{AccountError, AccountService, IssuedToken, LocalUser, UserProfile};
use devauth::config::DeviceSettings;
use devauth::provider::{IdentityProvider, ProviderError, ProviderToken};
use chrono::{DateTime, Utc};
use devauth::device_code::DeviceCode;
use devauth::store::{DeviceCodeStore, MemoryDeviceCodeStore, StoreError};
use devauth::DeviceFlow;
use serde_json::json;

pub const PROVIDER_TOKEN: &str = "provider-access-token";

/// Scriptable identity provider.
pub struct FakeProvider {
    name: String,
    state: String,
    enabled: AtomicBool,
    fail_exchange: AtomicBool,
    exchange_delay_ms: AtomicU64,
    pub exchanges: Mutex<Vec<(String, Option<String>)>>,
    pub profile_lookups: AtomicUsize,
}

impl FakeProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: format!("{name}-state"),
            enabled: AtomicBool::new(true),
            fail_exchange: AtomicBool::new(false),
            exchange_delay_ms: AtomicU64::new(0),
            exchanges: Mutex::new(Vec::new()),
            profile_lookups: AtomicUsize::new(0),
        }
    }

    pub fn disabled(name: &str) -> Self {
        let provider = Self::new(name);
        provider.set_enabled(false);
        provider
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_exchanges(&self) {
        self.fail_exchange.store(true, Ordering::SeqCst);
    }

    /// Hold every exchange open for `delay` before answering.
    pub fn set_exchange_delay(&self, delay: Duration) {
        self.exchange_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.lock().expect("exchanges lock").len()
    }

    async fn record_exchange(
        &self,
        code: &str,
        redirect: Option<&str>,
    ) -> Result<ProviderToken, ProviderError> {
        self.exchanges
            .lock()
            .expect("exchanges lock")
            .push((code.to_string(), redirect.map(str::to_string)));
        let delay = self.exchange_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected("bad verification code".to_string()));
        }
        Ok(ProviderToken {
            access_token: PROVIDER_TOKEN.to_string(),
            token_type: Some("bearer".to_string()),
            refresh_token: None,
            expires_in: None,
        })
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &str {
        &self.state
    }

    fn redirect_url(&self) -> &str {
        "https://app.example.com/callback"
    }

    fn error_url(&self) -> &str {
        "https://app.example.com/error"
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn exchange(&self, code: &str) -> Result<ProviderToken, ProviderError> {
        self.record_exchange(code, None).await
    }

    async fn exchange_with_redirect(
        &self,
        code: &str,
        redirect_url: &str,
    ) -> Result<ProviderToken, ProviderError> {
        self.record_exchange(code, Some(redirect_url)).await
    }

    async fn user_info(&self, access_token: &str) -> Result<UserProfile, ProviderError> {
        self.profile_lookups.fetch_add(1, Ordering::SeqCst);
        if access_token != PROVIDER_TOKEN {
            return Err(ProviderError::Status {
                status: 401,
                message: "bad credentials".to_string(),
            });
        }
        Ok(UserProfile {
            id: "user-42".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            picture: String::new(),
        })
    }

    fn auth_url(&self) -> String {
        format!("https://{}.example.com/authorize?state={}", self.name, self.state)
    }

    fn auth_url_with_redirect(&self, redirect_url: &str) -> String {
        format!("{}&redirect_uri={redirect_url}", self.auth_url())
    }
}

/// Account service that records every call in order.
#[derive(Default)]
pub struct FakeAccounts {
    pub calls: Mutex<Vec<String>>,
    pub fail_issue: AtomicBool,
}

impl FakeAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl AccountService for FakeAccounts {
    async fn upsert_user(&self, profile: &UserProfile) -> Result<LocalUser, AccountError> {
        self.push(format!("upsert:{}", profile.email));
        Ok(LocalUser {
            id: "local-1".to_string(),
            email: profile.email.clone(),
        })
    }

    async fn grant_default_policy(&self, user: &LocalUser) -> Result<(), AccountError> {
        self.push(format!("policy:{}", user.id));
        Ok(())
    }

    async fn issue_token(&self, user: &LocalUser) -> Result<IssuedToken, AccountError> {
        self.push(format!("issue:{}", user.id));
        if self.fail_issue.load(Ordering::SeqCst) {
            return Err(AccountError::new("signing key unavailable"));
        }
        let mut extra = serde_json::Map::new();
        extra.insert("access_type".to_string(), json!("offline"));
        extra.insert("scope".to_string(), json!("read"));
        Ok(IssuedToken {
            access_token: "local-access".to_string(),
            refresh_token: "local-refresh".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            extra,
        })
    }
}

pub fn settings(interval_secs: u64, expires_in_secs: u64) -> DeviceSettings {
    DeviceSettings {
        expires_in_secs,
        interval_secs,
        verification_uri: "https://example.com/device".to_string(),
    }
}

pub struct Harness {
    pub store: Arc<MemoryDeviceCodeStore>,
    pub accounts: Arc<FakeAccounts>,
    pub flow: DeviceFlow,
}

pub fn harness(settings: DeviceSettings) -> Harness {
    let store = Arc::new(MemoryDeviceCodeStore::new());
    let accounts = Arc::new(FakeAccounts::new());
    let flow = DeviceFlow::new(store.clone(), accounts.clone(), settings);
    Harness {
        store,
        accounts,
        flow,
    }
}

/// Memory store whose poll stamp waits before reading back the record.
pub struct SlowPollStore {
    pub inner: Arc<MemoryDeviceCodeStore>,
    pub delay: Duration,
}

#[async_trait]
impl DeviceCodeStore for SlowPollStore {
    async fn save(&self, code: &DeviceCode) -> Result<(), StoreError> {
        self.inner.save(code).await
    }

    async fn get(&self, device_code: &str) -> Result<DeviceCode, StoreError> {
        self.inner.get(device_code).await
    }

    async fn get_by_user_code(&self, user_code: &str) -> Result<DeviceCode, StoreError> {
        self.inner.get_by_user_code(user_code).await
    }

    async fn update(&self, code: &DeviceCode) -> Result<(), StoreError> {
        self.inner.update(code).await
    }

    async fn record_poll(
        &self,
        device_code: &str,
        at: DateTime<Utc>,
    ) -> Result<DeviceCode, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.record_poll(device_code, at).await
    }

    async fn delete(&self, device_code: &str) -> Result<(), StoreError> {
        self.inner.delete(device_code).await
    }
}
