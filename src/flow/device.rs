use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{complete_login, ensure_enabled, guarded, redact};
use crate::account::{AccountService, IssuedToken};
use crate::codegen;
use crate::config::DeviceSettings;
use crate::device_code::{DeviceCode, DeviceCodeResponse, DeviceCodeStatus, VerifyOutcome};
use crate::error::{DeviceAuthError, Result};
use crate::provider::IdentityProvider;
use crate::store::{DeviceCodeStore, StoreError};

/// Device authorization grant state machine.
///
/// A code moves Pending -> Approved -> consumed, Pending -> Denied ->
/// reported, or Pending -> expired. The store refuses to revert a recorded
/// decision, so the first verify to land wins. Nothing is cached between
/// calls.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use devauth::config::DeviceSettings;
/// use devauth::flow::DeviceFlow;
/// use devauth::store::MemoryDeviceCodeStore;
/// # fn accounts() -> Arc<dyn devauth::account::AccountService> { unimplemented!() }
///
/// let store = Arc::new(MemoryDeviceCodeStore::new());
/// store.start_sweeper();
/// let flow = DeviceFlow::new(store, accounts(), DeviceSettings::default());
/// ```
pub struct DeviceFlow {
    store: Arc<dyn DeviceCodeStore>,
    accounts: Arc<dyn AccountService>,
    settings: DeviceSettings,
}

impl DeviceFlow {
    pub fn new(
        store: Arc<dyn DeviceCodeStore>,
        accounts: Arc<dyn AccountService>,
        settings: DeviceSettings,
    ) -> Self {
        Self {
            store,
            accounts,
            settings,
        }
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    /// Mint and persist a new device/user code pair.
    ///
    /// An empty `verification_uri` falls back to the configured one.
    #[instrument(name = "device_flow.create", skip_all, fields(provider = provider.name()))]
    pub async fn create_device_code(
        &self,
        provider: &dyn IdentityProvider,
        verification_uri: &str,
        cancel: &CancellationToken,
    ) -> Result<DeviceCodeResponse> {
        ensure_enabled(provider)?;

        let verification_uri = if verification_uri.is_empty() {
            self.settings.verification_uri.clone()
        } else {
            verification_uri.to_string()
        };
        let record = DeviceCode {
            device_code: codegen::generate_device_code()?,
            user_code: codegen::generate_user_code()?,
            verification_uri,
            expires_in: self.settings.expires_in_secs,
            created_at: Utc::now(),
            interval: self.settings.interval_secs,
            provider: provider.name().to_string(),
            state: provider.state().to_string(),
            approved: false,
            denied: false,
            access_token: String::new(),
            last_poll: None,
        };

        guarded(cancel, async {
            self.store
                .save(&record)
                .await
                .map_err(|e| DeviceAuthError::store("save device code", e))
        })
        .await?;

        tracing::info!(
            provider = provider.name(),
            device_code = redact(&record.device_code),
            user_code = %record.user_code,
            "created device code"
        );
        Ok(record.to_response())
    }

    /// Check whether a device code has been decided, and if approved,
    /// exchange it for a local token.
    ///
    /// Pending and slow-down outcomes come back as errors whose
    /// [`is_retryable`](DeviceAuthError::is_retryable) is true.
    #[instrument(name = "device_flow.poll", skip_all, fields(provider = provider.name()))]
    pub async fn poll_device_token(
        &self,
        provider: &dyn IdentityProvider,
        device_code: &str,
        cancel: &CancellationToken,
    ) -> Result<IssuedToken> {
        ensure_enabled(provider)?;

        let record = self.load(device_code, cancel).await?;
        if record.provider != provider.name() {
            return Err(DeviceAuthError::DeviceCodeNotFound);
        }

        let now = Utc::now();
        if record.is_expired_at(now) {
            self.discard(&record.device_code, cancel).await;
            return Err(DeviceAuthError::DeviceCodeExpired);
        }
        // Rate limiting comes before the decision flags so a tight loop
        // never observes the approval transition.
        if record.polled_too_recently(now) {
            tracing::debug!(device_code = redact(device_code), "poll too frequent");
            return Err(DeviceAuthError::SlowDown);
        }

        // The poll stamp touches nothing else, and the decision is read
        // from what the store holds after the stamp.
        let record = guarded(cancel, async {
            self.store
                .record_poll(&record.device_code, now)
                .await
                .map_err(|e| DeviceAuthError::store("record poll", e))
        })
        .await?;

        match record.status() {
            DeviceCodeStatus::Denied => {
                self.discard(&record.device_code, cancel).await;
                tracing::info!(device_code = redact(device_code), "reported denied device code");
                Err(DeviceAuthError::AccessDenied)
            }
            DeviceCodeStatus::Pending => Err(DeviceAuthError::AuthorizationPending),
            DeviceCodeStatus::Approved => {
                let token = complete_login(
                    provider,
                    self.accounts.as_ref(),
                    &record.access_token,
                    cancel,
                )
                .await?;
                // Single use: a concurrent poll that already consumed the
                // code surfaces here as not-found.
                guarded(cancel, async {
                    self.store
                        .delete(&record.device_code)
                        .await
                        .map_err(|e| DeviceAuthError::store("consume device code", e))
                })
                .await?;
                tracing::info!(device_code = redact(device_code), "consumed device code");
                Ok(token)
            }
        }
    }

    /// Record the user's decision for the code they typed.
    ///
    /// Denial is only recorded here; the next poll reports it and deletes
    /// the record. A code that already carries a decision keeps it.
    #[instrument(
        name = "device_flow.verify",
        skip_all,
        fields(provider = provider.name(), user_code = %user_code, approve = approve)
    )]
    pub async fn verify_device(
        &self,
        provider: &dyn IdentityProvider,
        user_code: &str,
        oauth_code: &str,
        approve: bool,
        cancel: &CancellationToken,
    ) -> Result<VerifyOutcome> {
        ensure_enabled(provider)?;

        let mut record = self.load_by_user_code(user_code, cancel).await?;
        // A code minted for another provider is invisible here.
        if record.provider != provider.name() {
            return Err(DeviceAuthError::UserCodeNotFound);
        }
        if let Some(outcome) = self.settled(&record, cancel).await? {
            return Ok(outcome);
        }

        if !approve {
            record.deny();
            let outcome = self.record_decision(&record, "record denial", cancel).await?;
            tracing::info!(user_code = %record.user_code, outcome = ?outcome, "device code denied");
            return Ok(outcome);
        }

        let token = guarded(cancel, async {
            provider
                .exchange(oauth_code)
                .await
                .map_err(DeviceAuthError::Exchange)
        })
        .await?;

        // The exchange can take a while; decide against the current record.
        let mut record = self.load(&record.device_code, cancel).await?;
        if let Some(outcome) = self.settled(&record, cancel).await? {
            tracing::info!(user_code = %record.user_code, outcome = ?outcome, "device code decided during exchange");
            return Ok(outcome);
        }
        record.approve(token.access_token);
        let outcome = self.record_decision(&record, "record approval", cancel).await?;
        tracing::info!(user_code = %record.user_code, outcome = ?outcome, "device code approved");
        Ok(outcome)
    }

    /// Resolve a user code to its record, e.g. to find the bound provider.
    #[instrument(name = "device_flow.lookup", skip_all, fields(user_code = %user_code))]
    pub async fn get_device_code_by_user_code(
        &self,
        user_code: &str,
        cancel: &CancellationToken,
    ) -> Result<DeviceCode> {
        self.load_by_user_code(user_code, cancel).await
    }

    async fn load(&self, device_code: &str, cancel: &CancellationToken) -> Result<DeviceCode> {
        guarded(cancel, async {
            self.store
                .get(device_code)
                .await
                .map_err(|e| DeviceAuthError::store("load device code", e))
        })
        .await
    }

    async fn load_by_user_code(
        &self,
        user_code: &str,
        cancel: &CancellationToken,
    ) -> Result<DeviceCode> {
        let user_code =
            codegen::normalize_user_code(user_code).ok_or(DeviceAuthError::UserCodeNotFound)?;
        guarded(cancel, async {
            self.store
                .get_by_user_code(&user_code)
                .await
                .map_err(|e| DeviceAuthError::store("resolve user code", e))
        })
        .await
    }

    /// The outcome a verify must report without writing, if any.
    ///
    /// Expired codes are discarded on the way out.
    async fn settled(
        &self,
        record: &DeviceCode,
        cancel: &CancellationToken,
    ) -> Result<Option<VerifyOutcome>> {
        if record.is_expired_at(Utc::now()) {
            self.discard(&record.device_code, cancel).await;
            return Err(DeviceAuthError::DeviceCodeExpired);
        }
        Ok(match record.status() {
            DeviceCodeStatus::Approved => Some(VerifyOutcome::Approved),
            DeviceCodeStatus::Denied => Some(VerifyOutcome::Denied),
            DeviceCodeStatus::Pending => None,
        })
    }

    /// Write a decision. If another decision landed first, that one stands
    /// and is reported instead.
    async fn record_decision(
        &self,
        record: &DeviceCode,
        step: &'static str,
        cancel: &CancellationToken,
    ) -> Result<VerifyOutcome> {
        let written = guarded(cancel, async {
            match self.store.update(record).await {
                Ok(()) => Ok(true),
                Err(StoreError::Conflict) => Ok(false),
                Err(e) => Err(DeviceAuthError::store(step, e)),
            }
        })
        .await?;
        if written {
            return Ok(match record.status() {
                DeviceCodeStatus::Denied => VerifyOutcome::Denied,
                _ => VerifyOutcome::Approved,
            });
        }

        let current = self.load(&record.device_code, cancel).await?;
        tracing::debug!(user_code = %current.user_code, "decision already recorded");
        match self.settled(&current, cancel).await? {
            Some(outcome) => Ok(outcome),
            None => Err(DeviceAuthError::store(step, StoreError::Conflict)),
        }
    }

    /// Best-effort delete on a path that already has its answer.
    async fn discard(&self, device_code: &str, cancel: &CancellationToken) {
        let result = guarded(cancel, async {
            self.store
                .delete(device_code)
                .await
                .map_err(|e| DeviceAuthError::store("delete device code", e))
        })
        .await;
        match result {
            Ok(()) | Err(DeviceAuthError::DeviceCodeNotFound) => {}
            Err(err) => {
                tracing::warn!(device_code = redact(device_code), error = %err, "failed to delete device code");
            }
        }
    }
}
