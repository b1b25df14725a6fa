use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{complete_login, ensure_enabled, guarded};
use crate::account::{AccountService, IssuedToken};
use crate::error::{DeviceAuthError, Result};
use crate::provider::IdentityProvider;

/// One-shot authorization-code callback handling.
///
/// Nothing is persisted between the redirect and the callback; the
/// provider's fixed state token is the only CSRF check.
pub struct WebCallbackFlow {
    accounts: Arc<dyn AccountService>,
}

impl WebCallbackFlow {
    pub fn new(accounts: Arc<dyn AccountService>) -> Self {
        Self { accounts }
    }

    /// URL to send the browser to, optionally with a non-default redirect.
    pub fn authorization_url(
        &self,
        provider: &dyn IdentityProvider,
        redirect_uri: Option<&str>,
    ) -> Result<String> {
        ensure_enabled(provider)?;
        Ok(match redirect_uri {
            Some(redirect) if !redirect.is_empty() => provider.auth_url_with_redirect(redirect),
            _ => provider.auth_url(),
        })
    }

    #[instrument(name = "web_callback.handle", skip_all, fields(provider = provider.name()))]
    pub async fn handle_callback(
        &self,
        provider: &dyn IdentityProvider,
        state: &str,
        code: &str,
        redirect_uri: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<IssuedToken> {
        ensure_enabled(provider)?;
        if state.is_empty() || !constant_time_eq(state.as_bytes(), provider.state().as_bytes()) {
            tracing::warn!(provider = provider.name(), "callback state mismatch");
            return Err(DeviceAuthError::InvalidState);
        }
        if code.is_empty() {
            return Err(DeviceAuthError::MissingCode);
        }

        let token = guarded(cancel, async {
            let exchanged = match redirect_uri {
                Some(redirect) if !redirect.is_empty() => {
                    provider.exchange_with_redirect(code, redirect).await
                }
                _ => provider.exchange(code).await,
            };
            exchanged.map_err(DeviceAuthError::Exchange)
        })
        .await?;

        complete_login(provider, self.accounts.as_ref(), &token.access_token, cancel).await
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
