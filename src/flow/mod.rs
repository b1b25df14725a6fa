//! Device and web-callback orchestration.

pub mod device;
pub mod web;

pub use device::DeviceFlow;
pub use web::WebCallbackFlow;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::account::{AccountService, IssuedToken};
use crate::error::{DeviceAuthError, Result};
use crate::provider::IdentityProvider;

/// Provider-only fields that never reach a caller.
const SCRUBBED_TOKEN_FIELDS: &[&str] = &["access_type"];

/// Run `future` unless `cancel` fires first.
pub(crate) async fn guarded<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeviceAuthError::Cancelled),
        result = future => result,
    }
}

pub(crate) fn ensure_enabled(provider: &dyn IdentityProvider) -> Result<()> {
    if provider.is_enabled() {
        Ok(())
    } else {
        Err(DeviceAuthError::ProviderDisabled(provider.name().to_string()))
    }
}

/// Turn a provider access token into a locally issued token.
///
/// Fetches the profile, upserts the user, grants the default policy and
/// issues the token pair, in that order.
pub(crate) async fn complete_login(
    provider: &dyn IdentityProvider,
    accounts: &dyn AccountService,
    access_token: &str,
    cancel: &CancellationToken,
) -> Result<IssuedToken> {
    let profile = guarded(cancel, async {
        provider
            .user_info(access_token)
            .await
            .map_err(DeviceAuthError::Profile)
    })
    .await?;

    let user = guarded(cancel, async {
        accounts
            .upsert_user(&profile)
            .await
            .map_err(|e| DeviceAuthError::account("upsert user", e))
    })
    .await?;

    guarded(cancel, async {
        accounts
            .grant_default_policy(&user)
            .await
            .map_err(|e| DeviceAuthError::account("grant default policy", e))
    })
    .await?;

    let mut token = guarded(cancel, async {
        accounts
            .issue_token(&user)
            .await
            .map_err(|e| DeviceAuthError::account("issue token", e))
    })
    .await?;

    for field in SCRUBBED_TOKEN_FIELDS {
        token.extra.remove(*field);
    }
    tracing::info!(provider = provider.name(), user_id = %user.id, "issued local token");
    Ok(token)
}

/// Log-safe prefix of a secret code.
pub(crate) fn redact(code: &str) -> &str {
    let end = code
        .char_indices()
        .nth(8)
        .map(|(idx, _)| idx)
        .unwrap_or(code.len());
    &code[..end]
}
