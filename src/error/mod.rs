//! Error types for devauth.

pub mod kind;

pub use kind::ErrorKind;

use thiserror::Error;

use crate::account::AccountError;
use crate::provider::ProviderError;
use crate::store::StoreError;

/// Primary error type for every flow operation.
#[derive(Debug, Error)]
pub enum DeviceAuthError {
    #[error("device code not found")]
    DeviceCodeNotFound,

    #[error("user code not found")]
    UserCodeNotFound,

    #[error("provider {0} is disabled")]
    ProviderDisabled(String),

    #[error("unknown provider: {0}")]
    InvalidProvider(String),

    #[error("device code expired")]
    DeviceCodeExpired,

    #[error("polling too frequently, slow down")]
    SlowDown,

    #[error("access denied")]
    AccessDenied,

    #[error("authorization pending")]
    AuthorizationPending,

    #[error("state parameter does not match")]
    InvalidState,

    #[error("authorization code is missing")]
    MissingCode,

    #[error("code exchange failed: {0}")]
    Exchange(#[source] ProviderError),

    #[error("fetching user profile failed: {0}")]
    Profile(#[source] ProviderError),

    #[error("{step}: {source}")]
    Account {
        step: &'static str,
        #[source]
        source: AccountError,
    },

    #[error("{step}: {source}")]
    Store {
        step: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl DeviceAuthError {
    /// Wrap a store failure, keeping the not-found conditions distinct.
    pub(crate) fn store(step: &'static str, source: StoreError) -> Self {
        match source {
            StoreError::NotFound => Self::DeviceCodeNotFound,
            StoreError::UserCodeNotFound => Self::UserCodeNotFound,
            source => Self::Store { step, source },
        }
    }

    pub(crate) fn account(step: &'static str, source: AccountError) -> Self {
        Self::Account { step, source }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceCodeNotFound | Self::UserCodeNotFound => ErrorKind::NotFound,
            Self::ProviderDisabled(_) | Self::InvalidProvider(_) => ErrorKind::ProviderDisabled,
            Self::DeviceCodeExpired => ErrorKind::Expired,
            Self::SlowDown => ErrorKind::SlowDown,
            Self::AccessDenied => ErrorKind::Denied,
            Self::AuthorizationPending => ErrorKind::Pending,
            Self::InvalidState | Self::MissingCode => ErrorKind::InvalidRequest,
            Self::Exchange(_)
            | Self::Profile(_)
            | Self::Account { .. }
            | Self::Store { .. }
            | Self::Internal(_) => ErrorKind::Upstream,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// HTTP status the device endpoints answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AuthorizationPending => 202,
            Self::DeviceCodeExpired | Self::SlowDown | Self::InvalidState | Self::MissingCode => {
                400
            }
            Self::AccessDenied | Self::Exchange(_) => 401,
            Self::DeviceCodeNotFound
            | Self::UserCodeNotFound
            | Self::ProviderDisabled(_)
            | Self::InvalidProvider(_) => 404,
            Self::Cancelled => 499,
            Self::Profile(_) | Self::Account { .. } | Self::Store { .. } | Self::Internal(_) => 500,
        }
    }

    /// RFC 8628 error code for the token endpoint, where one applies.
    pub fn oauth_error_code(&self) -> Option<&'static str> {
        match self {
            Self::AuthorizationPending => Some("authorization_pending"),
            Self::SlowDown => Some("slow_down"),
            Self::DeviceCodeExpired => Some("expired_token"),
            Self::AccessDenied => Some("access_denied"),
            Self::DeviceCodeNotFound => Some("invalid_grant"),
            _ => None,
        }
    }

    /// Whether the polling client should keep trying.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, DeviceAuthError>;
