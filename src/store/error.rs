use thiserror::Error;

/// Failures reported by a [`DeviceCodeStore`](super::DeviceCodeStore).
///
/// `NotFound` and `UserCodeNotFound` are expected conditions; everything
/// else is fatal to the current request.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("device code not found")]
    NotFound,
    #[error("user code not found")]
    UserCodeNotFound,
    #[error("code already exists: {0}")]
    AlreadyExists(String),
    #[error("device code already carries a different decision")]
    Conflict,
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound | Self::UserCodeNotFound)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(error: reqwest::Error) -> Self {
        Self::Backend(error.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::Backend("store lock poisoned".to_string())
    }
}
