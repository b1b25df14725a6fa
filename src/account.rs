//! Local account and token issuance capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Provider-agnostic user profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub picture: String,
}

/// A user record in the local account system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: String,
    pub email: String,
}

/// The locally issued access/refresh token pair.
///
/// `extra` carries issuer-specific fields; flows remove provider-only keys
/// such as `access_type` before the token reaches a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(flatten, default)]
    pub extra: Map<String, Value>,
}

/// Opaque failure from the account service.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AccountError(pub String);

impl AccountError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Upserts users, assigns their default policy and issues local tokens.
#[async_trait]
pub trait AccountService: Send + Sync {
    async fn upsert_user(&self, profile: &UserProfile) -> Result<LocalUser, AccountError>;

    async fn grant_default_policy(&self, user: &LocalUser) -> Result<(), AccountError>;

    async fn issue_token(&self, user: &LocalUser) -> Result<IssuedToken, AccountError>;
}
