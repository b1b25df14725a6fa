//! Error classification shared by every flow.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Broad error class used to route client-facing behaviour.
///
/// Callers branch on the kind rather than on individual variants so that
/// "keep polling" outcomes can be told apart from terminal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Expired,
    Pending,
    Denied,
    SlowDown,
    ProviderDisabled,
    InvalidRequest,
    Upstream,
    Cancelled,
}

impl ErrorKind {
    /// Whether a polling client should back off and try again.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Pending | Self::SlowDown)
    }
}
