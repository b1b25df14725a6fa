use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A persisted device authorization request.
///
/// # Example
/// ```
/// use devauth::DeviceCode;
/// use chrono::Utc;
///
/// let mut code = DeviceCode {
///     device_code: "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZA".to_string(),
///     user_code: "ABCD-EFGH".to_string(),
///     verification_uri: "https://example.com/device".to_string(),
///     expires_in: 600,
///     created_at: Utc::now(),
///     interval: 5,
///     provider: "github".to_string(),
///     state: "csrf-state".to_string(),
///     approved: false,
///     denied: false,
///     access_token: String::new(),
///     last_poll: None,
/// };
/// code.approve("gho_token");
/// assert!(code.approved && !code.denied);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    /// Lifetime in seconds, counted from `created_at`.
    pub expires_in: u64,
    pub created_at: DateTime<Utc>,
    /// Minimum seconds between polls.
    pub interval: u64,
    pub provider: String,
    pub state: String,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub denied: bool,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub last_poll: Option<DateTime<Utc>>,
}

/// Logical state of a device code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCodeStatus {
    Pending,
    Approved,
    Denied,
}

impl DeviceCode {
    pub fn status(&self) -> DeviceCodeStatus {
        if self.denied {
            DeviceCodeStatus::Denied
        } else if self.approved && !self.access_token.is_empty() {
            DeviceCodeStatus::Approved
        } else {
            DeviceCodeStatus::Pending
        }
    }

    /// Record an approval. Clears any denial so the flags stay exclusive.
    pub fn approve(&mut self, access_token: impl Into<String>) {
        self.approved = true;
        self.denied = false;
        self.access_token = access_token.into();
    }

    /// Record a denial. Drops any stored provider token.
    pub fn deny(&mut self) {
        self.denied = true;
        self.approved = false;
        self.access_token.clear();
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + seconds(self.expires_in)
    }

    /// True once the record has outlived its own `expires_in`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > seconds(self.expires_in)
    }

    /// True while a poll at `now` would come sooner than `interval` allows.
    pub fn polled_too_recently(&self, now: DateTime<Utc>) -> bool {
        match self.last_poll {
            Some(last) => now - last < seconds(self.interval),
            None => false,
        }
    }

    /// Project the fields a polling client may see.
    pub fn to_response(&self) -> DeviceCodeResponse {
        DeviceCodeResponse {
            device_code: self.device_code.clone(),
            user_code: self.user_code.clone(),
            verification_uri: self.verification_uri.clone(),
            expires_in: self.expires_in,
            interval: self.interval,
        }
    }
}

/// Body returned from the device-code endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    pub interval: u64,
}

/// Result of a verify call, as reported to the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Approved,
    Denied,
}

impl VerifyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }
}

pub(crate) fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}
