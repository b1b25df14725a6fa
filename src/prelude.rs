//! Convenience re-exports for common use.

pub use crate::account::{AccountService, IssuedToken, LocalUser, UserProfile};
pub use crate::config::{DeviceAuthConfig, DeviceSettings, StoreHandle};
pub use crate::device_code::{DeviceCode, DeviceCodeResponse, VerifyOutcome};
pub use crate::error::{DeviceAuthError, ErrorKind, Result};
pub use crate::flow::{DeviceFlow, WebCallbackFlow};
pub use crate::provider::{IdentityProvider, OAuth2Provider, OAuth2ProviderConfig, ProviderRegistry};
pub use crate::store::{CacheDeviceCodeStore, DeviceCodeStore, MemoryDeviceCodeStore};
