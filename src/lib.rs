//! devauth: OAuth 2.0 Device Authorization Grant (RFC 8628) plus a
//! one-shot web callback login.
//!
//! A device (CLI, TV, headless box) asks for a code pair, shows the user
//! code, and polls. The user approves in a browser through a third-party
//! identity provider. Once approved, the next poll turns the provider
//! token into a local token exactly once.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use devauth::prelude::*;
//! use tokio_util::sync::CancellationToken;
//! # async fn example(accounts: Arc<dyn AccountService>) -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceAuthConfig::load(None)?;
//! let registry = config.build_registry()?;
//! let store = Arc::new(MemoryDeviceCodeStore::new());
//! store.start_sweeper();
//!
//! let flow = DeviceFlow::new(store, accounts, config.device.clone());
//! let github = registry.get("github")?;
//! let cancel = CancellationToken::new();
//! let response = flow.create_device_code(github.as_ref(), "", &cancel).await?;
//! println!("Visit {} and enter {}", response.verification_uri, response.user_code);
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod codegen;
pub mod config;
pub mod device_code;
pub mod error;
pub mod flow;
pub mod prelude;
pub mod provider;
pub mod store;

pub use device_code::{DeviceCode, DeviceCodeResponse, DeviceCodeStatus, VerifyOutcome};
pub use error::{DeviceAuthError, ErrorKind, Result};
pub use flow::{DeviceFlow, WebCallbackFlow};
