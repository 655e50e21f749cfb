//! Authflow: client-side authentication and session-lifecycle orchestrator.
//!
//! Takes a user from unauthenticated to a valid, continuously refreshed
//! session across five interchangeable second-factor channels (email OTP,
//! SMS OTP, TOTP, one-time backup codes, and cross-device QR approval),
//! with single-flight token refresh keeping concurrent API calls coherent
//! across an access-token expiry.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use authflow::prelude::*;
//!
//! # async fn example() -> authflow::error::Result<()> {
//! let config = AuthConfig::new("https://id.example.com");
//! let store = Arc::new(FileTokenStore::new_default());
//! let mut session = VerificationSession::new(config.clone(), store.clone());
//!
//! session.start(Credentials::new("user@example.com", "hunter2"), None).await?;
//! session.select_channel(ChannelSelection::EmailOtp)?;
//! session.issue().await?;
//! session.submit_proof("123456").await?;
//!
//! // Authenticated calls now refresh transparently on expiry.
//! let gateway = Arc::new(RequestGateway::new(&config, store));
//! let devices = DeviceTrustRegistry::new(gateway).list().await?;
//! println!("{} trusted devices", devices.len());
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod gateway;
pub mod prelude;
pub mod session;
pub mod token;
