//! Convenience re-exports for embedding the auth core.

pub use crate::channel::{
    ChannelKind, IssueReceipt, QrPoll, QrSession, VerificationChannel,
};
pub use crate::config::AuthConfig;
pub use crate::device::{DeviceTrustRegistry, SecurityAlert, TrustedDevice};
pub use crate::error::{AuthError, Result};
pub use crate::gateway::{RefreshCoordinator, RequestGateway};
pub use crate::session::{ChannelSelection, Credentials, SessionStatus, VerificationSession};
pub use crate::token::{FileTokenStore, MemoryTokenStore, TokenPair, TokenStore};
