//! Error types for authflow.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Normalized authentication errors across the session, channels, and gateway.
///
/// The enum is `Clone` (string payloads only) so the single-flight refresh
/// can hand the same failure to every queued caller.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("CAPTCHA verification required")]
    CaptchaRequired,
    #[error("Verification code rejected: {0}")]
    ChannelProofRejected(String),
    #[error("Verification code or session expired")]
    ChannelExpired,
    #[error("Phone number does not match the registered number")]
    PhoneMismatch,
    #[error("Resend available in {remaining_secs}s")]
    ResendCooldown { remaining_secs: u64 },
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("Request unauthorized")]
    Unauthorized,
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    /// Whether retrying the same operation without any state transition is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::ChannelProofRejected(_) | Self::ResendCooldown { .. }
        )
    }

    /// Whether this error invalidates the whole session and forces a new login.
    ///
    /// Only refresh failures tear the session down; everything else leaves
    /// in-progress verification state intact.
    pub fn requires_relogin(&self) -> bool {
        matches!(
            self,
            Self::RefreshFailed(_) | Self::NotLoggedIn | Self::InvalidCredentials
        )
    }

    /// Whether the user must re-issue a code/session before retrying.
    pub fn requires_reissue(&self) -> bool {
        matches!(self, Self::ChannelExpired)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
