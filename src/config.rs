//! Configuration for the authentication core (code > env > defaults).

use std::time::Duration;

/// Default second-factor code validity window.
const DEFAULT_OTP_VALIDITY: Duration = Duration::from_secs(120);
/// Default cooldown before a code may be re-sent. Independent of validity.
const DEFAULT_OTP_RESEND_COOLDOWN: Duration = Duration::from_secs(120);
/// Default QR status poll cadence.
const DEFAULT_QR_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Hard time-to-live for a QR login session.
const DEFAULT_QR_SESSION_TTL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on the QR poll interval; anything slower hurts perceived latency.
const MAX_QR_POLL_INTERVAL: Duration = Duration::from_secs(10);
const MIN_QR_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Tunable settings shared by the session, channels, and gateway.
///
/// # Example
/// ```
/// use authflow::config::AuthConfig;
/// use std::time::Duration;
///
/// let config = AuthConfig::new("https://id.example.com")
///     .with_captcha_required(true)
///     .with_qr_poll_interval(Duration::from_secs(2));
/// assert_eq!(config.qr_poll_interval, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL of the identity backend.
    pub base_url: String,
    /// Whether `start` demands a CAPTCHA proof token alongside credentials.
    pub captcha_required: bool,
    pub otp_validity: Duration,
    pub otp_resend_cooldown: Duration,
    pub qr_poll_interval: Duration,
    pub qr_session_ttl: Duration,
}

impl AuthConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_trailing_slash(base_url.into()),
            captcha_required: false,
            otp_validity: DEFAULT_OTP_VALIDITY,
            otp_resend_cooldown: DEFAULT_OTP_RESEND_COOLDOWN,
            qr_poll_interval: DEFAULT_QR_POLL_INTERVAL,
            qr_session_ttl: DEFAULT_QR_SESSION_TTL,
        }
    }

    /// Build a config from `AUTHFLOW_*` environment variables, loading a
    /// `.env` file first if one is present.
    ///
    /// Recognized variables: `AUTHFLOW_BASE_URL` (required),
    /// `AUTHFLOW_CAPTCHA_REQUIRED`, `AUTHFLOW_QR_POLL_INTERVAL_SECS`.
    pub fn from_env() -> Option<Self> {
        let _ = dotenvy::dotenv();
        let base_url = std::env::var("AUTHFLOW_BASE_URL").ok()?;
        let mut config = Self::new(base_url);
        if let Ok(value) = std::env::var("AUTHFLOW_CAPTCHA_REQUIRED") {
            config.captcha_required = matches!(value.as_str(), "1" | "true" | "yes");
        }
        if let Some(secs) = std::env::var("AUTHFLOW_QR_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config = config.with_qr_poll_interval(Duration::from_secs(secs));
        }
        Some(config)
    }

    pub fn with_captcha_required(mut self, required: bool) -> Self {
        self.captcha_required = required;
        self
    }

    pub fn with_otp_validity(mut self, validity: Duration) -> Self {
        self.otp_validity = validity;
        self
    }

    pub fn with_otp_resend_cooldown(mut self, cooldown: Duration) -> Self {
        self.otp_resend_cooldown = cooldown;
        self
    }

    /// Set the QR poll cadence, clamped to 1–10 seconds.
    pub fn with_qr_poll_interval(mut self, interval: Duration) -> Self {
        self.qr_poll_interval = interval.clamp(MIN_QR_POLL_INTERVAL, MAX_QR_POLL_INTERVAL);
        self
    }

    pub fn with_qr_session_ttl(mut self, ttl: Duration) -> Self {
        self.qr_session_ttl = ttl;
        self
    }

    /// Join a path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
