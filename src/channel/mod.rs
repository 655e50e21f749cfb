//! Second-factor channels and the common contract the session drives.

pub mod backup_code;
pub mod email_otp;
pub mod qr;
pub mod sms_otp;
pub mod totp;

pub use backup_code::BackupCodeChannel;
pub use email_otp::EmailOtpChannel;
pub use qr::{QrLoginChannel, QrPoll, QrSession};
pub use sms_otp::SmsOtpChannel;
pub use totp::TotpChannel;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strum::{Display, EnumIter, EnumString};
use tokio::sync::watch;

use crate::error::AuthError;
use crate::token::TokenPair;

/// The five interchangeable second-factor channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum ChannelKind {
    EmailOtp,
    SmsOtp,
    Totp,
    BackupCode,
    QrLogin,
}

/// What `issue` produced, for the caller to surface.
#[derive(Debug, Clone)]
pub enum IssueReceipt {
    /// Stateless channel: nothing was sent; a proof may be submitted directly.
    Ready,
    /// An out-of-band code was dispatched.
    CodeSent {
        expires_at: DateTime<Utc>,
        resend_available_at: DateTime<Utc>,
    },
    /// A QR session was created; render the payload and await approval.
    QrCreated {
        session_id: String,
        qr_payload: String,
        expires_at: DateTime<Utc>,
    },
}

/// Common contract every channel controller implements.
///
/// `cancel` is synchronous and idempotent: it must stop all timers and polls
/// owned by the channel before returning, so switching channels can never
/// leak a stale poll that later authenticates an abandoned session.
#[async_trait]
pub trait VerificationChannel: Send {
    fn kind(&self) -> ChannelKind;

    /// Request an out-of-band code or session. Issuing again supersedes any
    /// previously outstanding code for this channel.
    async fn issue(&mut self) -> Result<IssueReceipt, AuthError>;

    /// Submit a proof value; on acceptance the backend hands back the pair.
    async fn verify(&mut self, proof: &str) -> Result<TokenPair, AuthError>;

    /// Tear the channel down. Safe to call any number of times.
    fn cancel(&mut self);

    /// QR-style channels expose their poll outcome stream; everyone else
    /// returns `None`.
    fn qr_updates(&self) -> Option<watch::Receiver<QrPoll>> {
        None
    }
}

/// Local gate shared by the OTP and TOTP channels: exactly six ASCII digits.
pub(crate) fn is_six_digit_code(proof: &str) -> bool {
    proof.len() == 6 && proof.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn six_digit_gate_accepts_only_numeric_codes() {
        assert!(is_six_digit_code("012345"));
        assert!(!is_six_digit_code("12345"));
        assert!(!is_six_digit_code("1234567"));
        assert!(!is_six_digit_code("12a456"));
        assert!(!is_six_digit_code("AB12-CD34"));
    }

    #[test]
    fn channel_kind_parses_kebab_case() {
        assert_eq!(ChannelKind::from_str("email-otp").unwrap(), ChannelKind::EmailOtp);
        assert_eq!(ChannelKind::from_str("qr-login").unwrap(), ChannelKind::QrLogin);
        assert_eq!(ChannelKind::Totp.to_string(), "totp");
        assert!(ChannelKind::from_str("carrier-pigeon").is_err());
    }
}
