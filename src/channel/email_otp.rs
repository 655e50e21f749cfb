use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token::TokenPair;

use super::{is_six_digit_code, ChannelKind, IssueReceipt, VerificationChannel};

/// Email OTP channel: a 6-digit code sent out-of-band with a 120-second
/// validity window and an independent resend cooldown.
///
/// Exactly one code is live at a time; issuing again supersedes the previous
/// one. Non-6-digit proofs are rejected locally without a network round trip.
pub struct EmailOtpChannel {
    client: reqwest::Client,
    send_url: String,
    verify_url: String,
    email: String,
    validity: Duration,
    resend_cooldown: Duration,
    issued: Option<IssuedCode>,
}

#[derive(Debug, Clone)]
struct IssuedCode {
    expires_at: DateTime<Utc>,
    resend_available_at: DateTime<Utc>,
    /// Bumped on every issue; a superseded code can never verify again.
    generation: u32,
}

impl EmailOtpChannel {
    pub fn new(config: &AuthConfig, email: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            send_url: config.endpoint("otp/send"),
            verify_url: config.endpoint("otp/verify"),
            email: email.into(),
            validity: Duration::from_std(config.otp_validity).unwrap_or(Duration::seconds(120)),
            resend_cooldown: Duration::from_std(config.otp_resend_cooldown)
                .unwrap_or(Duration::seconds(120)),
            issued: None,
        }
    }

    /// Seconds the live code remains valid, for UI countdown display.
    pub fn remaining_seconds(&self) -> Option<u64> {
        let issued = self.issued.as_ref()?;
        let left = (issued.expires_at - Utc::now()).num_seconds();
        Some(left.max(0) as u64)
    }

    /// Seconds until a resend is permitted; `Some(0)` means available now.
    pub fn resend_in_seconds(&self) -> Option<u64> {
        let issued = self.issued.as_ref()?;
        let left = (issued.resend_available_at - Utc::now()).num_seconds();
        Some(left.max(0) as u64)
    }

    fn check_resend_window(&self) -> Result<(), AuthError> {
        if let Some(issued) = &self.issued {
            let remaining = (issued.resend_available_at - Utc::now()).num_seconds();
            if remaining > 0 {
                return Err(AuthError::ResendCooldown {
                    remaining_secs: remaining as u64,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VerificationChannel for EmailOtpChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::EmailOtp
    }

    async fn issue(&mut self) -> Result<IssueReceipt, AuthError> {
        self.check_resend_window()?;
        let resp = self
            .client
            .post(&self.send_url)
            .json(&SendRequest { email: &self.email })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "OTP send failed with status {}",
                resp.status()
            )));
        }
        let now = Utc::now();
        let generation = self.issued.as_ref().map_or(0, |c| c.generation) + 1;
        let issued = IssuedCode {
            expires_at: now + self.validity,
            resend_available_at: now + self.resend_cooldown,
            generation,
        };
        tracing::debug!(generation, "email OTP issued");
        let receipt = IssueReceipt::CodeSent {
            expires_at: issued.expires_at,
            resend_available_at: issued.resend_available_at,
        };
        self.issued = Some(issued);
        Ok(receipt)
    }

    async fn verify(&mut self, proof: &str) -> Result<TokenPair, AuthError> {
        if !is_six_digit_code(proof) {
            return Err(AuthError::ChannelProofRejected(
                "code must be exactly 6 digits".to_string(),
            ));
        }
        let Some(issued) = &self.issued else {
            return Err(AuthError::InvalidState("no code has been issued".to_string()));
        };
        if Utc::now() >= issued.expires_at {
            return Err(AuthError::ChannelExpired);
        }
        let resp = self
            .client
            .post(&self.verify_url)
            .json(&VerifyRequest {
                email: &self.email,
                otp: proof,
            })
            .send()
            .await?;
        let status = resp.status();
        if status.is_client_error() {
            let message = read_message(resp).await;
            return Err(AuthError::ChannelProofRejected(message));
        }
        if !status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "OTP verify failed with status {status}"
            )));
        }
        let pair: TokenPair = resp.json().await?;
        self.issued = None;
        Ok(pair)
    }

    fn cancel(&mut self) {
        self.issued = None;
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    email: &'a str,
    otp: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Pull a human message out of a rejection body, falling back to the status.
pub(crate) async fn read_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(ErrorBody { message: Some(m) }) if !m.is_empty() => m,
        _ => format!("rejected with status {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn channel() -> EmailOtpChannel {
        let config = AuthConfig::new("http://localhost:1");
        EmailOtpChannel::new(&config, "user@example.com")
    }

    fn issued(expires_in: i64, resend_in: i64) -> IssuedCode {
        let now = Utc::now();
        IssuedCode {
            expires_at: now + Duration::seconds(expires_in),
            resend_available_at: now + Duration::seconds(resend_in),
            generation: 1,
        }
    }

    #[tokio::test]
    async fn verify_without_issue_is_invalid_state() {
        let mut ch = channel();
        let result = ch.verify("123456").await;
        assert!(matches!(result, Err(AuthError::InvalidState(_))));
    }

    #[tokio::test]
    async fn verify_rejects_malformed_code_locally() {
        // No live server behind the URL: a network attempt would error as
        // Network, so ChannelProofRejected proves the gate fired first.
        let mut ch = channel();
        ch.issued = Some(issued(120, 120));
        let result = ch.verify("12 456").await;
        assert!(matches!(result, Err(AuthError::ChannelProofRejected(_))));
    }

    #[tokio::test]
    async fn verify_after_expiry_requires_reissue() {
        let mut ch = channel();
        ch.issued = Some(issued(-1, -1));
        let result = ch.verify("123456").await;
        assert!(matches!(result, Err(AuthError::ChannelExpired)));
    }

    #[tokio::test]
    async fn issue_during_cooldown_is_refused() {
        let mut ch = channel();
        ch.issued = Some(issued(120, 90));
        let result = ch.issue().await;
        match result {
            Err(AuthError::ResendCooldown { remaining_secs }) => {
                assert!(remaining_secs > 0 && remaining_secs <= 90);
            }
            other => panic!("expected ResendCooldown, got {other:?}"),
        }
    }

    #[test]
    fn countdowns_clamp_at_zero() {
        let mut ch = channel();
        assert!(ch.remaining_seconds().is_none());
        ch.issued = Some(issued(-30, -30));
        assert_eq!(ch.remaining_seconds(), Some(0));
        assert_eq!(ch.resend_in_seconds(), Some(0));
    }

    #[test]
    fn cancel_drops_the_live_code() {
        let mut ch = channel();
        ch.issued = Some(issued(120, 120));
        ch.cancel();
        ch.cancel();
        assert!(ch.issued.is_none());
    }

    #[test]
    fn chrono_conversion_handles_custom_validity() {
        let config =
            AuthConfig::new("http://localhost:1").with_otp_validity(StdDuration::from_secs(30));
        let ch = EmailOtpChannel::new(&config, "user@example.com");
        assert_eq!(ch.validity, Duration::seconds(30));
    }
}
