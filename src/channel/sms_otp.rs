use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token::TokenPair;

use super::{is_six_digit_code, ChannelKind, IssueReceipt, VerificationChannel};

/// SMS OTP channel. Same code lifecycle as email OTP, plus destination
/// checks that run before any network call: the number must be a valid
/// Vietnamese mobile number, and when the account already has a registered
/// number the supplied one must match it (`+84` and leading `0` are
/// equivalent).
pub struct SmsOtpChannel {
    client: reqwest::Client,
    send_url: String,
    verify_url: String,
    email: String,
    phone: String,
    registered_phone: Option<String>,
    validity: Duration,
    resend_cooldown: Duration,
    issued: Option<IssuedCode>,
}

#[derive(Debug, Clone)]
struct IssuedCode {
    expires_at: DateTime<Utc>,
    resend_available_at: DateTime<Utc>,
}

impl SmsOtpChannel {
    pub fn new(
        config: &AuthConfig,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            send_url: config.endpoint("sms-otp/send"),
            verify_url: config.endpoint("sms-otp/verify"),
            email: email.into(),
            phone: phone.into(),
            registered_phone: None,
            validity: Duration::from_std(config.otp_validity).unwrap_or(Duration::seconds(120)),
            resend_cooldown: Duration::from_std(config.otp_resend_cooldown)
                .unwrap_or(Duration::seconds(120)),
            issued: None,
        }
    }

    /// Account's registered number, when known; enables the mismatch refusal.
    pub fn with_registered_phone(mut self, phone: impl Into<String>) -> Self {
        self.registered_phone = Some(phone.into());
        self
    }

    pub fn remaining_seconds(&self) -> Option<u64> {
        let issued = self.issued.as_ref()?;
        Some((issued.expires_at - Utc::now()).num_seconds().max(0) as u64)
    }

    fn check_destination(&self) -> Result<(), AuthError> {
        if !is_vietnamese_mobile(&self.phone) {
            return Err(AuthError::ChannelProofRejected(
                "invalid Vietnamese mobile number".to_string(),
            ));
        }
        if let Some(registered) = &self.registered_phone {
            if !phones_match(&self.phone, registered) {
                return Err(AuthError::PhoneMismatch);
            }
        }
        Ok(())
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
impl VerificationChannel for SmsOtpChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::SmsOtp
    }

    async fn issue(&mut self) -> Result<IssueReceipt, AuthError> {
        self.check_destination()?;
        self.check_resend_window()?;
        let resp = self
            .client
            .post(&self.send_url)
            .json(&SendRequest { phone: &self.phone })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "SMS OTP send failed with status {}",
                resp.status()
            )));
        }
        let now = Utc::now();
        let issued = IssuedCode {
            expires_at: now + self.validity,
            resend_available_at: now + self.resend_cooldown,
        };
        tracing::debug!("sms OTP issued");
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
                phone: &self.phone,
                otp: proof,
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "SMS OTP verify failed with status {}",
                resp.status()
            )));
        }
        let payload: VerifyResponse = resp.json().await?;
        if !payload.success {
            return Err(AuthError::ChannelProofRejected(
                payload
                    .message
                    .unwrap_or_else(|| "incorrect code".to_string()),
            ));
        }
        let pair = payload.tokens()?;
        self.issued = None;
        Ok(pair)
    }

    fn cancel(&mut self) {
        self.issued = None;
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    phone: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    email: &'a str,
    phone: &'a str,
    otp: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    success: bool,
    message: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
}

impl VerifyResponse {
    fn tokens(self) -> Result<TokenPair, AuthError> {
        match (self.access_token, self.refresh_token) {
            (Some(access), Some(refresh)) => Ok(TokenPair::new(access, refresh)),
            _ => Err(AuthError::InvalidResponse(
                "verify response missing token pair".to_string(),
            )),
        }
    }
}

/// `+84` or a leading `0`, then 9–10 digits.
pub fn is_vietnamese_mobile(phone: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(\+84|0)\d{9,10}$").expect("valid phone regex"));
    re.is_match(phone)
}

/// Canonical national form: the digits after the `+84`/`0` prefix.
fn national_digits(phone: &str) -> Option<&str> {
    phone
        .strip_prefix("+84")
        .or_else(|| phone.strip_prefix('0'))
}

/// Whether two numbers refer to the same subscriber under `+84`/`0`
/// prefix normalization.
pub fn phones_match(a: &str, b: &str) -> bool {
    match (national_digits(a), national_digits(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}
