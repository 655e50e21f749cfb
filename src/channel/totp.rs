use async_trait::async_trait;
use serde::Serialize;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token::TokenPair;

use super::email_otp::read_message;
use super::{is_six_digit_code, ChannelKind, IssueReceipt, VerificationChannel};

/// Authenticator-app TOTP channel. Stateless: the proof is a live 6-digit
/// value whose time window is owned by the backend, so there is no local
/// issuance or expiry tracking. The stable device id rides along so the
/// backend can mark the device trusted on success.
pub struct TotpChannel {
    client: reqwest::Client,
    verify_url: String,
    email: String,
    device_id: String,
}

impl TotpChannel {
    pub fn new(
        config: &AuthConfig,
        email: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            verify_url: config.endpoint("mfa/verify"),
            email: email.into(),
            device_id: device_id.into(),
        }
    }
}

#[async_trait]
impl VerificationChannel for TotpChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Totp
    }

    async fn issue(&mut self) -> Result<IssueReceipt, AuthError> {
        Ok(IssueReceipt::Ready)
    }

    async fn verify(&mut self, proof: &str) -> Result<TokenPair, AuthError> {
        // Strictly an authenticator code; backup-code shapes go through the
        // dedicated backup channel, never here.
        if !is_six_digit_code(proof) {
            return Err(AuthError::ChannelProofRejected(
                "authenticator code must be exactly 6 digits".to_string(),
            ));
        }
        let resp = self
            .client
            .post(&self.verify_url)
            .json(&MfaVerifyRequest {
                email: &self.email,
                code: proof,
                device_id: &self.device_id,
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
                "MFA verify failed with status {status}"
            )));
        }
        Ok(resp.json().await?)
    }

    fn cancel(&mut self) {}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MfaVerifyRequest<'a> {
    pub(crate) email: &'a str,
    pub(crate) code: &'a str,
    pub(crate) device_id: &'a str,
}
