use async_trait::async_trait;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token::TokenPair;

use super::email_otp::read_message;
use super::totp::MfaVerifyRequest;
use super::{ChannelKind, IssueReceipt, VerificationChannel};

/// One-time backup-code channel. Stateless on the client; the backend
/// enforces the single-use invariant (an accepted code never validates
/// again). Shares the `/mfa/verify` wire shape with TOTP but is a distinct
/// operation, reachable only from the login-time channel chooser.
pub struct BackupCodeChannel {
    client: reqwest::Client,
    verify_url: String,
    email: String,
    device_id: String,
}

impl BackupCodeChannel {
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
impl VerificationChannel for BackupCodeChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::BackupCode
    }

    async fn issue(&mut self) -> Result<IssueReceipt, AuthError> {
        Ok(IssueReceipt::Ready)
    }

    async fn verify(&mut self, proof: &str) -> Result<TokenPair, AuthError> {
        let code = normalize_backup_code(proof)?;
        let resp = self
            .client
            .post(&self.verify_url)
            .json(&MfaVerifyRequest {
                email: &self.email,
                code: &code,
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
                "backup code verify failed with status {status}"
            )));
        }
        Ok(resp.json().await?)
    }

    fn cancel(&mut self) {}
}

/// Normalize user input to the canonical `XXXX-XXXX` form: separators
/// stripped, uppercase coercion, dash inserted after the fourth character.
pub fn normalize_backup_code(input: &str) -> Result<String, AuthError> {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if compact.len() != 8 || !compact.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AuthError::ChannelProofRejected(
            "backup code must be 8 letters or digits (XXXX-XXXX)".to_string(),
        ));
    }
    Ok(format!("{}-{}", &compact[..4], &compact[4..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_compact_lowercase_input() {
        assert_eq!(normalize_backup_code("ab12cd34").unwrap(), "AB12-CD34");
    }

    #[test]
    fn accepts_already_canonical_input() {
        assert_eq!(normalize_backup_code("AB12-CD34").unwrap(), "AB12-CD34");
    }

    #[test]
    fn strips_whitespace_before_normalizing() {
        assert_eq!(normalize_backup_code(" ab12 cd34 ").unwrap(), "AB12-CD34");
    }

    #[test]
    fn rejects_wrong_length_and_symbols() {
        assert!(normalize_backup_code("ab12cd3").is_err());
        assert!(normalize_backup_code("ab12cd345").is_err());
        assert!(normalize_backup_code("ab12cd3!").is_err());
        assert!(normalize_backup_code("").is_err());
    }

    #[tokio::test]
    async fn verify_rejects_malformed_code_without_network() {
        let config = AuthConfig::new("http://localhost:1");
        let mut ch = BackupCodeChannel::new(&config, "user@example.com", "device-1");
        let result = ch.verify("nope").await;
        assert!(matches!(result, Err(AuthError::ChannelProofRejected(_))));
    }
}
