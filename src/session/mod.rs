//! Login attempt state machine: credentials through second-factor completion.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::channel::{
    BackupCodeChannel, ChannelKind, EmailOtpChannel, IssueReceipt, QrLoginChannel, QrPoll,
    SmsOtpChannel, TotpChannel, VerificationChannel,
};
use crate::config::AuthConfig;
use crate::device;
use crate::error::AuthError;
use crate::token::TokenStore;

/// Ephemeral login credentials; consumed once by [`VerificationSession::start`].
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Where a login attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    PasswordVerified,
    AwaitingChannelSelection,
    ChannelPending,
    ChannelProofSubmitted,
    Authenticated,
    Failed,
}

/// Which second factor the user picked, with the extra input a channel needs.
#[derive(Debug, Clone)]
pub enum ChannelSelection {
    EmailOtp,
    /// `phone` is the user-supplied destination number; it is checked against
    /// the account's registered number before any send.
    SmsOtp { phone: String },
    Totp,
    BackupCode,
    QrLogin,
}

impl ChannelSelection {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::EmailOtp => ChannelKind::EmailOtp,
            Self::SmsOtp { .. } => ChannelKind::SmsOtp,
            Self::Totp => ChannelKind::Totp,
            Self::BackupCode => ChannelKind::BackupCode,
            Self::QrLogin => ChannelKind::QrLogin,
        }
    }
}

/// Orchestrates a login attempt from credential submission to an
/// authenticated session.
///
/// A second factor is always demanded after password verification: any token
/// pair the backend returns alongside the password check is discarded
/// client-side, never stored. The token store is only written on
/// second-factor acceptance, as one atomic pair replacement.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use authflow::config::AuthConfig;
/// use authflow::session::{ChannelSelection, Credentials, VerificationSession};
/// use authflow::token::MemoryTokenStore;
///
/// # async fn example() -> authflow::error::Result<()> {
/// let config = AuthConfig::new("https://id.example.com");
/// let mut session = VerificationSession::new(config, Arc::new(MemoryTokenStore::new()));
/// session.start(Credentials::new("user@example.com", "hunter2"), None).await?;
/// session.select_channel(ChannelSelection::EmailOtp)?;
/// session.issue().await?;
/// session.submit_proof("123456").await?;
/// # Ok(())
/// # }
/// ```
pub struct VerificationSession {
    config: AuthConfig,
    client: reqwest::Client,
    store: Arc<dyn TokenStore>,
    status: SessionStatus,
    pending_email: Option<String>,
    registered_phone: Option<String>,
    channel: Option<Box<dyn VerificationChannel>>,
}

impl VerificationSession {
    pub fn new(config: AuthConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            store,
            status: SessionStatus::Idle,
            pending_email: None,
            registered_phone: None,
            channel: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn pending_email(&self) -> Option<&str> {
        self.pending_email.as_deref()
    }

    pub fn selected_channel(&self) -> Option<ChannelKind> {
        self.channel.as_ref().map(|c| c.kind())
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    /// Submit credentials (and the CAPTCHA proof token when CAPTCHA is
    /// enabled). On success the session lands in `AwaitingChannelSelection`;
    /// a rejected password moves it to `Failed` (recover via [`cancel`]).
    ///
    /// The CAPTCHA gate short-circuits before any network call.
    ///
    /// [`cancel`]: Self::cancel
    pub async fn start(
        &mut self,
        credentials: Credentials,
        captcha_token: Option<&str>,
    ) -> Result<(), AuthError> {
        if self.status != SessionStatus::Idle {
            return Err(AuthError::InvalidState(format!(
                "start is only valid from Idle, not {:?}",
                self.status
            )));
        }
        if self.config.captcha_required
            && captcha_token.map_or(true, |token| token.trim().is_empty())
        {
            return Err(AuthError::CaptchaRequired);
        }

        let resp = self
            .client
            .post(self.config.endpoint("login"))
            .json(&LoginRequest {
                email: &credentials.email,
                password: &credentials.password,
                captcha_token,
            })
            .send()
            .await?;
        let status = resp.status();
        if status.is_client_error() {
            self.status = SessionStatus::Failed;
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "login failed with status {status}"
            )));
        }
        let payload: LoginResponse = resp.json().await?;
        if !payload.success {
            self.status = SessionStatus::Failed;
            return Err(AuthError::InvalidCredentials);
        }

        // The backend may return a usable pair here; it is discarded. No
        // authenticated session exists without second-factor completion.
        self.status = SessionStatus::PasswordVerified;
        tracing::debug!(email = %credentials.email, "password verified");
        self.pending_email = Some(credentials.email);
        self.registered_phone = payload.phone;
        device::ensure_device_id(self.store.as_ref())?;
        self.require_second_factor();
        Ok(())
    }

    fn require_second_factor(&mut self) {
        self.status = SessionStatus::AwaitingChannelSelection;
        tracing::debug!("awaiting second-factor channel selection");
    }

    /// Pick (or switch) the second-factor channel. Any previously selected
    /// channel is fully torn down, timers and polls included, before the new
    /// controller exists.
    pub fn select_channel(&mut self, selection: ChannelSelection) -> Result<(), AuthError> {
        if !matches!(
            self.status,
            SessionStatus::AwaitingChannelSelection | SessionStatus::ChannelPending
        ) {
            return Err(AuthError::InvalidState(format!(
                "channel selection is not valid in {:?}",
                self.status
            )));
        }
        self.teardown_channel();

        let email = self
            .pending_email
            .clone()
            .ok_or_else(|| AuthError::InvalidState("no pending login".to_string()))?;
        let channel: Box<dyn VerificationChannel> = match selection {
            ChannelSelection::EmailOtp => Box::new(EmailOtpChannel::new(&self.config, email)),
            ChannelSelection::SmsOtp { phone } => {
                let mut ch = SmsOtpChannel::new(&self.config, email, phone);
                if let Some(registered) = &self.registered_phone {
                    ch = ch.with_registered_phone(registered.clone());
                }
                Box::new(ch)
            }
            ChannelSelection::Totp => {
                Box::new(TotpChannel::new(&self.config, email, self.device_id()?))
            }
            ChannelSelection::BackupCode => {
                Box::new(BackupCodeChannel::new(&self.config, email, self.device_id()?))
            }
            ChannelSelection::QrLogin => Box::new(QrLoginChannel::new(&self.config)),
        };
        tracing::debug!(kind = %channel.kind(), "second-factor channel selected");
        self.channel = Some(channel);
        self.status = SessionStatus::ChannelPending;
        Ok(())
    }

    /// Issue (or re-issue) the selected channel's out-of-band code or QR
    /// session. Re-issuing supersedes anything outstanding.
    pub async fn issue(&mut self) -> Result<IssueReceipt, AuthError> {
        if self.status != SessionStatus::ChannelPending {
            return Err(AuthError::InvalidState(format!(
                "issue is not valid in {:?}",
                self.status
            )));
        }
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| AuthError::InvalidState("no channel selected".to_string()))?;
        channel.issue().await
    }

    /// Submit a proof for the selected channel. Acceptance finalizes the
    /// session; rejection is recoverable and leaves it in `ChannelPending`.
    pub async fn submit_proof(&mut self, proof: &str) -> Result<(), AuthError> {
        if self.status != SessionStatus::ChannelPending {
            return Err(AuthError::InvalidState(format!(
                "proof submission is not valid in {:?}",
                self.status
            )));
        }
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| AuthError::InvalidState("no channel selected".to_string()))?;
        self.status = SessionStatus::ChannelProofSubmitted;
        match channel.verify(proof).await {
            Ok(pair) => {
                self.finalize(pair)?;
                Ok(())
            }
            Err(err) => {
                self.status = SessionStatus::ChannelPending;
                Err(err)
            }
        }
    }

    /// Drive a QR channel to its terminal outcome. Approval finalizes the
    /// session; expiry or rejection leaves it in `ChannelPending` so the
    /// user can re-issue.
    pub async fn await_qr_result(&mut self) -> Result<(), AuthError> {
        if self.status != SessionStatus::ChannelPending {
            return Err(AuthError::InvalidState(format!(
                "QR wait is not valid in {:?}",
                self.status
            )));
        }
        let mut rx = self
            .channel
            .as_ref()
            .and_then(|c| c.qr_updates())
            .ok_or_else(|| {
                AuthError::InvalidState("selected channel has no QR session".to_string())
            })?;
        loop {
            let observed = rx.borrow_and_update().clone();
            match observed {
                QrPoll::Approved(pair) => {
                    self.finalize(pair)?;
                    return Ok(());
                }
                QrPoll::Expired => return Err(AuthError::ChannelExpired),
                QrPoll::Rejected => {
                    return Err(AuthError::ChannelProofRejected(
                        "login request was rejected on the other device".to_string(),
                    ));
                }
                QrPoll::Idle | QrPoll::Pending => {
                    rx.changed().await.map_err(|_| {
                        AuthError::InvalidState("QR polling stopped".to_string())
                    })?;
                }
            }
        }
    }

    /// Abandon the attempt from any state. Idempotent; stops all channel
    /// timers and polls before returning.
    pub fn cancel(&mut self) {
        self.teardown_channel();
        self.pending_email = None;
        self.registered_phone = None;
        self.status = SessionStatus::Idle;
    }

    fn teardown_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.cancel();
        }
    }

    fn device_id(&self) -> Result<String, AuthError> {
        device::ensure_device_id(self.store.as_ref())
    }

    fn finalize(&mut self, pair: crate::token::TokenPair) -> Result<(), AuthError> {
        // Atomic pair write; the only other writer is the refresh coordinator.
        self.store.save_tokens(&pair)?;
        self.teardown_channel();
        self.pending_email = None;
        self.registered_phone = None;
        self.status = SessionStatus::Authenticated;
        tracing::debug!("session authenticated");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    captcha_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    success: bool,
    phone: Option<String>,
}
