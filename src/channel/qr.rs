use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token::TokenPair;

use super::{ChannelKind, IssueReceipt, VerificationChannel};

/// Cross-device QR approval channel.
///
/// `issue` creates a backend session and spawns a poll loop on a cancellable
/// handle. The loop stops on the first terminal status or when the hard TTL
/// elapses, whichever comes first; on TTL elapse the channel transitions to
/// `Expired` locally without waiting for another poll. Approval delivers the
/// token pair in the poll payload; there is no proof submission step.
pub struct QrLoginChannel {
    client: reqwest::Client,
    generate_url: String,
    status_url: String,
    poll_interval: StdDuration,
    ttl: Duration,
    session: Option<QrSession>,
    updates: Option<watch::Receiver<QrPoll>>,
    poll: Option<PollHandle>,
}

/// A QR login session as known to the client.
#[derive(Debug, Clone)]
pub struct QrSession {
    pub session_id: String,
    pub qr_payload: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Observed state of the QR session. Once it leaves `Pending` it is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPoll {
    /// No session issued yet.
    Idle,
    Pending,
    Approved(TokenPair),
    Expired,
    Rejected,
}

impl QrPoll {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved(_) | Self::Expired | Self::Rejected)
    }
}

/// Handle to the spawned poll loop. Cancel is idempotent and runs
/// automatically on drop, so tearing the channel down can never leak a poll.
struct PollHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

impl QrLoginChannel {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            generate_url: config.endpoint("qr/generate"),
            status_url: config.endpoint("qr/status"),
            poll_interval: config.qr_poll_interval,
            ttl: Duration::from_std(config.qr_session_ttl).unwrap_or(Duration::minutes(5)),
            session: None,
            updates: None,
            poll: None,
        }
    }

    pub fn session(&self) -> Option<&QrSession> {
        self.session.as_ref()
    }

    /// Current observed state, with the hard TTL applied locally: a session
    /// past its deadline reads `Expired` even if the poll task has not
    /// reported yet.
    pub fn current(&self) -> QrPoll {
        let Some(rx) = &self.updates else {
            return QrPoll::Idle;
        };
        let observed = rx.borrow().clone();
        if observed == QrPoll::Pending {
            if let Some(session) = &self.session {
                if Utc::now() >= session.expires_at {
                    return QrPoll::Expired;
                }
            }
        }
        observed
    }

    fn stop_polling(&mut self) {
        if let Some(handle) = self.poll.take() {
            handle.cancel();
        }
    }

    fn spawn_poll(&mut self, session: &QrSession) -> watch::Receiver<QrPoll> {
        let (tx, rx) = watch::channel(QrPoll::Pending);
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let client = self.client.clone();
        let status_url = format!("{}/{}", self.status_url, session.session_id);
        let poll_interval = self.poll_interval;
        let expires_at = session.expires_at;
        let ttl = (expires_at - Utc::now())
            .to_std()
            .unwrap_or(StdDuration::ZERO);

        let task = tokio::spawn(async move {
            let ttl_elapsed = tokio::time::sleep(ttl);
            tokio::pin!(ttl_elapsed);
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick resolves immediately; skip it so the cadence starts
            // one interval after issuance.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = &mut ttl_elapsed => {
                        let _ = tx.send(QrPoll::Expired);
                        break;
                    }
                    _ = ticker.tick() => {
                        if Utc::now() >= expires_at {
                            let _ = tx.send(QrPoll::Expired);
                            break;
                        }
                        match poll_once(&client, &status_url).await {
                            Ok(QrPoll::Pending) => {}
                            Ok(terminal) => {
                                let _ = tx.send(terminal);
                                break;
                            }
                            Err(err) => {
                                // Transient; the next tick retries.
                                tracing::warn!(error = %err, "qr status poll failed");
                            }
                        }
                    }
                }
            }
        });

        self.poll = Some(PollHandle { cancel, task });
        rx
    }
}

#[async_trait]
impl VerificationChannel for QrLoginChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::QrLogin
    }

    async fn issue(&mut self) -> Result<IssueReceipt, AuthError> {
        // Issuing again supersedes the previous session outright.
        self.stop_polling();
        self.session = None;
        self.updates = None;

        let resp = self.client.post(&self.generate_url).send().await?;
        if !resp.status().is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "QR generate failed with status {}",
                resp.status()
            )));
        }
        let payload: GenerateResponse = resp.json().await?;
        let now = Utc::now();
        let session = QrSession {
            session_id: payload.session_id,
            qr_payload: payload.qr_payload,
            created_at: now,
            expires_at: now + self.ttl,
        };
        tracing::debug!(session_id = %session.session_id, "qr session created");

        let rx = self.spawn_poll(&session);
        let receipt = IssueReceipt::QrCreated {
            session_id: session.session_id.clone(),
            qr_payload: session.qr_payload.clone(),
            expires_at: session.expires_at,
        };
        self.updates = Some(rx);
        self.session = Some(session);
        Ok(receipt)
    }

    async fn verify(&mut self, _proof: &str) -> Result<TokenPair, AuthError> {
        Err(AuthError::Unsupported(
            "QR login completes via approval, not proof submission".to_string(),
        ))
    }

    fn cancel(&mut self) {
        self.stop_polling();
        self.session = None;
        self.updates = None;
    }

    fn qr_updates(&self) -> Option<watch::Receiver<QrPoll>> {
        self.updates.clone()
    }
}

async fn poll_once(client: &reqwest::Client, status_url: &str) -> Result<QrPoll, AuthError> {
    let resp = client.get(status_url).send().await?;
    if !resp.status().is_success() {
        return Err(AuthError::InvalidResponse(format!(
            "QR status failed with status {}",
            resp.status()
        )));
    }
    let payload: StatusResponse = resp.json().await?;
    match payload.status.to_ascii_lowercase().as_str() {
        "pending" => Ok(QrPoll::Pending),
        "approved" => match payload.tokens {
            Some(pair) => Ok(QrPoll::Approved(pair)),
            None => Err(AuthError::InvalidResponse(
                "approved QR status missing token pair".to_string(),
            )),
        },
        "expired" => Ok(QrPoll::Expired),
        "rejected" => Ok(QrPoll::Rejected),
        other => Err(AuthError::InvalidResponse(format!(
            "unknown QR status: {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    session_id: String,
    qr_payload: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    tokens: Option<TokenPair>,
}
