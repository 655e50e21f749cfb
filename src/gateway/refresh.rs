use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;

use crate::error::AuthError;
use crate::token::TokenStore;

type RefreshFuture = Shared<BoxFuture<'static, Result<String, AuthError>>>;

/// Single-flight controller for token refresh.
///
/// At most one `POST /refresh` is ever in flight. The first caller that
/// observes an expired access token starts the refresh; every concurrent
/// caller awaits the same shared future and observes the identical outcome,
/// strictly after the in-flight refresh resolves. On failure the store is
/// cleared in full (tokens and device id) and the session is considered
/// invalidated until a new login.
pub struct RefreshCoordinator {
    client: reqwest::Client,
    refresh_url: String,
    store: Arc<dyn TokenStore>,
    inflight: Mutex<Option<RefreshFuture>>,
}

impl RefreshCoordinator {
    pub fn new(
        client: reqwest::Client,
        refresh_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            client,
            refresh_url: refresh_url.into(),
            store,
            inflight: Mutex::new(None),
        }
    }

    /// Refresh the access token, joining an in-flight refresh if one exists.
    ///
    /// Returns the new access token. The stored refresh token is preserved
    /// (access-only rotation).
    pub async fn ensure_fresh_token(&self) -> Result<String, AuthError> {
        let fut = {
            let mut slot = self.lock_inflight()?;
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let fut = Self::run_refresh(
                        self.client.clone(),
                        self.refresh_url.clone(),
                        self.store.clone(),
                    )
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        let result = fut.clone().await;

        // Release the slot so the next expiry starts a fresh single flight.
        // Every waiter races to do this; ptr_eq keeps it idempotent.
        {
            let mut slot = self.lock_inflight()?;
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&fut)) {
                slot.take();
            }
        }
        result
    }

    fn lock_inflight(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<RefreshFuture>>, AuthError> {
        self.inflight
            .lock()
            .map_err(|_| AuthError::InvalidState("refresh slot lock poisoned".to_string()))
    }

    async fn run_refresh(
        client: reqwest::Client,
        refresh_url: String,
        store: Arc<dyn TokenStore>,
    ) -> Result<String, AuthError> {
        let outcome = Self::call_refresh(&client, &refresh_url, &store).await;
        match outcome {
            Ok(access_token) => {
                store.rotate_access(&access_token)?;
                tracing::debug!("access token rotated");
                Ok(access_token)
            }
            Err(err) => {
                // Fatal: the stored state is unusable. All three client
                // values go together; pending and future callers fail until
                // a new login.
                tracing::warn!(error = %err, "token refresh failed; clearing stored session");
                store.clear_all()?;
                Err(AuthError::RefreshFailed(err.to_string()))
            }
        }
    }

    async fn call_refresh(
        client: &reqwest::Client,
        refresh_url: &str,
        store: &Arc<dyn TokenStore>,
    ) -> Result<String, AuthError> {
        let refresh_token = store
            .tokens()?
            .map(|pair| pair.refresh_token)
            .ok_or(AuthError::NotLoggedIn)?;
        let resp = client
            .post(refresh_url)
            .bearer_auth(&refresh_token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "refresh rejected with status {}",
                resp.status()
            )));
        }
        let payload: RefreshResponse = resp.json().await?;
        if payload.access_token.is_empty() {
            return Err(AuthError::InvalidResponse(
                "refresh response missing access token".to_string(),
            ));
        }
        Ok(payload.access_token)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}
