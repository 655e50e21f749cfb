//! Authorized request plumbing: bearer attachment and transparent refresh.

pub mod refresh;

pub use refresh::RefreshCoordinator;

use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token::TokenStore;

/// Wraps outbound calls to the identity backend for an authenticated session.
///
/// Every request carries the stored bearer access token. On the first 401 the
/// gateway asks the [`RefreshCoordinator`] for a fresh token and replays the
/// request exactly once; a request that has already been retried never
/// re-enters the refresh path.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use authflow::config::AuthConfig;
/// use authflow::gateway::RequestGateway;
/// use authflow::token::MemoryTokenStore;
///
/// let config = AuthConfig::new("https://id.example.com");
/// let gateway = RequestGateway::new(&config, Arc::new(MemoryTokenStore::new()));
/// ```
pub struct RequestGateway {
    client: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    refresh: Arc<RefreshCoordinator>,
}

impl RequestGateway {
    pub fn new(config: &AuthConfig, store: Arc<dyn TokenStore>) -> Self {
        let client = reqwest::Client::new();
        let refresh = Arc::new(RefreshCoordinator::new(
            client.clone(),
            config.endpoint("refresh"),
            store.clone(),
        ));
        Self {
            client,
            base_url: config.base_url.clone(),
            store,
            refresh,
        }
    }

    pub fn store(&self) -> Arc<dyn TokenStore> {
        self.store.clone()
    }

    /// Errors with [`AuthError::NotLoggedIn`] when no token pair is stored.
    pub fn ensure_logged_in(&self) -> Result<(), AuthError> {
        match self.store.tokens()? {
            Some(_) => Ok(()),
            None => Err(AuthError::NotLoggedIn),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send an authorized request, refreshing and replaying once on 401.
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, AuthError> {
        let retry = request.try_clone();
        let access = self
            .store
            .tokens()?
            .map(|pair| pair.access_token)
            .ok_or(AuthError::NotLoggedIn)?;

        let response = request.bearer_auth(&access).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(retry) = retry else {
            return Err(AuthError::Unauthorized);
        };
        let fresh = self.refresh.ensure_fresh_token().await?;
        tracing::debug!("replaying request after refresh");
        let response = retry.bearer_auth(&fresh).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // Replay marked: do not loop through refresh again.
            return Err(AuthError::Unauthorized);
        }
        Ok(response)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthError> {
        let response = self.send(self.client.get(self.url(path))).await?;
        Self::decode(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), AuthError> {
        let response = self.send(self.client.delete(self.url(path))).await?;
        if !response.status().is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "delete {path} failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AuthError> {
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "request failed with status {status}"
            )));
        }
        Ok(response.json().await?)
    }
}
