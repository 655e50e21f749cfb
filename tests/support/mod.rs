//! Shared helpers for the wiremock-backed integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authflow::config::AuthConfig;
use authflow::session::{Credentials, VerificationSession};
use authflow::token::MemoryTokenStore;

/// Config whose every endpoint resolves to the mock server.
pub fn mock_config(server: &MockServer) -> AuthConfig {
    AuthConfig::new(server.uri())
}

pub fn pair_json(access: &str, refresh: &str) -> serde_json::Value {
    json!({ "accessToken": access, "refreshToken": refresh })
}

/// Mount a successful `POST /login` (no registered phone).
pub async fn mount_login_ok(server: &MockServer) {
    mount_login_ok_with_phone(server, None).await;
}

pub async fn mount_login_ok_with_phone(server: &MockServer, phone: Option<&str>) {
    let mut body = json!({
        "success": true,
        "message": "ok",
        // The password step hands back a usable pair; the client must discard it.
        "accessToken": "premature-access",
        "refreshToken": "premature-refresh"
    });
    if let Some(phone) = phone {
        body["phone"] = json!(phone);
    }
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// A session driven past the password step, ready for channel selection.
/// Requires a login mock to already be mounted on the config's server.
pub async fn verified_session(
    config: AuthConfig,
) -> (Arc<MemoryTokenStore>, VerificationSession) {
    let store = Arc::new(MemoryTokenStore::new());
    let mut session = VerificationSession::new(config, store.clone());
    session
        .start(Credentials::new("user@example.com", "hunter2"), None)
        .await
        .expect("password step");
    (store, session)
}
