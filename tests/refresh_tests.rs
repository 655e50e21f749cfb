//! Single-flight refresh: one `/refresh` per expiry, consistent fan-out,
//! full teardown on failure.

mod support;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authflow::device::TrustedDevice;
use authflow::error::AuthError;
use authflow::gateway::RequestGateway;
use authflow::token::{MemoryTokenStore, TokenPair, TokenStore};

use support::mock_config;

fn seeded_store() -> Arc<MemoryTokenStore> {
    let store = Arc::new(MemoryTokenStore::new());
    store
        .save_tokens(&TokenPair::new("stale-access", "refresh-1"))
        .unwrap();
    store.save_device_id("device-1").unwrap();
    store
}

async fn mount_devices_by_bearer(server: &MockServer, fresh_access: &str) {
    // Specific mock first: the fresh bearer succeeds.
    Mock::given(method("GET"))
        .and(path("/devices"))
        .and(header("authorization", format!("Bearer {fresh_access}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
    // Everything else (the stale bearer) is unauthorized.
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(server)
        .await;
}

#[tokio::test]
async fn n_concurrent_expiries_trigger_exactly_one_refresh() {
    let server = MockServer::start().await;
    mount_devices_by_bearer(&server, "fresh-access").await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .and(header("authorization", "Bearer refresh-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": "fresh-access" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store();
    let gateway = Arc::new(RequestGateway::new(&mock_config(&server), store.clone()));

    let calls = (0..5).map(|_| {
        let gateway = gateway.clone();
        async move { gateway.get_json::<Vec<TrustedDevice>>("devices").await }
    });
    let results = join_all(calls).await;

    for result in results {
        assert!(result.unwrap().is_empty());
    }
    let pair = store.tokens().unwrap().unwrap();
    assert_eq!(pair.access_token, "fresh-access");
    // Access-only rotation: the refresh token survives.
    assert_eq!(pair.refresh_token, "refresh-1");
}

#[tokio::test]
async fn refresh_failure_fails_every_caller_and_clears_the_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .respond_with(
            ResponseTemplate::new(401).set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store();
    let gateway = Arc::new(RequestGateway::new(&mock_config(&server), store.clone()));

    let calls = (0..4).map(|_| {
        let gateway = gateway.clone();
        async move { gateway.get_json::<Vec<TrustedDevice>>("devices").await }
    });
    let results = join_all(calls).await;

    for result in results {
        assert!(matches!(result, Err(AuthError::RefreshFailed(_))));
    }
    // Fatal teardown: tokens and device id go together.
    assert!(store.tokens().unwrap().is_none());
    assert!(store.device_id().unwrap().is_none());

    // Future callers fail outright until a new login.
    let result = gateway.get_json::<Vec<TrustedDevice>>("devices").await;
    assert!(matches!(result, Err(AuthError::NotLoggedIn)));
}

#[tokio::test]
async fn a_replayed_request_never_reenters_the_refresh_path() {
    let server = MockServer::start().await;
    // The backend keeps answering 401 even with the fresh token.
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "fresh-access" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store();
    let gateway = RequestGateway::new(&mock_config(&server), store.clone());

    let result = gateway.get_json::<Vec<TrustedDevice>>("devices").await;
    assert!(matches!(result, Err(AuthError::Unauthorized)));
    // The refresh itself succeeded once; the `.expect(1)` on the mock proves
    // the replay did not loop back into it.
    assert_eq!(store.tokens().unwrap().unwrap().access_token, "fresh-access");
}

#[tokio::test]
async fn sequential_expiries_each_get_their_own_flight() {
    let server = MockServer::start().await;
    mount_devices_by_bearer(&server, "fresh-access").await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "fresh-access" })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let store = seeded_store();
    let gateway = RequestGateway::new(&mock_config(&server), store.clone());
    gateway
        .get_json::<Vec<TrustedDevice>>("devices")
        .await
        .unwrap();

    // Second expiry later on: the slot was released, a new flight starts.
    store
        .save_tokens(&TokenPair::new("stale-access", "refresh-1"))
        .unwrap();
    gateway
        .get_json::<Vec<TrustedDevice>>("devices")
        .await
        .unwrap();
}

#[tokio::test]
async fn gateway_without_stored_tokens_refuses_to_send() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let gateway = RequestGateway::new(&mock_config(&server), store.clone());
    assert!(matches!(
        gateway.ensure_logged_in(),
        Err(AuthError::NotLoggedIn)
    ));
    let result = gateway.get_json::<Vec<TrustedDevice>>("devices").await;
    assert!(matches!(result, Err(AuthError::NotLoggedIn)));

    store
        .save_tokens(&TokenPair::new("access", "refresh"))
        .unwrap();
    gateway.ensure_logged_in().unwrap();
}
