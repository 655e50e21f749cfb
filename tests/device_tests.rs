//! Trusted-device registry: list, revocation rules, and new-device alerts.

mod support;

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authflow::device::DeviceTrustRegistry;
use authflow::error::AuthError;
use authflow::gateway::RequestGateway;
use authflow::token::{MemoryTokenStore, TokenPair, TokenStore};

use support::mock_config;

fn registry(server: &MockServer) -> (Arc<MemoryTokenStore>, DeviceTrustRegistry) {
    let store = Arc::new(MemoryTokenStore::new());
    store
        .save_tokens(&TokenPair::new("access-1", "refresh-1"))
        .unwrap();
    store.save_device_id("own-device").unwrap();
    let gateway = Arc::new(RequestGateway::new(&mock_config(server), store.clone()));
    (store, DeviceTrustRegistry::new(gateway))
}

fn device_json(id: &str, ip: &str, last_login: chrono::DateTime<Utc>) -> serde_json::Value {
    json!({
        "deviceId": id,
        "userAgent": "Mozilla/5.0",
        "ipAddress": ip,
        "lastLogin": last_login.to_rfc3339(),
        "trusted": true
    })
}

#[tokio::test]
async fn list_returns_the_parsed_device_entries() {
    let server = MockServer::start().await;
    let now = Utc::now();
    Mock::given(method("GET"))
        .and(path("/devices"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            device_json("own-device", "10.0.0.1", now),
            device_json("laptop", "10.0.0.2", now - Duration::days(2)),
        ])))
        .mount(&server)
        .await;

    let (_store, registry) = registry(&server);
    let devices = registry.list().await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[1].device_id, "laptop");
    assert!(devices[1].trusted);
}

#[tokio::test]
async fn revoking_the_current_device_is_refused_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/devices/own-device"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_store, registry) = registry(&server);
    let result = registry.revoke("own-device").await;
    assert!(matches!(result, Err(AuthError::Unsupported(_))));
}

#[tokio::test]
async fn revoking_another_device_deletes_it() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/devices/laptop"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (_store, registry) = registry(&server);
    registry.revoke("laptop").await.unwrap();
}

#[tokio::test]
async fn revoke_others_hits_the_bulk_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (_store, registry) = registry(&server);
    registry.revoke_others().await.unwrap();
}

#[tokio::test]
async fn recent_alerts_surface_only_fresh_foreign_logins() {
    let server = MockServer::start().await;
    let now = Utc::now();
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            // Own device: excluded even though recent.
            device_json("own-device", "10.0.0.1", now - Duration::minutes(5)),
            // Fresh foreign login: alerted.
            device_json("new-phone", "203.0.113.9", now - Duration::hours(2)),
            // Stale login: outside the 24 h window.
            device_json("old-laptop", "10.0.0.3", now - Duration::hours(30)),
        ])))
        .mount(&server)
        .await;

    let (_store, registry) = registry(&server);
    let alerts = registry.recent_alerts().await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].device_id, "new-phone");
    assert_eq!(alerts[0].ip_address, "203.0.113.9");
    assert_eq!(alerts[0].when, "2 hours ago");
}

#[tokio::test]
async fn registry_generates_a_device_id_for_a_fresh_install() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    let gateway = Arc::new(RequestGateway::new(&mock_config(&server), store.clone()));
    let registry = DeviceTrustRegistry::new(gateway);

    let id = registry.device_id().unwrap();
    assert_eq!(store.device_id().unwrap().as_deref(), Some(id.as_str()));
    assert_eq!(registry.device_id().unwrap(), id);
}
