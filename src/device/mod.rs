//! Device identity persistence and the account's trusted-device list.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::AuthError;
use crate::gateway::RequestGateway;
use crate::token::TokenStore;

/// How far back a login counts as a "new device" security alert.
fn alert_window() -> Duration {
    Duration::hours(24)
}

/// One entry in the server-tracked trusted-device list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedDevice {
    pub device_id: String,
    pub user_agent: String,
    pub ip_address: String,
    pub last_login: DateTime<Utc>,
    pub trusted: bool,
}

/// A recent login surfaced as a new-device notice.
#[derive(Debug, Clone)]
pub struct SecurityAlert {
    pub device_id: String,
    pub ip_address: String,
    pub last_login: DateTime<Utc>,
    /// Human-readable relative timestamp, e.g. "23 minutes ago".
    pub when: String,
}

/// Load the stable device id, generating and persisting one on first use.
///
/// An existing id is never regenerated; it only disappears when the store is
/// cleared in full after a fatal refresh failure or logout.
pub fn ensure_device_id(store: &dyn TokenStore) -> Result<String, AuthError> {
    if let Some(existing) = store.device_id()? {
        return Ok(existing);
    }
    let id = uuid::Uuid::new_v4().to_string();
    store.save_device_id(&id)?;
    tracing::debug!(device_id = %id, "generated device id");
    Ok(id)
}

/// Client-side device identity plus CRUD over the remote trusted-device
/// list, via the authorized gateway.
pub struct DeviceTrustRegistry {
    gateway: Arc<RequestGateway>,
}

impl DeviceTrustRegistry {
    pub fn new(gateway: Arc<RequestGateway>) -> Self {
        Self { gateway }
    }

    /// The caller's own stable device id (generated if absent).
    pub fn device_id(&self) -> Result<String, AuthError> {
        ensure_device_id(self.gateway.store().as_ref())
    }

    pub async fn list(&self) -> Result<Vec<TrustedDevice>, AuthError> {
        self.gateway.get_json("devices").await
    }

    /// Revoke one device. Refused for the caller's own current device; use
    /// logout for that.
    pub async fn revoke(&self, device_id: &str) -> Result<(), AuthError> {
        if device_id == self.device_id()? {
            return Err(AuthError::Unsupported(
                "cannot revoke the current device".to_string(),
            ));
        }
        self.gateway.delete(&format!("devices/{device_id}")).await
    }

    /// Revoke every device except the caller's own.
    pub async fn revoke_others(&self) -> Result<(), AuthError> {
        self.gateway.delete("devices").await
    }

    /// Devices that logged in within the last 24 hours, as new-device
    /// notices with IP and relative timestamp. The caller's own device is
    /// excluded; its most recent login is the caller's own.
    pub async fn recent_alerts(&self) -> Result<Vec<SecurityAlert>, AuthError> {
        let own = self.device_id()?;
        let now = Utc::now();
        let alerts = self
            .list()
            .await?
            .into_iter()
            .filter(|device| device.device_id != own && now - device.last_login <= alert_window())
            .map(|device| SecurityAlert {
                when: format_relative(device.last_login, now),
                device_id: device.device_id,
                ip_address: device.ip_address,
                last_login: device.last_login,
            })
            .collect();
        Ok(alerts)
    }
}

/// "just now", "n minutes ago", "n hours ago", "n days ago".
fn format_relative(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - then;
    if elapsed < Duration::minutes(1) {
        return "just now".to_string();
    }
    if elapsed < Duration::hours(1) {
        let minutes = elapsed.num_minutes();
        return format!("{minutes} minute{} ago", plural(minutes));
    }
    if elapsed < Duration::days(1) {
        let hours = elapsed.num_hours();
        return format!("{hours} hour{} ago", plural(hours));
    }
    let days = elapsed.num_days();
    format!("{days} day{} ago", plural(days))
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
