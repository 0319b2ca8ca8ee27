//! Flow session data model shared by both grant engines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which OAuth 2.0 grant a session is driving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    /// Device Authorization Grant (RFC 8628), completed by a background poller
    DeviceCode,
    /// Authorization Code Grant, completed by a browser redirect callback
    AuthorizationCode,
}

/// Observable status of an authorization flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    /// Waiting for the user to approve access
    Pending,
    /// Token acquired
    Complete,
    /// The user or provider denied access
    Denied,
    /// The flow ran out its authorization window
    Expired,
    /// The provider reported an unrecoverable error
    Error,
    /// No flow exists for the provider (snapshot-only status)
    NoFlow,
}

impl FlowStatus {
    /// Terminal statuses admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowStatus::Complete | FlowStatus::Denied | FlowStatus::Expired | FlowStatus::Error
        )
    }
}

/// One in-flight (or finished) authorization, at most one per provider
///
/// Replaced wholesale each time a new flow starts for the provider. Every
/// mutation happens under the store's lock; the `generation` stamp is how a
/// background poller proves it still owns the slot it is writing to.
#[derive(Debug, Clone)]
pub struct FlowSession {
    pub provider: String,
    pub grant: GrantKind,
    pub client_id: String,
    /// Code grant only; confidential clients exchange with a secret
    pub client_secret: Option<String>,
    /// Code grant only
    pub redirect_uri: Option<String>,
    /// Device grant only, present while pending
    pub device_code: Option<String>,
    pub user_code: Option<String>,
    pub verification_uri: Option<String>,
    /// Code grant only; the anti-CSRF token echoed back on callback
    pub state_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Device grant only; grows when the provider answers `slow_down`
    pub poll_interval: Duration,
    pub status: FlowStatus,
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub error_message: Option<String>,
    /// Store-assigned identity, set on install
    pub generation: u64,
}

impl FlowSession {
    /// A fresh pending session; grant-specific fields are filled by the engine.
    pub fn pending(provider: &str, grant: GrantKind, client_id: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            provider: provider.to_string(),
            grant,
            client_id: client_id.to_string(),
            client_secret: None,
            redirect_uri: None,
            device_code: None,
            user_code: None,
            verification_uri: None,
            state_token: None,
            created_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
            poll_interval: Duration::from_secs(5),
            status: FlowStatus::Pending,
            token: None,
            refresh_token: None,
            error_message: None,
            generation: 0,
        }
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            status: self.status,
            token: self.token.clone(),
            error: self.error_message.clone(),
        }
    }
}

/// Non-blocking read model returned by `poll()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowSnapshot {
    pub status: FlowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlowSnapshot {
    pub fn no_flow() -> Self {
        Self {
            status: FlowStatus::NoFlow,
            token: None,
            error: None,
        }
    }
}

/// Device-authorization response handed back to the caller of `start()`
///
/// Field names follow RFC 8628 so the struct deserializes straight from the
/// provider response and serializes unchanged onto the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthInit {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default = "default_device_interval")]
    pub interval: u64,
}

fn default_device_interval() -> u64 {
    5
}

/// Result of starting a code-grant flow: the URL to send the browser to
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeStart {
    pub authorize_url: String,
}
