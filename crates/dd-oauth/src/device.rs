//! Device Authorization Grant engine (RFC 8628)
//!
//! `start()` requests a device code and returns immediately; a background
//! poller then drives the flow to a terminal status. Callers observe progress
//! through `poll()`, which never blocks on the background task.

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dd_types::{AppError, AppResult};

use crate::providers::ProviderRegistry;
use crate::session::{DeviceAuthInit, FlowSession, FlowSnapshot, FlowStatus, GrantKind};
use crate::store::FlowStore;

const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// RFC 8628 default; provider-dictated intervals below this are raised to it
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Added to the poll interval every time the provider answers `slow_down`
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Upper bound for a single token-endpoint request; the effective timeout is
/// the smaller of this and the time left until the flow deadline
const MAX_TICK_TIMEOUT: Duration = Duration::from_secs(30);

/// Token endpoint response while a device flow is in progress
///
/// GitHub answers 200 with an `error` field while authorization is pending;
/// RFC-conforming providers use 400 with the same body shape. Every field
/// defaults so both variants (and the final token payload) parse through the
/// one struct.
#[derive(Debug, Deserialize)]
struct TokenPollResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

struct PollerParams {
    provider: String,
    generation: u64,
    token_url: String,
    client_id: String,
    device_code: String,
    expires_at: chrono::DateTime<Utc>,
    interval: Duration,
}

/// Engine for the polling-based device grant
pub struct DeviceFlowEngine {
    store: Arc<FlowStore>,
    registry: Arc<ProviderRegistry>,
    client: Client,
    interval_floor: Duration,
}

impl DeviceFlowEngine {
    pub fn new(store: Arc<FlowStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            store,
            registry,
            client: Client::new(),
            interval_floor: MIN_POLL_INTERVAL,
        }
    }

    /// Lower the poll-interval floor. Production keeps the RFC default; tests
    /// run sub-second flows against a mock server.
    pub fn with_interval_floor(mut self, floor: Duration) -> Self {
        self.interval_floor = floor;
        self
    }

    /// Start a device-grant flow for the provider.
    ///
    /// Requests a device code, installs a fresh pending session (replacing any
    /// prior one for the provider), spawns the poller against that specific
    /// session, and returns the verification details for the user. Failures
    /// before the session is installed are returned synchronously and leave no
    /// session or background task behind.
    pub async fn start(&self, provider: &str, client_id: &str) -> AppResult<DeviceAuthInit> {
        let adapter = self
            .registry
            .get(provider)
            .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;
        let device_url = adapter.device_authorization_url.as_deref().ok_or_else(|| {
            AppError::Config(format!(
                "Provider {} does not support the device grant",
                provider
            ))
        })?;
        if client_id.is_empty() {
            return Err(AppError::Config(format!(
                "No client ID configured for {}",
                provider
            )));
        }

        info!("Starting device authorization flow for {}", provider);

        let response = self
            .client
            .post(device_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("client_id", client_id), ("scope", adapter.scope.as_str())])
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Device code request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Transport(format!("Failed to read device code response: {}", e)))?;
        if !status.is_success() {
            return Err(AppError::Protocol {
                status: status.as_u16(),
                body,
            });
        }

        let init: DeviceAuthInit = serde_json::from_str(&body).map_err(|_| AppError::Protocol {
            status: status.as_u16(),
            body,
        })?;

        debug!(
            "Device code received for {}: user_code={}, expires_in={}s, interval={}s",
            provider, init.user_code, init.expires_in, init.interval
        );

        let mut session = FlowSession::pending(
            provider,
            GrantKind::DeviceCode,
            client_id,
            Duration::from_secs(init.expires_in),
        );
        session.device_code = Some(init.device_code.clone());
        session.user_code = Some(init.user_code.clone());
        session.verification_uri = Some(init.verification_uri.clone());
        session.poll_interval = Duration::from_secs(init.interval).max(self.interval_floor);

        let expires_at = session.expires_at;
        let interval = session.poll_interval;
        let (generation, cancel) = self.store.install(session);

        let params = PollerParams {
            provider: provider.to_string(),
            generation,
            token_url: adapter.token_url.clone(),
            client_id: client_id.to_string(),
            device_code: init.device_code.clone(),
            expires_at,
            interval,
        };

        let store = Arc::clone(&self.store);
        let client = self.client.clone();
        tokio::spawn(async move {
            run_poller(store, client, cancel, params).await;
        });

        Ok(init)
    }

    /// Non-blocking status read; `NoFlow` when nothing was started.
    pub fn poll(&self, provider: &str) -> FlowSnapshot {
        self.store.snapshot(provider)
    }
}

/// Poll the token endpoint until the flow reaches a terminal status.
///
/// Transient transport and parse failures are retried rather than ending the
/// flow; the user may still be mid-approval. Every committed write goes
/// through the generation check, so a poller whose session was replaced exits
/// without touching the new one.
async fn run_poller(
    store: Arc<FlowStore>,
    client: Client,
    cancel: CancellationToken,
    params: PollerParams,
) {
    let mut interval = params.interval;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Device poller for {} cancelled", params.provider);
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        if Utc::now() > params.expires_at {
            commit_terminal(
                &store,
                &params,
                FlowStatus::Expired,
                Some("Authorization timed out".to_string()),
            );
            return;
        }

        let remaining = (params.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(1));
        let response = client
            .post(&params.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(remaining.min(MAX_TICK_TIMEOUT))
            .form(&[
                ("client_id", params.client_id.as_str()),
                ("device_code", params.device_code.as_str()),
                ("grant_type", DEVICE_GRANT_TYPE),
            ])
            .send()
            .await;

        let body = match response {
            Ok(r) => match r.text().await {
                Ok(b) => b,
                Err(e) => {
                    warn!("Token poll for {} unreadable, will retry: {}", params.provider, e);
                    continue;
                }
            },
            Err(e) => {
                warn!("Token poll for {} failed, will retry: {}", params.provider, e);
                continue;
            }
        };

        let parsed: TokenPollResponse = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    "Unparseable token poll response for {}, will retry: {}",
                    params.provider, e
                );
                continue;
            }
        };

        match (parsed.error.as_deref(), parsed.access_token) {
            (None, Some(token)) => {
                let committed = store.commit_if_current(&params.provider, params.generation, |s| {
                    s.status = FlowStatus::Complete;
                    s.token = Some(token);
                    s.refresh_token = parsed.refresh_token;
                    clear_device_fields(s);
                });
                if committed {
                    info!("Device authorization for {} complete", params.provider);
                } else {
                    debug!("Device poller for {} is stale, discarding token", params.provider);
                }
                return;
            }
            (Some("authorization_pending"), _) => continue,
            (Some("slow_down"), _) => {
                interval += SLOW_DOWN_STEP;
                let committed = store.commit_if_current(&params.provider, params.generation, |s| {
                    s.poll_interval = interval;
                });
                if !committed {
                    return;
                }
                debug!(
                    "Provider asked {} poller to slow down; interval now {:?}",
                    params.provider, interval
                );
                continue;
            }
            (Some("expired_token"), _) => {
                commit_terminal(
                    &store,
                    &params,
                    FlowStatus::Expired,
                    Some("Authorization timed out".to_string()),
                );
                return;
            }
            (Some("access_denied"), _) => {
                commit_terminal(
                    &store,
                    &params,
                    FlowStatus::Denied,
                    Some("Authorization was denied".to_string()),
                );
                return;
            }
            (Some(code), _) => {
                let detail = format!(
                    "{}: {}",
                    code,
                    parsed.error_description.unwrap_or_default()
                );
                commit_terminal(&store, &params, FlowStatus::Error, Some(detail));
                return;
            }
            (None, None) => {
                warn!(
                    "Token poll for {} returned neither token nor error, will retry",
                    params.provider
                );
                continue;
            }
        }
    }
}

fn commit_terminal(
    store: &FlowStore,
    params: &PollerParams,
    status: FlowStatus,
    error: Option<String>,
) {
    let committed = store.commit_if_current(&params.provider, params.generation, |s| {
        s.status = status;
        s.error_message = error;
        clear_device_fields(s);
    });
    if committed {
        info!(
            "Device flow for {} finished with status {:?}",
            params.provider, status
        );
    } else {
        debug!("Device poller for {} is stale, dropping result", params.provider);
    }
}

// Device-code fields are only meaningful while pending.
fn clear_device_fields(session: &mut FlowSession) {
    session.device_code = None;
    session.user_code = None;
    session.verification_uri = None;
}
