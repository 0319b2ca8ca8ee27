//! Authorization Code Grant engine with a local redirect callback
//!
//! `start()` installs a pending session holding a random anti-CSRF state
//! token and hands back the browser authorization URL. The waiting happens in
//! the browser round-trip; when the provider redirects back,
//! `handle_callback()` validates the echoed state and performs one synchronous
//! code-for-token exchange on the request thread. There is no background task
//! for this engine.

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use dd_types::{AppError, AppResult};

use crate::csrf::generate_state;
use crate::providers::ProviderRegistry;
use crate::session::{AuthorizeStart, FlowSession, FlowSnapshot, FlowStatus, GrantKind};
use crate::store::FlowStore;

/// How long a started code-grant flow waits for its callback
const CALLBACK_WINDOW: Duration = Duration::from_secs(600);

/// Token endpoint response for the code exchange
///
/// Slack answers `{"ok":false,"error":...}` instead of an RFC 6749 error
/// object; defaulting every field lets both shapes parse through one struct.
#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Engine for the callback-based authorization code grant
pub struct CallbackFlowEngine {
    store: Arc<FlowStore>,
    registry: Arc<ProviderRegistry>,
    client: Client,
}

impl CallbackFlowEngine {
    pub fn new(store: Arc<FlowStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            store,
            registry,
            client: Client::new(),
        }
    }

    /// Start a code-grant flow and return the browser authorization URL.
    ///
    /// Installs a pending session carrying the generated state token,
    /// replacing any prior session for the provider. Missing credentials fail
    /// before anything is installed.
    pub fn start(
        &self,
        provider: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> AppResult<AuthorizeStart> {
        let adapter = self
            .registry
            .get(provider)
            .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;
        let authorize_url = adapter.authorize_url.as_deref().ok_or_else(|| {
            AppError::Config(format!(
                "Provider {} does not support the authorization code grant",
                provider
            ))
        })?;
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(AppError::Config(format!(
                "No client credentials configured for {}",
                provider
            )));
        }

        info!("Starting authorization code flow for {}", provider);

        let state = generate_state();

        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&state={}&scope={}",
            authorize_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&state),
            urlencoding::encode(&adapter.scope),
        );
        for (key, value) in &adapter.extra_auth_params {
            url.push_str(&format!(
                "&{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            ));
        }

        let mut session = FlowSession::pending(
            provider,
            GrantKind::AuthorizationCode,
            client_id,
            CALLBACK_WINDOW,
        );
        session.client_secret = Some(client_secret.to_string());
        session.redirect_uri = Some(redirect_uri.to_string());
        session.state_token = Some(state);
        self.store.install(session);

        Ok(AuthorizeStart { authorize_url: url })
    }

    /// Accept the provider's redirect and finish the flow.
    ///
    /// The echoed `state` must equal the session's token; that comparison is
    /// the only authentication the callback gets, so a mismatch (or a missing
    /// session) rejects the request and leaves the session untouched. An empty
    /// `code` is a provider-side denial. Otherwise the code is exchanged for a
    /// token right here, on the thread that received the redirect.
    pub async fn handle_callback(&self, provider: &str, code: &str, state: &str) -> AppResult<()> {
        let session = self.store.current(provider).ok_or_else(|| {
            AppError::InvalidState(format!("No authorization in progress for {}", provider))
        })?;
        if session.state_token.as_deref() != Some(state) {
            warn!("Rejected callback for {}: state mismatch", provider);
            return Err(AppError::InvalidState(
                "State token does not match the pending authorization".to_string(),
            ));
        }

        let generation = session.generation;

        if Utc::now() > session.expires_at {
            self.store.commit_if_current(provider, generation, |s| {
                s.status = FlowStatus::Expired;
                s.error_message = Some("Authorization timed out".to_string());
            });
            return Err(AppError::InvalidState(
                "Authorization window has expired".to_string(),
            ));
        }

        if code.is_empty() {
            debug!("Callback for {} carried no code, treating as denial", provider);
            self.store.commit_if_current(provider, generation, |s| {
                s.status = FlowStatus::Denied;
                s.error_message = Some("Authorization was denied".to_string());
            });
            return Ok(());
        }

        let adapter = self
            .registry
            .get(provider)
            .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;
        let client_secret = session.client_secret.clone().unwrap_or_default();
        let redirect_uri = session.redirect_uri.clone().unwrap_or_default();

        let response = self
            .client
            .post(&adapter.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", session.client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                let detail = format!("Token exchange failed: {}", e);
                self.store.commit_if_current(provider, generation, |s| {
                    s.status = FlowStatus::Error;
                    s.error_message = Some(detail.clone());
                });
                AppError::Transport(detail)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            let detail = format!("Token exchange response unreadable: {}", e);
            self.store.commit_if_current(provider, generation, |s| {
                s.status = FlowStatus::Error;
                s.error_message = Some(detail.clone());
            });
            AppError::Transport(detail)
        })?;

        let parsed: TokenResponse = serde_json::from_str(&body).unwrap_or_default();
        match parsed.access_token {
            Some(token) => {
                self.store.commit_if_current(provider, generation, |s| {
                    s.status = FlowStatus::Complete;
                    s.token = Some(token);
                    s.refresh_token = parsed.refresh_token;
                });
                info!("Authorization code flow for {} complete", provider);
                Ok(())
            }
            None => {
                let detail = match parsed.error {
                    Some(code) => format!(
                        "{}: {}",
                        code,
                        parsed.error_description.unwrap_or_default()
                    ),
                    None => format!("HTTP {}", status.as_u16()),
                };
                warn!("Token exchange for {} failed: {}", provider, detail);
                self.store.commit_if_current(provider, generation, |s| {
                    s.status = FlowStatus::Error;
                    s.error_message = Some(detail);
                });
                Err(AppError::Protocol {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// Non-blocking status read; `NoFlow` when nothing was started.
    pub fn poll(&self, provider: &str) -> FlowSnapshot {
        self.store.snapshot(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderAdapter;

    fn engine_with_adapter() -> CallbackFlowEngine {
        let registry = ProviderRegistry::new();
        registry.register(
            ProviderAdapter::code(
                "linear",
                "Linear",
                "https://example.com/oauth/authorize",
                "https://example.com/oauth/token",
                "read,write",
            )
            .with_auth_param("prompt", "consent"),
        );
        CallbackFlowEngine::new(Arc::new(FlowStore::new()), Arc::new(registry))
    }

    #[test]
    fn test_start_builds_authorize_url() {
        let engine = engine_with_adapter();
        let start = engine
            .start("linear", "cid", "secret", "http://localhost:7878/auth/linear/callback")
            .unwrap();

        assert!(start.authorize_url.starts_with("https://example.com/oauth/authorize?"));
        assert!(start.authorize_url.contains("client_id=cid"));
        assert!(start.authorize_url.contains("response_type=code"));
        assert!(start.authorize_url.contains("scope=read%2Cwrite"));
        assert!(start.authorize_url.contains("prompt=consent"));
        assert!(start.authorize_url.contains("state="));

        let session = engine.store.current("linear").unwrap();
        let state = session.state_token.unwrap();
        assert!(start.authorize_url.contains(&format!("state={}", state)));
    }

    #[test]
    fn test_start_requires_credentials() {
        let engine = engine_with_adapter();
        let result = engine.start("linear", "", "secret", "http://localhost/cb");
        assert!(matches!(result, Err(AppError::Config(_))));
        assert_eq!(engine.poll("linear").status, FlowStatus::NoFlow);

        let result = engine.start("linear", "cid", "", "http://localhost/cb");
        assert!(matches!(result, Err(AppError::Config(_))));
        assert_eq!(engine.poll("linear").status, FlowStatus::NoFlow);
    }

    #[tokio::test]
    async fn test_callback_without_session_is_rejected() {
        let engine = engine_with_adapter();
        let result = engine.handle_callback("linear", "c1", "S1").await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_empty_code_is_denial() {
        let engine = engine_with_adapter();
        engine
            .start("linear", "cid", "secret", "http://localhost/cb")
            .unwrap();
        let state = engine
            .store
            .current("linear")
            .unwrap()
            .state_token
            .unwrap();

        engine.handle_callback("linear", "", &state).await.unwrap();

        let snapshot = engine.poll("linear");
        assert_eq!(snapshot.status, FlowStatus::Denied);
        assert_eq!(snapshot.token, None);
    }
}
