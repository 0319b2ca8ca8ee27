//! Account authorization endpoints
//!
//! One set of routes per provider: `start` kicks off the grant the provider's
//! adapter selects, `poll` reports progress without blocking, `callback`
//! receives the browser redirect for code-grant providers, and `cancel`
//! abandons a pending flow. Everything that happens after a flow exists is
//! surfaced through `poll`; these handlers never wait on background work.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use dd_oauth::{FlowStatus, GrantKind};
use dd_types::{AppError, StoredCredentials};

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(err: AppError) -> Response {
    let status = match err {
        AppError::Config(_) | AppError::InvalidState(_) => StatusCode::BAD_REQUEST,
        AppError::Transport(_) | AppError::Protocol { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn unknown_provider(provider: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Unknown provider: {}", provider),
        }),
    )
        .into_response()
}

/// Provider listing entry
#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub grant: &'static str,
    pub connected: bool,
}

/// GET /auth/providers - list known providers and their link state
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Vec<ProviderInfo>> {
    let providers = state
        .registry
        .list()
        .into_iter()
        .map(|adapter| ProviderInfo {
            id: adapter.id.clone(),
            name: adapter.name.clone(),
            grant: match adapter.grant {
                GrantKind::DeviceCode => "device_code",
                GrantKind::AuthorizationCode => "authorization_code",
            },
            connected: state.credentials.get(&adapter.id).is_some(),
        })
        .collect();

    Json(providers)
}

/// POST /auth/{provider}/start - begin an authorization flow
///
/// Device-grant providers get the verification details back; code-grant
/// providers get the URL to send the browser to.
pub async fn start_flow(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Response {
    let Some(adapter) = state.registry.get(&provider) else {
        return unknown_provider(&provider);
    };
    let settings = state.config.provider(&provider);

    match adapter.grant {
        GrantKind::DeviceCode => {
            match state.device.start(&provider, &settings.client_id).await {
                Ok(init) => Json(init).into_response(),
                Err(e) => error_response(e),
            }
        }
        GrantKind::AuthorizationCode => {
            let redirect_uri = settings.redirect_uri.clone().unwrap_or_else(|| {
                format!("{}/auth/{}/callback", state.base_url, provider)
            });
            let client_secret = settings.client_secret.clone().unwrap_or_default();
            match state
                .callback
                .start(&provider, &settings.client_id, &client_secret, &redirect_uri)
            {
                Ok(start) => Json(start).into_response(),
                Err(e) => error_response(e),
            }
        }
    }
}

/// GET /auth/{provider}/poll - non-blocking status snapshot
///
/// The first time a completed flow is observed here, its token is handed to
/// the credential store; repeated polls after that return the identical
/// snapshot without rewriting anything.
pub async fn poll_flow(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Response {
    let snapshot = state.flows.snapshot(&provider);

    if snapshot.status == FlowStatus::Complete {
        if let Some(token) = &snapshot.token {
            let already_stored = state
                .credentials
                .get(&provider)
                .map(|c| c.access_token == *token)
                .unwrap_or(false);
            if !already_stored {
                let refresh_token = state
                    .flows
                    .current(&provider)
                    .and_then(|s| s.refresh_token);
                let result = state.credentials.store(StoredCredentials {
                    provider_id: provider.clone(),
                    access_token: token.clone(),
                    refresh_token,
                    acquired_at: Utc::now(),
                });
                match result {
                    Ok(()) => info!("Linked {} account", provider),
                    Err(e) => error!("Failed to persist credentials for {}: {}", provider, e),
                }
            }
        }
    }

    Json(snapshot).into_response()
}

/// Query parameters delivered by the provider's redirect
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// GET /auth/{provider}/callback - browser redirect from the provider
///
/// Finishes the code-grant flow on this request thread, then sends the
/// browser to the result page either way; the machine-readable outcome stays
/// available through `poll`.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    if let Some(provider_error) = &query.error {
        info!("Callback for {} carried error: {}", provider, provider_error);
    }

    let code = query.code.unwrap_or_default();
    let state_token = query.state.unwrap_or_default();

    match state
        .callback
        .handle_callback(&provider, &code, &state_token)
        .await
    {
        Ok(()) => {
            let snapshot = state.flows.snapshot(&provider);
            let outcome = if snapshot.status == FlowStatus::Complete {
                "connected"
            } else {
                "denied"
            };
            Redirect::to(&format!(
                "/auth/result?provider={}&outcome={}",
                urlencoding::encode(&provider),
                outcome
            ))
        }
        Err(e) => Redirect::to(&format!(
            "/auth/result?provider={}&outcome=error&detail={}",
            urlencoding::encode(&provider),
            urlencoding::encode(&e.to_string())
        )),
    }
}

/// POST /auth/{provider}/cancel - abandon a pending flow
pub async fn cancel_flow(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Json<serde_json::Value> {
    let cancelled = state.flows.cancel(&provider);
    Json(serde_json::json!({ "cancelled": cancelled }))
}

#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// GET /auth/result - human-readable landing page after a callback
pub async fn auth_result(Query(query): Query<ResultQuery>) -> Html<String> {
    let (title, message) = match query.outcome.as_str() {
        "connected" => (
            "Account connected".to_string(),
            format!(
                "Your {} account is now linked. You can close this window.",
                query.provider
            ),
        ),
        "denied" => (
            "Authorization denied".to_string(),
            format!(
                "Access to {} was not granted. You can close this window and try again.",
                query.provider
            ),
        ),
        _ => (
            "Authorization failed".to_string(),
            query
                .detail
                .unwrap_or_else(|| "Something went wrong during authorization.".to_string()),
        ),
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
               display: flex; justify-content: center; align-items: center;
               min-height: 100vh; margin: 0; background: #f7fafc; }}
        .card {{ background: white; padding: 2.5rem; border-radius: 0.75rem;
                box-shadow: 0 10px 30px rgba(0,0,0,0.1); max-width: 420px;
                text-align: center; }}
        h1 {{ color: #2d3748; font-size: 1.4rem; }}
        p {{ color: #4a5568; }}
    </style>
</head>
<body>
    <div class="card">
        <h1>{title}</h1>
        <p>{message}</p>
    </div>
</body>
</html>
"#
    ))
}
