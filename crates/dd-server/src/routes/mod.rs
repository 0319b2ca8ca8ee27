//! HTTP route assembly

pub mod auth;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/providers", get(auth::list_providers))
        .route("/auth/result", get(auth::auth_result))
        .route("/auth/{provider}/start", post(auth::start_flow))
        .route("/auth/{provider}/poll", get(auth::poll_flow))
        .route("/auth/{provider}/callback", get(auth::oauth_callback))
        .route("/auth/{provider}/cancel", post(auth::cancel_flow))
        .with_state(state)
}
