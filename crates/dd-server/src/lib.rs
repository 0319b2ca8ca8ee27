//! DevDock HTTP server
//!
//! Exposes the authorization flow coordinator over HTTP: start, poll,
//! callback, and cancel endpoints per provider.

pub mod routes;
pub mod state;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub use state::AppState;

/// Bind and serve the auth routes until the process exits.
pub async fn start_server(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = routes::router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;

    info!("DevDock listening on {}", addr);
    info!("Available endpoints:");
    info!("  GET    /auth/providers             - List providers and link state");
    info!("  POST   /auth/{{provider}}/start      - Begin an authorization flow");
    info!("  GET    /auth/{{provider}}/poll       - Poll flow status");
    info!("  GET    /auth/{{provider}}/callback   - OAuth redirect callback");
    info!("  POST   /auth/{{provider}}/cancel     - Cancel a pending flow");

    axum::serve(listener, app).await?;

    Ok(())
}
