use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dd_config::{ConfigManager, CredentialStore};
use dd_oauth::ProviderRegistry;
use dd_server::AppState;

/// DevDock - link your local tools to GitHub, Sentry, Linear, and Slack
#[derive(Debug, Parser)]
#[command(name = "devdock", version)]
struct Cli {
    /// Path to the configuration file (defaults to the platform location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured bind port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devdock=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Starting DevDock...");
    let config_dir =
        dd_config::paths::config_dir().unwrap_or_else(|_| PathBuf::from("unknown"));
    info!("Configuration directory: {}", config_dir.display());

    let config = Arc::new(match cli.config {
        Some(path) => ConfigManager::load(path)?,
        None => ConfigManager::load_default()?,
    });
    let credentials = Arc::new(CredentialStore::open_default()?);
    let registry = Arc::new(ProviderRegistry::with_builtins());

    let server = config.get().server;
    let host = cli.host.unwrap_or(server.host);
    let port = cli.port.unwrap_or(server.port);
    let base_url = format!("http://{}:{}", host, port);

    let state = Arc::new(AppState::new(config, credentials, registry, base_url));

    dd_server::start_server(state, &host, port).await
}
