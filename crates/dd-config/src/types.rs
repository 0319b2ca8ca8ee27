//! Configuration schema

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level application configuration, loaded from `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// OAuth client registrations keyed by provider ID
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
}

/// HTTP server binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7878
}

/// Per-provider OAuth client registration
///
/// The secret is only required by providers using the authorization code
/// grant; device-grant providers authenticate with the client ID alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: Option<String>,

    /// Overrides the callback URL derived from the server binding
    #[serde(default)]
    pub redirect_uri: Option<String>,
}
