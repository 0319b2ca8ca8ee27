//! OS-specific path resolution for configuration files

use dd_types::{AppError, AppResult};
use std::path::PathBuf;

/// Get the configuration directory
///
/// Priority:
/// 1. Runtime override via `DEVDOCK_ENV` environment variable: `~/.devdock-{env}/`
/// 2. Development mode (debug builds): `~/.devdock-dev/`
/// 3. Production mode (release builds): `~/.devdock/`
pub fn config_dir() -> AppResult<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AppError::Config("Could not determine home directory".to_string()))?;

    // Runtime override via environment variable (for testing)
    if let Ok(env_suffix) = std::env::var("DEVDOCK_ENV") {
        return Ok(home.join(format!(".devdock-{}", env_suffix)));
    }

    #[cfg(debug_assertions)]
    let dir = home.join(".devdock-dev");

    #[cfg(not(debug_assertions))]
    let dir = home.join(".devdock");

    Ok(dir)
}

/// Get the configuration file path
pub fn config_file() -> AppResult<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the stored-credentials file path
pub fn credentials_file() -> AppResult<PathBuf> {
    Ok(config_dir()?.join("credentials.json"))
}
