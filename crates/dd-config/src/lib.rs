//! Configuration management module
//!
//! Loads and serves the application configuration (server binding, per
//! provider OAuth client registrations) and persists the credentials issued
//! by completed authorization flows.

use parking_lot::RwLock;
use std::path::PathBuf;
use tracing::{debug, info};

use dd_types::{AppError, AppResult};

mod credentials;
pub mod paths;
pub mod types;

pub use credentials::CredentialStore;
pub use types::{AppConfig, ProviderSettings, ServerConfig};

/// Thread-safe configuration manager
///
/// The in-memory copy behind the lock is the source of truth after load;
/// `save` writes it back to disk.
pub struct ConfigManager {
    config: RwLock<AppConfig>,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config: AppConfig, config_path: PathBuf) -> Self {
        Self {
            config: RwLock::new(config),
            config_path,
        }
    }

    /// Load configuration from the given path, falling back to defaults when
    /// the file does not exist yet.
    pub fn load(config_path: PathBuf) -> AppResult<Self> {
        let config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            toml::from_str(&contents).map_err(|e| {
                AppError::Config(format!(
                    "Failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            debug!(
                "No configuration at {}, using defaults",
                config_path.display()
            );
            AppConfig::default()
        };

        info!("Configuration loaded from {}", config_path.display());
        Ok(Self::new(config, config_path))
    }

    /// Load from the default platform location (`~/.devdock/config.toml`).
    pub fn load_default() -> AppResult<Self> {
        Self::load(paths::config_file()?)
    }

    pub fn get(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Client registration for a provider; empty settings when unconfigured,
    /// so missing credentials surface as a configuration error at flow start
    /// rather than a lookup failure here.
    pub fn provider(&self, provider_id: &str) -> ProviderSettings {
        self.config
            .read()
            .providers
            .get(provider_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn save(&self) -> AppResult<()> {
        let contents = toml::to_string_pretty(&*self.config.read())
            .map_err(|e| AppError::Config(format!("Failed to serialize configuration: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config_path, contents)?;

        debug!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load(dir.path().join("config.toml")).unwrap();

        let config = manager.get();
        assert_eq!(config.server.port, 7878);
        assert!(manager.provider("github").client_id.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.providers.insert(
            "linear".to_string(),
            ProviderSettings {
                client_id: "lin_cid".to_string(),
                client_secret: Some("lin_secret".to_string()),
                redirect_uri: None,
            },
        );
        let manager = ConfigManager::new(config, path.clone());
        manager.save().unwrap();

        let reloaded = ConfigManager::load(path).unwrap();
        let settings = reloaded.provider("linear");
        assert_eq!(settings.client_id, "lin_cid");
        assert_eq!(settings.client_secret.as_deref(), Some("lin_secret"));
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "providers = 3").unwrap();

        let result = ConfigManager::load(path);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
