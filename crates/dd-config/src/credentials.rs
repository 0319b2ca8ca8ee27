//! File-backed store for credentials issued by completed flows
//!
//! The coordinator never persists anything itself; once a flow reports
//! completion, the caller hands the token here.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

use dd_types::{AppError, AppResult, StoredCredentials};

use crate::paths;

/// Provider-keyed credential storage, persisted as one JSON file
pub struct CredentialStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, StoredCredentials>>,
}

impl CredentialStore {
    /// Open the store at the given path, loading any existing entries.
    pub fn open(path: PathBuf) -> AppResult<Self> {
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            HashMap::new()
        };

        let store = Self {
            path,
            entries: RwLock::new(entries),
        };
        let count = store.entries.read().len();
        if count > 0 {
            info!("Loaded credentials for {} provider(s)", count);
        }
        Ok(store)
    }

    /// Open at the default platform location (`~/.devdock/credentials.json`).
    pub fn open_default() -> AppResult<Self> {
        Self::open(paths::credentials_file()?)
    }

    /// Insert or replace the provider's credentials and write through to disk.
    pub fn store(&self, credentials: StoredCredentials) -> AppResult<()> {
        let provider_id = credentials.provider_id.clone();
        let mut entries = self.entries.write();
        entries.insert(provider_id.clone(), credentials);
        self.persist(&entries)?;

        debug!("Stored credentials for {}", provider_id);
        Ok(())
    }

    pub fn get(&self, provider_id: &str) -> Option<StoredCredentials> {
        self.entries.read().get(provider_id).cloned()
    }

    /// Remove the provider's credentials; returns whether anything was stored.
    pub fn remove(&self, provider_id: &str) -> AppResult<bool> {
        let mut entries = self.entries.write();
        let removed = entries.remove(provider_id).is_some();
        if removed {
            self.persist(&entries)?;
            debug!("Removed credentials for {}", provider_id);
        }
        Ok(removed)
    }

    pub fn list_providers(&self) -> Vec<String> {
        let mut providers: Vec<_> = self.entries.read().keys().cloned().collect();
        providers.sort();
        providers
    }

    fn persist(&self, entries: &HashMap<String, StoredCredentials>) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, contents).map_err(|e| {
            AppError::Storage(format!("Failed to write {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}
