//! Shared state for the HTTP layer

use std::sync::Arc;

use dd_config::{ConfigManager, CredentialStore};
use dd_oauth::{CallbackFlowEngine, DeviceFlowEngine, FlowStore, ProviderRegistry};

/// Everything the auth routes need, constructed once at startup and injected
/// into the router. Both engines share the one flow store, so `poll` answers
/// uniformly regardless of which grant started the flow.
pub struct AppState {
    pub flows: Arc<FlowStore>,
    pub device: Arc<DeviceFlowEngine>,
    pub callback: Arc<CallbackFlowEngine>,
    pub registry: Arc<ProviderRegistry>,
    pub config: Arc<ConfigManager>,
    pub credentials: Arc<CredentialStore>,
    /// Base URL clients reach this server on; default redirect URIs are
    /// derived from it
    pub base_url: String,
}

impl AppState {
    pub fn new(
        config: Arc<ConfigManager>,
        credentials: Arc<CredentialStore>,
        registry: Arc<ProviderRegistry>,
        base_url: String,
    ) -> Self {
        let flows = Arc::new(FlowStore::new());
        let device = Arc::new(DeviceFlowEngine::new(
            Arc::clone(&flows),
            Arc::clone(&registry),
        ));
        let callback = Arc::new(CallbackFlowEngine::new(
            Arc::clone(&flows),
            Arc::clone(&registry),
        ));

        Self {
            flows,
            device,
            callback,
            registry,
            config,
            credentials,
            base_url,
        }
    }
}
