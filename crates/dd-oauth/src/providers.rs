//! Provider adapters: the per-vendor data both engines are parameterized by
//!
//! An adapter carries endpoint URLs, the scope string, and any vendor quirks
//! in authorize-URL parameter naming. This is configuration, not logic; the
//! engines stay identical across vendors.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::session::GrantKind;

/// Static description of one OAuth provider
#[derive(Debug, Clone)]
pub struct ProviderAdapter {
    /// Stable identifier used in routes and storage (e.g. "github")
    pub id: String,
    /// Human-readable name for logs and the result page
    pub name: String,
    pub grant: GrantKind,
    /// Device grant only: the device-authorization endpoint
    pub device_authorization_url: Option<String>,
    /// Code grant only: the browser-facing authorize endpoint
    pub authorize_url: Option<String>,
    pub token_url: String,
    /// Scope string in the provider's expected separator convention
    pub scope: String,
    /// Extra authorize-URL query parameters (vendor quirks, e.g. Slack's
    /// `user_scope`)
    pub extra_auth_params: Vec<(String, String)>,
}

impl ProviderAdapter {
    pub fn device(id: &str, name: &str, device_url: &str, token_url: &str, scope: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            grant: GrantKind::DeviceCode,
            device_authorization_url: Some(device_url.to_string()),
            authorize_url: None,
            token_url: token_url.to_string(),
            scope: scope.to_string(),
            extra_auth_params: Vec::new(),
        }
    }

    pub fn code(id: &str, name: &str, authorize_url: &str, token_url: &str, scope: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            grant: GrantKind::AuthorizationCode,
            device_authorization_url: None,
            authorize_url: Some(authorize_url.to_string()),
            token_url: token_url.to_string(),
            scope: scope.to_string(),
            extra_auth_params: Vec::new(),
        }
    }

    pub fn with_auth_param(mut self, key: &str, value: &str) -> Self {
        self.extra_auth_params
            .push((key.to_string(), value.to_string()));
        self
    }
}

/// Registry resolving provider IDs to adapters
///
/// Both engines and the HTTP layer consult the same registry instance; tests
/// register adapters pointing at mock servers.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: RwLock<HashMap<String, Arc<ProviderAdapter>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the providers DevDock ships with.
    pub fn with_builtins() -> Self {
        let registry = Self::new();

        registry.register(ProviderAdapter::device(
            "github",
            "GitHub",
            "https://github.com/login/device/code",
            "https://github.com/login/oauth/access_token",
            "repo read:org",
        ));

        registry.register(ProviderAdapter::device(
            "sentry",
            "Sentry",
            "https://sentry.io/oauth/device/",
            "https://sentry.io/oauth/token/",
            "project:read event:read org:read",
        ));

        registry.register(
            ProviderAdapter::code(
                "linear",
                "Linear",
                "https://linear.app/oauth/authorize",
                "https://api.linear.app/oauth/token",
                "read,write",
            )
            .with_auth_param("prompt", "consent"),
        );

        // Slack v2 splits scopes: `scope` is granted to the bot identity,
        // `user_scope` to the authorizing user.
        registry.register(
            ProviderAdapter::code(
                "slack",
                "Slack",
                "https://slack.com/oauth/v2/authorize",
                "https://slack.com/api/oauth.v2.access",
                "channels:read,chat:write",
            )
            .with_auth_param("user_scope", "search:read,channels:history"),
        );

        registry
    }

    pub fn register(&self, adapter: ProviderAdapter) {
        self.adapters
            .write()
            .insert(adapter.id.clone(), Arc::new(adapter));
    }

    pub fn get(&self, id: &str) -> Option<Arc<ProviderAdapter>> {
        self.adapters.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<ProviderAdapter>> {
        let mut adapters: Vec<_> = self.adapters.read().values().cloned().collect();
        adapters.sort_by(|a, b| a.id.cmp(&b.id));
        adapters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = ProviderRegistry::with_builtins();

        let github = registry.get("github").expect("github registered");
        assert_eq!(github.grant, GrantKind::DeviceCode);
        assert!(github.device_authorization_url.is_some());
        assert!(github.authorize_url.is_none());

        let slack = registry.get("slack").expect("slack registered");
        assert_eq!(slack.grant, GrantKind::AuthorizationCode);
        assert!(slack
            .extra_auth_params
            .iter()
            .any(|(k, _)| k == "user_scope"));

        assert!(registry.get("jira").is_none());
    }

    #[test]
    fn test_list_is_sorted() {
        let registry = ProviderRegistry::with_builtins();
        let ids: Vec<_> = registry.list().iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids, vec!["github", "linear", "sentry", "slack"]);
    }
}
