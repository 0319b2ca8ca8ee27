//! Stored account credentials issued by a completed authorization flow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credentials for one linked provider account
///
/// Produced by the flow coordinator once a flow reports completion and handed
/// to the credential store for persistence. Tokens are opaque strings; DevDock
/// never inspects them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// Provider ID (e.g. "github", "sentry")
    pub provider_id: String,
    /// Access token
    pub access_token: String,
    /// Refresh token, if the provider issued one
    pub refresh_token: Option<String>,
    /// When these credentials were acquired
    pub acquired_at: DateTime<Utc>,
}
