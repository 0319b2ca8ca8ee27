//! OAuth 2.0 authorization flow coordination for DevDock
//!
//! Links the local daemon to third-party accounts without blocking the
//! request that starts the authorization. Two engines share one contract
//! (start / poll) and one session store:
//!
//! - [`DeviceFlowEngine`] drives the Device Authorization Grant (RFC 8628):
//!   a background poller asks the token endpoint whether the user approved
//!   yet, honoring provider-dictated backoff, until it gets a token, a
//!   denial, or the flow expires.
//! - [`CallbackFlowEngine`] drives the Authorization Code Grant: it hands out
//!   a CSRF-protected browser URL, then finishes synchronously when the
//!   provider redirects back with a code.
//!
//! [`FlowStore`] holds at most one session per provider; starting a new flow
//! supersedes the old one, whose poller detects it is stale and stops.

pub mod callback;
pub mod csrf;
pub mod device;
pub mod providers;
pub mod session;
pub mod store;

pub use callback::CallbackFlowEngine;
pub use csrf::generate_state;
pub use device::DeviceFlowEngine;
pub use providers::{ProviderAdapter, ProviderRegistry};
pub use session::{
    AuthorizeStart, DeviceAuthInit, FlowSession, FlowSnapshot, FlowStatus, GrantKind,
};
pub use store::FlowStore;
