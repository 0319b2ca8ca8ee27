//! Single-slot flow storage, one session per provider
//!
//! The store is the only shared mutable state in the coordinator. `poll()`
//! readers and the single writer for each flow (device poller or callback
//! handler) synchronize on one `RwLock`; every mutation is applied as one
//! replace-the-fields-then-release step, so readers never observe a partial
//! update.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::session::{FlowSession, FlowSnapshot, FlowStatus};

struct Slot {
    session: FlowSession,
    cancel: CancellationToken,
}

/// Map from provider ID to its current flow session
///
/// Constructed once and injected wherever flows are started or observed.
/// Each installed session gets a generation stamp from a process-wide counter;
/// a background poller may only commit writes while its generation matches the
/// slot's, which turns the superseded-poller race into a no-op.
#[derive(Default)]
pub struct FlowStore {
    slots: RwLock<HashMap<String, Slot>>,
    next_generation: AtomicU64,
}

impl FlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new session for its provider, replacing any prior one.
    ///
    /// The previous slot's cancellation token is fired so an orphaned poller
    /// wakes from its sleep and exits instead of running to expiry. Returns
    /// the assigned generation and the token the new flow's background task
    /// should observe.
    pub fn install(&self, mut session: FlowSession) -> (u64, CancellationToken) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        session.generation = generation;

        let provider = session.provider.clone();
        let cancel = CancellationToken::new();
        let slot = Slot {
            session,
            cancel: cancel.clone(),
        };

        let previous = self.slots.write().insert(provider.clone(), slot);
        if let Some(old) = previous {
            debug!(
                "Replacing flow for {} (generation {} supersedes {})",
                provider, generation, old.session.generation
            );
            old.cancel.cancel();
        }

        (generation, cancel)
    }

    /// Non-blocking status read; `NoFlow` when the provider has no session.
    pub fn snapshot(&self, provider: &str) -> FlowSnapshot {
        self.slots
            .read()
            .get(provider)
            .map(|slot| slot.session.snapshot())
            .unwrap_or_else(FlowSnapshot::no_flow)
    }

    /// Clone out the provider's current session, if any.
    pub fn current(&self, provider: &str) -> Option<FlowSession> {
        self.slots.read().get(provider).map(|s| s.session.clone())
    }

    /// Apply a mutation to the provider's session, but only while the caller's
    /// generation still owns the slot and the session is not yet terminal.
    ///
    /// Returns false without touching anything when the slot is missing, has
    /// been replaced by a newer flow, or already reached a terminal status;
    /// the caller should stop its loop in every one of those cases.
    pub fn commit_if_current<F>(&self, provider: &str, generation: u64, mutate: F) -> bool
    where
        F: FnOnce(&mut FlowSession),
    {
        let mut slots = self.slots.write();
        let Some(slot) = slots.get_mut(provider) else {
            return false;
        };
        if slot.session.generation != generation || slot.session.status.is_terminal() {
            return false;
        }
        mutate(&mut slot.session);
        true
    }

    /// Whether the given generation still owns the provider's slot.
    pub fn is_current(&self, provider: &str, generation: u64) -> bool {
        self.slots
            .read()
            .get(provider)
            .map(|slot| slot.session.generation == generation)
            .unwrap_or(false)
    }

    /// Cancel the provider's pending flow, if there is one.
    ///
    /// Fires the slot's cancellation token so a device poller exits at its
    /// next suspension point, and marks the session failed. Sessions that
    /// already reached a terminal status are left untouched. Returns whether a
    /// pending flow was cancelled.
    pub fn cancel(&self, provider: &str) -> bool {
        let mut slots = self.slots.write();
        let Some(slot) = slots.get_mut(provider) else {
            return false;
        };

        slot.cancel.cancel();
        if slot.session.status.is_terminal() {
            return false;
        }

        slot.session.status = FlowStatus::Error;
        slot.session.error_message = Some("authorization cancelled".to_string());
        debug!("Cancelled pending flow for {}", provider);
        true
    }
}
