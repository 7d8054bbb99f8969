//! Process-local reconciliation guard.
//!
//! A session id is held by at most one reconciliation at a time. Holding is
//! expressed as a [`ReconcilePermit`]; dropping the permit releases the id on
//! every path, including early returns and panics.

use std::sync::Arc;

use dashmap::DashSet;

use crate::domain::SessionId;

/// Set of session ids currently under reconciliation.
#[derive(Debug, Default, Clone)]
pub struct ReconciliationGuard {
    held: Arc<DashSet<SessionId>>,
}

impl ReconciliationGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `session_id`, or `None` if another caller holds it.
    #[must_use]
    pub fn try_acquire(&self, session_id: SessionId) -> Option<ReconcilePermit> {
        self.held.insert(session_id).then(|| ReconcilePermit {
            held: Arc::clone(&self.held),
            session_id,
        })
    }

    #[must_use]
    pub fn is_held(&self, session_id: SessionId) -> bool {
        self.held.contains(&session_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// Exclusive claim on one session id.
#[derive(Debug)]
pub struct ReconcilePermit {
    held: Arc<DashSet<SessionId>>,
    session_id: SessionId,
}

impl ReconcilePermit {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}

impl Drop for ReconcilePermit {
    fn drop(&mut self) {
        self.held.remove(&self.session_id);
    }
}
