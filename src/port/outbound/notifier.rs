//! Notifier port for UI-facing event notifications.
//!
//! This module defines the trait for pushing engine events (balance
//! refreshes, session notices, forced logout) to whatever renders them.

use rust_decimal::Decimal;

use crate::domain::{AccountId, DisplayBalance, GameSession, ProviderId, SessionId};

/// Message shown when a session could not be reconciled.
pub const FORCE_END_NOTICE: &str = "network error, please restart";

/// Events that can trigger notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The displayed balance of an account changed.
    BalanceUpdated(DisplayBalance),
    /// A session was reconciled and closed.
    SessionEnded(SessionEvent),
    /// A session was closed without reconciliation. User-visible.
    SessionForceEnded(NoticeEvent),
    /// More than one live session exists for an account.
    SessionConflict {
        /// Account with competing sessions.
        account_id: AccountId,
        /// The live sessions, newest first.
        sessions: Vec<SessionId>,
    },
    /// The account logged in elsewhere; the local client must log out.
    ForcedLogout {
        /// Account being logged out.
        account_id: AccountId,
    },
    /// Every client must close this game window.
    GameWindowClosed {
        /// Session whose window closes.
        session_id: SessionId,
    },
    /// A provider history pull finished.
    SyncCompleted(SyncEvent),
}

/// Session reconciliation event.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub account_id: AccountId,
    pub provider_id: ProviderId,
    /// Balance written back to the ledger.
    pub balance: Decimal,
}

/// User-visible failure notice.
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeEvent {
    pub session_id: SessionId,
    pub account_id: AccountId,
    /// Text for the player.
    pub message: String,
    /// Internal cause, for logs only.
    pub cause: String,
    /// Whether restarting the game may help.
    pub retryable: bool,
}

impl NoticeEvent {
    /// Standard notice for a force-ended session.
    #[must_use]
    pub fn force_ended(session: &GameSession, cause: impl Into<String>, retryable: bool) -> Self {
        Self {
            session_id: session.id,
            account_id: session.account_id.clone(),
            message: FORCE_END_NOTICE.to_string(),
            cause: cause.into(),
            retryable,
        }
    }
}

/// Result of one provider history pull.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEvent {
    pub provider_id: ProviderId,
    pub fetched: usize,
    pub inserted: usize,
}

/// Trait for notification handlers.
///
/// Notifications are fire-and-forget: implementations must be thread-safe
/// and should return quickly, spawning tasks for slow work.
pub trait Notifier: Send + Sync {
    /// Handle an event.
    fn notify(&self, event: Event);
}

/// Registry of notifiers (composite pattern).
///
/// Broadcasts events to all registered notifiers.
pub struct NotifierRegistry {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { notifiers: vec![] }
    }

    /// Register a notifier.
    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Notify all registered notifiers.
    pub fn notify_all(&self, event: Event) {
        for notifier in &self.notifiers {
            notifier.notify(event.clone());
        }
    }

    /// Number of registered notifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// Check if registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A no-op notifier for when notifications are disabled.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting(Arc<AtomicUsize>);

    impl Notifier for Counting {
        fn notify(&self, _event: Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn registry_fans_out_to_every_notifier() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut registry = NotifierRegistry::new();
        registry.register(Box::new(Counting(Arc::clone(&count))));
        registry.register(Box::new(Counting(Arc::clone(&count))));
        registry.register(Box::new(NullNotifier));

        registry.notify_all(Event::ForcedLogout {
            account_id: AccountId::new("u"),
        });

        assert_eq!(registry.len(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_registry() {
        let registry = NotifierRegistry::default();
        assert!(registry.is_empty());
        registry.notify_all(Event::GameWindowClosed {
            session_id: SessionId::new(1),
        });
    }
}
