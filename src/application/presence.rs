//! Single-active-client enforcement.
//!
//! Logging in elsewhere flips the account's online flag to false under the
//! current client. After a short debounce, if the flag is still false, the
//! local client is logged out. Flag flips that arrive while a check is
//! pending are coalesced into it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::session::SessionRegistry;
use crate::domain::{Account, AccountId};
use crate::error::Result;
use crate::port::{Event, NotifierRegistry, Store};

/// Default wait before acting on an offline flip.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

pub struct PresenceGuard {
    store: Arc<dyn Store>,
    registry: Arc<SessionRegistry>,
    notifiers: Arc<NotifierRegistry>,
    debounce: Duration,
    pending: DashSet<AccountId>,
}

impl PresenceGuard {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<SessionRegistry>,
        notifiers: Arc<NotifierRegistry>,
    ) -> Self {
        Self {
            store,
            registry,
            notifiers,
            debounce: DEFAULT_DEBOUNCE,
            pending: DashSet::new(),
        }
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Feed one account update through the guard.
    ///
    /// Returns the handle of a newly scheduled check, or `None` when the
    /// update is not an offline flip or a check is already pending.
    pub fn observe(self: &Arc<Self>, old: Option<&Account>, new: &Account) -> Option<JoinHandle<()>> {
        if !Account::went_offline(old, new) {
            return None;
        }
        if !self.pending.insert(new.id.clone()) {
            debug!(account = %new.id, "Offline flip coalesced into pending check");
            return None;
        }

        let guard = Arc::clone(self);
        let account_id = new.id.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(guard.debounce).await;
            guard.pending.remove(&account_id);
            if let Err(e) = guard.check(&account_id).await {
                warn!(account = %account_id, error = %e, "Presence check failed");
            }
        }))
    }

    async fn check(&self, account_id: &AccountId) -> Result<()> {
        let still_offline = self
            .store
            .account(account_id)
            .await?
            .is_some_and(|account| !account.online);
        if still_offline {
            self.enforce(account_id).await?;
        } else {
            debug!(account = %account_id, "Account back online, no logout");
        }
        Ok(())
    }

    /// Log the local client out. Live game sessions keep running.
    pub async fn enforce(&self, account_id: &AccountId) -> Result<()> {
        let live = self.registry.list_live_for_account(account_id).await?;
        if !live.is_empty() {
            info!(
                account = %account_id,
                sessions = live.len(),
                "Forced logout leaves live game sessions running"
            );
        }
        info!(account = %account_id, "Forcing logout");
        self.notifiers.notify_all(Event::ForcedLogout {
            account_id: account_id.clone(),
        });
        Ok(())
    }

    #[must_use]
    pub fn is_pending(&self, account_id: &AccountId) -> bool {
        self.pending.contains(account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::outbound::MemoryStore;
    use crate::domain::{ProviderId, SessionStatus};
    use crate::port::AccountStore;
    use crate::testkit::notifier::RecordingNotifier;
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<MemoryStore>,
        registry: Arc<SessionRegistry>,
        guard: Arc<PresenceGuard>,
        events: RecordingNotifier,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store
            .put_account(&Account::new("u", "alice").online())
            .await
            .unwrap();
        let dyn_store: Arc<dyn Store> = store.clone();
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&dyn_store)));
        let events = RecordingNotifier::new();
        let guard = Arc::new(
            PresenceGuard::new(dyn_store, Arc::clone(&registry), events.registry())
                .with_debounce(Duration::from_millis(100)),
        );
        Fixture {
            store,
            registry,
            guard,
            events,
        }
    }

    fn logouts(events: &RecordingNotifier) -> usize {
        events.count(|e| matches!(e, Event::ForcedLogout { .. }))
    }

    #[tokio::test(start_paused = true)]
    async fn offline_flip_logs_out_after_debounce() {
        let f = fixture().await;
        let old = f.store.account(&AccountId::new("u")).await.unwrap().unwrap();
        let new = f.store.set_online(&AccountId::new("u"), false).await.unwrap();

        let handle = f.guard.observe(Some(&old), &new).expect("scheduled");
        assert!(f.guard.is_pending(&new.id));
        handle.await.unwrap();

        assert_eq!(logouts(&f.events), 1);
        assert!(!f.guard.is_pending(&new.id));
    }

    #[tokio::test(start_paused = true)]
    async fn coming_back_online_cancels_logout() {
        let f = fixture().await;
        let old = f.store.account(&AccountId::new("u")).await.unwrap().unwrap();
        let new = f.store.set_online(&AccountId::new("u"), false).await.unwrap();
        let handle = f.guard.observe(Some(&old), &new).unwrap();

        f.store.set_online(&AccountId::new("u"), true).await.unwrap();
        handle.await.unwrap();

        assert_eq!(logouts(&f.events), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_flips_are_coalesced() {
        let f = fixture().await;
        let old = f.store.account(&AccountId::new("u")).await.unwrap().unwrap();
        let new = f.store.set_online(&AccountId::new("u"), false).await.unwrap();

        let handle = f.guard.observe(Some(&old), &new).unwrap();
        assert!(f.guard.observe(Some(&old), &new).is_none());
        handle.await.unwrap();

        assert_eq!(logouts(&f.events), 1);
    }

    #[tokio::test]
    async fn non_offline_updates_are_ignored() {
        let f = fixture().await;
        let account = Account::new("u", "alice").online();
        assert!(f.guard.observe(None, &account).is_none());
        let offline = Account::new("u", "alice");
        assert!(f.guard.observe(None, &offline).is_none());
    }

    #[tokio::test]
    async fn forced_logout_keeps_live_sessions() {
        let f = fixture().await;
        let session = f
            .registry
            .create_session(&AccountId::new("u"), &ProviderId::new("p"), dec!(10))
            .await
            .unwrap();

        f.guard.enforce(&AccountId::new("u")).await.unwrap();

        assert_eq!(logouts(&f.events), 1);
        assert_eq!(
            f.registry.get(session.id).await.unwrap().status,
            SessionStatus::Active
        );
    }
}
