//! Push-driven balance and presence updates for one account.
//!
//! The listener subscribes to the account's rows on the change feed and keeps
//! the displayed balance current. While a live session exists the session
//! balance keeps shadowing the ledger, so ledger pushes are suppressed until
//! the session terminates.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::presence::PresenceGuard;
use crate::application::reconcile::{BalanceReconciler, EndOutcome};
use crate::domain::{AccountId, DisplayBalance, GameSession, SessionStatus};
use crate::error::Result;
use crate::port::{
    Change, ChangeFeed, Event, FeedFilter, FeedMessage, NoticeEvent, NotifierRegistry,
};

/// Per-account change feed consumer.
pub struct ChangeFeedListener {
    account_id: AccountId,
    feed: Arc<dyn ChangeFeed>,
    reconciler: Arc<BalanceReconciler>,
    presence: Option<Arc<PresenceGuard>>,
    notifiers: Arc<NotifierRegistry>,
    balance_tx: watch::Sender<Option<DisplayBalance>>,
}

impl ChangeFeedListener {
    pub fn new(
        account_id: AccountId,
        feed: Arc<dyn ChangeFeed>,
        reconciler: Arc<BalanceReconciler>,
        notifiers: Arc<NotifierRegistry>,
    ) -> Self {
        let (balance_tx, _) = watch::channel(None);
        Self {
            account_id,
            feed,
            reconciler,
            presence: None,
            notifiers,
            balance_tx,
        }
    }

    /// Forward account updates to `presence`.
    #[must_use]
    pub fn with_presence(mut self, presence: Arc<PresenceGuard>) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Receiver for the displayed balance; `None` until the first resolve.
    #[must_use]
    pub fn balance(&self) -> watch::Receiver<Option<DisplayBalance>> {
        self.balance_tx.subscribe()
    }

    /// Run until `shutdown` flips to true or the feed closes.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> ListenerHandle {
        let balance = self.balance();
        let task = tokio::spawn(self.run(shutdown));
        ListenerHandle { balance, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut subscription = self.feed.subscribe(FeedFilter::account(self.account_id.clone()));
        info!(account = %self.account_id, "Change feed listener started");
        self.refresh().await;

        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                message = subscription.recv() => {
                    match message {
                        Some(FeedMessage::Change(change)) => self.handle_change(change).await,
                        Some(FeedMessage::Lagged(skipped)) => {
                            warn!(account = %self.account_id, skipped, "Feed lagged, re-resolving balance");
                            self.refresh().await;
                        }
                        None => {
                            warn!(account = %self.account_id, "Change feed closed");
                            break;
                        }
                    }
                }
            }
        }
        info!(account = %self.account_id, "Change feed listener stopped");
    }

    /// Apply one change to the displayed balance and presence.
    pub async fn handle_change(&self, change: Change) {
        match change {
            Change::Account { old, new } => {
                if let Some(presence) = &self.presence {
                    presence.observe(old.as_ref(), &new);
                }
                let ledger_moved = old
                    .as_ref()
                    .map_or(true, |o| o.balance != new.balance || o.points != new.points);
                if ledger_moved {
                    self.refresh().await;
                }
            }
            Change::Session { old: None, new } => {
                debug!(account = %self.account_id, session = %new.id, "Session opened");
                self.refresh().await;
            }
            Change::Session { old: Some(old), new } => self.handle_session_update(&old, &new).await,
            Change::SessionDeleted { old } => {
                debug!(account = %self.account_id, session = %old.id, "Session deleted");
            }
        }
    }

    async fn handle_session_update(&self, old: &GameSession, new: &GameSession) {
        if old.is_live() && !new.is_live() {
            self.refresh().await;
            if new.status == SessionStatus::ForceEnded {
                self.notifiers
                    .notify_all(Event::SessionForceEnded(NoticeEvent::force_ended(
                        new,
                        "session force-ended",
                        true,
                    )));
            }
            return;
        }

        if !old.close_requested && new.close_requested && new.status == SessionStatus::Active {
            info!(account = %self.account_id, session = %new.id, "Close requested by another client");
            let reconciler = Arc::clone(&self.reconciler);
            let session_id = new.id;
            tokio::spawn(async move {
                match reconciler.end_session(session_id).await {
                    Ok(EndOutcome::AlreadyReconciling | EndOutcome::NotActive) => {
                        debug!(session = %session_id, "Feed-driven end absorbed");
                    }
                    Ok(outcome) => debug!(session = %session_id, ?outcome, "Feed-driven end finished"),
                    Err(e) => warn!(session = %session_id, error = %e, "Feed-driven end failed"),
                }
            });
        }
    }

    async fn refresh(&self) {
        match self.resolve().await {
            Ok(balance) => self.publish(balance),
            Err(e) => warn!(account = %self.account_id, error = %e, "Failed to resolve balance"),
        }
    }

    async fn resolve(&self) -> Result<DisplayBalance> {
        self.reconciler.resolve_display_balance(&self.account_id).await
    }

    fn publish(&self, balance: DisplayBalance) {
        let changed = self.balance_tx.send_if_modified(|current| {
            if current.as_ref() == Some(&balance) {
                return false;
            }
            *current = Some(balance.clone());
            true
        });
        if !changed {
            if balance.is_shadowed() {
                debug!(account = %self.account_id, "Ledger push suppressed by live session");
            }
            return;
        }
        self.notifiers.notify_all(Event::BalanceUpdated(balance));
    }
}

/// Handle to a running listener.
pub struct ListenerHandle {
    balance: watch::Receiver<Option<DisplayBalance>>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    #[must_use]
    pub fn balance(&self) -> watch::Receiver<Option<DisplayBalance>> {
        self.balance.clone()
    }

    /// Wait for the listener to stop.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Listener task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::outbound::MemoryStore;
    use crate::application::credential::PartnerCredentialResolver;
    use crate::application::session::SessionRegistry;
    use crate::domain::{BalanceSource, ProviderId};
    use crate::port::{AccountStore, SessionStore, Store};
    use crate::testkit::config::fast_retry;
    use crate::testkit::domain::seed_player;
    use crate::testkit::notifier::RecordingNotifier;
    use crate::testkit::provider::ScriptedGateway;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        registry: Arc<SessionRegistry>,
        listener: ChangeFeedListener,
        gateway: ScriptedGateway,
        events: RecordingNotifier,
    }

    async fn fixture(provider_balance: Decimal) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        seed_player(store.as_ref(), "u1", dec!(1000), &["evolution"])
            .await
            .unwrap();
        let dyn_store: Arc<dyn Store> = store.clone();
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&dyn_store)));
        let gateway = ScriptedGateway::new(provider_balance);
        let events = RecordingNotifier::new();
        let reconciler = Arc::new(
            BalanceReconciler::new(
                Arc::clone(&dyn_store),
                Arc::clone(&registry),
                Arc::new(PartnerCredentialResolver::new(Arc::clone(&dyn_store))),
                Arc::new(gateway.clone()),
                Arc::new(crate::port::NotifierRegistry::new()),
            )
            .with_retry_policy(fast_retry()),
        );
        let listener = ChangeFeedListener::new(
            AccountId::new("u1"),
            store.clone(),
            reconciler,
            events.registry(),
        );
        Fixture {
            store,
            registry,
            listener,
            gateway,
            events,
        }
    }

    fn current(listener: &ChangeFeedListener) -> DisplayBalance {
        listener.balance().borrow().clone().expect("balance published")
    }

    #[tokio::test]
    async fn ledger_push_is_suppressed_while_session_is_live() {
        let f = fixture(dec!(950)).await;
        let account = AccountId::new("u1");
        let mut sub = f.store.subscribe(FeedFilter::account(account.clone()));

        let session = f
            .registry
            .create_session(&account, &ProviderId::new("evolution"), dec!(1000))
            .await
            .unwrap();
        let Some(FeedMessage::Change(opened)) = sub.recv().await else {
            panic!("expected session insert");
        };
        f.listener.handle_change(opened).await;
        assert_eq!(current(&f.listener).balance, dec!(1000));

        f.store.set_balance(&account, dec!(1200)).await.unwrap();
        let Some(FeedMessage::Change(deposit)) = sub.recv().await else {
            panic!("expected account update");
        };
        f.listener.handle_change(deposit).await;
        let shown = current(&f.listener);
        assert_eq!(shown.balance, dec!(1000));
        assert!(shown.is_shadowed());

        f.registry
            .transition(session.id, SessionStatus::Active, SessionStatus::Ending)
            .await
            .unwrap();
        f.registry
            .transition(session.id, SessionStatus::Ending, SessionStatus::Ended)
            .await
            .unwrap();
        let _ending = sub.recv().await;
        let Some(FeedMessage::Change(ended)) = sub.recv().await else {
            panic!("expected terminal transition");
        };
        f.listener.handle_change(ended).await;
        let shown = current(&f.listener);
        assert_eq!(shown.source, BalanceSource::Ledger);
        assert_eq!(shown.balance, dec!(1200));
    }

    #[tokio::test]
    async fn force_ended_transition_raises_notice() {
        let f = fixture(dec!(1)).await;
        let session = f
            .registry
            .create_session(&AccountId::new("u1"), &ProviderId::new("evolution"), dec!(5))
            .await
            .unwrap();
        let old = session.clone();
        let new = f
            .registry
            .transition(session.id, SessionStatus::Active, SessionStatus::ForceEnded)
            .await
            .unwrap();

        f.listener
            .handle_change(Change::Session {
                old: Some(old),
                new,
            })
            .await;

        assert_eq!(
            f.events
                .count(|e| matches!(e, Event::SessionForceEnded(_))),
            1
        );
    }

    #[tokio::test]
    async fn close_request_on_feed_triggers_reconciliation() {
        let f = fixture(dec!(640)).await;
        let session = f
            .registry
            .create_session(&AccountId::new("u1"), &ProviderId::new("evolution"), dec!(1000))
            .await
            .unwrap();
        let old = session.clone();
        let new = f.store.request_close(session.id).await.unwrap();

        f.listener
            .handle_change(Change::Session {
                old: Some(old),
                new,
            })
            .await;

        for _ in 0..50 {
            if f.registry.get(session.id).await.unwrap().status == SessionStatus::Ended {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            f.registry.get(session.id).await.unwrap().status,
            SessionStatus::Ended
        );
        assert_eq!(f.gateway.balance_calls(), 1);
        let ledger = f
            .store
            .account(&AccountId::new("u1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.balance, dec!(640));
    }

    #[tokio::test]
    async fn spawned_listener_tracks_feed_until_shutdown() {
        let f = fixture(dec!(1)).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let store = f.store.clone();
        let handle = f.listener.spawn(shutdown_rx);
        let mut balance = handle.balance();

        balance.changed().await.unwrap();
        assert_eq!(balance.borrow().as_ref().unwrap().balance, dec!(1000));

        store
            .set_balance(&AccountId::new("u1"), dec!(1500))
            .await
            .unwrap();
        balance.changed().await.unwrap();
        assert_eq!(balance.borrow().as_ref().unwrap().balance, dec!(1500));

        shutdown_tx.send(true).unwrap();
        handle.join().await;
    }
}
