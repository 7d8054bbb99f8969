//! Balance reconciliation service.
//!
//! Decides which balance a player sees and closes game sessions by pulling
//! the provider's balance back into the ledger. A session is reconciled at
//! most once: the process-local [`ReconciliationGuard`] absorbs duplicate
//! triggers, and the `active -> ending` compare-and-set on the row rejects
//! any that slip through from other processes.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::guard::ReconciliationGuard;
use super::retry::RetryPolicy;
use crate::application::credential::PartnerCredentialResolver;
use crate::application::session::SessionRegistry;
use crate::domain::{
    AccountId, DisplayBalance, DomainError, GameSession, SessionId, SessionStatus,
};
use crate::error::{Error, Result};
use crate::port::{Event, NoticeEvent, NotifierRegistry, ProviderGateway, SessionEvent, Store};

/// How an `end_session` call finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOutcome {
    /// Another caller holds the session; nothing was done.
    AlreadyReconciling,
    /// The session was missing or no longer `active`.
    NotActive,
    /// Provider balance written to the ledger; session `ended`.
    Settled { balance: Decimal },
    /// Reconciliation failed; session `force_ended`, ledger untouched.
    ForceEnded { reason: String },
}

/// Display-balance resolution and session end.
pub struct BalanceReconciler {
    store: Arc<dyn Store>,
    registry: Arc<SessionRegistry>,
    resolver: Arc<PartnerCredentialResolver>,
    gateway: Arc<dyn ProviderGateway>,
    notifiers: Arc<NotifierRegistry>,
    guard: ReconciliationGuard,
    retry: RetryPolicy,
}

impl BalanceReconciler {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<SessionRegistry>,
        resolver: Arc<PartnerCredentialResolver>,
        gateway: Arc<dyn ProviderGateway>,
        notifiers: Arc<NotifierRegistry>,
    ) -> Self {
        Self {
            store,
            registry,
            resolver,
            gateway,
            notifiers,
            guard: ReconciliationGuard::new(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share a guard with other components (the reaper skips held ids).
    #[must_use]
    pub fn with_guard(mut self, guard: ReconciliationGuard) -> Self {
        self.guard = guard;
        self
    }

    #[must_use]
    pub fn guard(&self) -> &ReconciliationGuard {
        &self.guard
    }

    /// Balance the player should see right now.
    ///
    /// The newest live session shadows the ledger balance; points always
    /// come from the ledger. More than one live session is reported as a
    /// conflict but still resolves to the newest.
    pub async fn resolve_display_balance(&self, account_id: &AccountId) -> Result<DisplayBalance> {
        let account = self
            .store
            .account(account_id)
            .await?
            .ok_or_else(|| DomainError::account_not_found(account_id))?;
        let live = self.registry.list_live_for_account(account_id).await?;

        if live.len() > 1 {
            let sessions: Vec<SessionId> = live.iter().map(|s| s.id).collect();
            warn!(account = %account_id, sessions = ?sessions, "Multiple live sessions, newest wins");
            self.notifiers.notify_all(Event::SessionConflict {
                account_id: account_id.clone(),
                sessions,
            });
        }

        Ok(match live.first() {
            Some(session) => DisplayBalance::from_session(&account, session),
            None => DisplayBalance::from_ledger(&account),
        })
    }

    /// Close `session_id`, writing the provider balance back to the ledger.
    ///
    /// Races are absorbed: a held guard yields
    /// [`EndOutcome::AlreadyReconciling`] and a session that is not `active`
    /// yields [`EndOutcome::NotActive`]. Credential and provider failures
    /// force-end the session and are reported as [`EndOutcome::ForceEnded`].
    pub async fn end_session(&self, session_id: SessionId) -> Result<EndOutcome> {
        let Some(_permit) = self.guard.try_acquire(session_id) else {
            debug!(session = %session_id, "Session already being reconciled");
            return Ok(EndOutcome::AlreadyReconciling);
        };

        let session = match self
            .registry
            .transition(session_id, SessionStatus::Active, SessionStatus::Ending)
            .await
        {
            Ok(session) => session,
            Err(Error::Domain(
                DomainError::StaleTransition { .. } | DomainError::NotFound { .. },
            )) => {
                debug!(session = %session_id, "Session not active, nothing to reconcile");
                return Ok(EndOutcome::NotActive);
            }
            Err(e) => return Err(e),
        };

        match self.settle(&session).await {
            Ok(balance) => {
                self.registry
                    .transition(session_id, SessionStatus::Ending, SessionStatus::Ended)
                    .await?;
                info!(
                    session = %session_id,
                    account = %session.account_id,
                    provider = %session.provider_id,
                    launch = %session.balance_at_launch,
                    balance = %balance,
                    "Session reconciled"
                );
                self.notifiers.notify_all(Event::SessionEnded(SessionEvent {
                    session_id,
                    account_id: session.account_id.clone(),
                    provider_id: session.provider_id.clone(),
                    balance,
                }));
                self.publish_balance(&session.account_id).await;
                Ok(EndOutcome::Settled { balance })
            }
            Err(err) => self.force_end(&session, &err).await,
        }
    }

    /// Client-side trigger: the game window reported the game is over.
    pub async fn sync_balance_after_game(&self, session_id: SessionId) -> Result<EndOutcome> {
        self.end_session(session_id).await
    }

    /// Ask every client to close the window of `session_id`, then reconcile.
    pub async fn force_close_game_window(&self, session_id: SessionId) -> Result<EndOutcome> {
        match self.registry.request_close(session_id).await {
            Ok(_) => {}
            Err(Error::Domain(DomainError::NotFound { .. })) => return Ok(EndOutcome::NotActive),
            Err(e) => return Err(e),
        }
        self.notifiers
            .notify_all(Event::GameWindowClosed { session_id });
        self.end_session(session_id).await
    }

    /// Fail with [`DomainError::Conflict`] while the account has a live
    /// session. Deposit and withdraw flows call this before writing the
    /// ledger directly.
    pub async fn ensure_ledger_writable(&self, account_id: &AccountId) -> Result<()> {
        let live = self.registry.list_live_for_account(account_id).await?;
        match live.into_iter().next() {
            Some(session) => Err(DomainError::Conflict {
                account: account_id.clone(),
                provider: session.provider_id,
                existing: session.id,
            }
            .into()),
            None => Ok(()),
        }
    }

    async fn settle(&self, session: &GameSession) -> Result<Decimal> {
        let account = self
            .store
            .account(&session.account_id)
            .await?
            .ok_or_else(|| DomainError::account_not_found(&session.account_id))?;
        let credential = self
            .resolver
            .resolve_for_account(&session.account_id, &session.provider_id)
            .await?;
        let balance = self
            .retry
            .run(|| {
                self.gateway
                    .fetch_balance(&session.provider_id, &credential, &account.username)
            })
            .await?;
        self.store.set_balance(&session.account_id, balance).await?;
        Ok(balance)
    }

    async fn force_end(&self, session: &GameSession, cause: &Error) -> Result<EndOutcome> {
        warn!(
            session = %session.id,
            account = %session.account_id,
            provider = %session.provider_id,
            error = %cause,
            "Reconciliation failed, force-ending session"
        );
        match self
            .registry
            .transition(session.id, SessionStatus::Ending, SessionStatus::ForceEnded)
            .await
        {
            Ok(_) => {}
            Err(Error::Domain(DomainError::StaleTransition { .. })) => {
                return Ok(EndOutcome::NotActive);
            }
            Err(e) => {
                error!(session = %session.id, error = %e, "Failed to force-end session");
                return Err(e);
            }
        }
        let reason = cause.to_string();
        self.notifiers
            .notify_all(Event::SessionForceEnded(NoticeEvent::force_ended(
                session, &reason, true,
            )));
        self.publish_balance(&session.account_id).await;
        Ok(EndOutcome::ForceEnded { reason })
    }

    async fn publish_balance(&self, account_id: &AccountId) {
        match self.resolve_display_balance(account_id).await {
            Ok(balance) => self.notifiers.notify_all(Event::BalanceUpdated(balance)),
            Err(e) => warn!(account = %account_id, error = %e, "Failed to refresh balance"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::outbound::MemoryStore;
    use crate::domain::{BalanceSource, ProviderId};
    use crate::port::{AccountStore, SessionStore};
    use crate::testkit::config::fast_retry;
    use crate::testkit::domain::seed_player;
    use crate::testkit::notifier::RecordingNotifier;
    use crate::testkit::provider::ScriptedGateway;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        registry: Arc<SessionRegistry>,
        reconciler: Arc<BalanceReconciler>,
        gateway: ScriptedGateway,
        events: RecordingNotifier,
    }

    fn fixture(gateway: ScriptedGateway) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Store> = store.clone();
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&dyn_store)));
        let resolver = Arc::new(PartnerCredentialResolver::new(Arc::clone(&dyn_store)));
        let events = RecordingNotifier::new();
        let reconciler = BalanceReconciler::new(
            dyn_store,
            Arc::clone(&registry),
            resolver,
            Arc::new(gateway.clone()),
            events.registry(),
        )
        .with_retry_policy(fast_retry());
        Fixture {
            store,
            registry,
            reconciler: Arc::new(reconciler),
            gateway,
            events,
        }
    }

    fn account() -> AccountId {
        AccountId::new("u1")
    }

    fn provider() -> ProviderId {
        ProviderId::new("evolution")
    }

    #[tokio::test]
    async fn session_balance_shadows_ledger_until_reconciled() {
        let f = fixture(ScriptedGateway::new(dec!(950)));
        seed_player(f.store.as_ref(), "u1", dec!(1000), &["evolution"])
            .await
            .unwrap();
        let session = f
            .registry
            .create_session(&account(), &provider(), dec!(1000))
            .await
            .unwrap();

        // A deposit lands while the game is open.
        f.store.set_balance(&account(), dec!(1200)).await.unwrap();
        let shown = f.reconciler.resolve_display_balance(&account()).await.unwrap();
        assert_eq!(shown.balance, dec!(1000));
        assert!(shown.is_shadowed());

        let outcome = f.reconciler.end_session(session.id).await.unwrap();
        assert_eq!(outcome, EndOutcome::Settled { balance: dec!(950) });

        let ledger = f.store.account(&account()).await.unwrap().unwrap();
        assert_eq!(ledger.balance, dec!(950));
        let ended = f.registry.get(session.id).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Ended);

        let shown = f.reconciler.resolve_display_balance(&account()).await.unwrap();
        assert_eq!(shown.source, BalanceSource::Ledger);
        assert_eq!(shown.balance, dec!(950));
    }

    #[tokio::test]
    async fn concurrent_ends_call_provider_once() {
        let f = fixture(ScriptedGateway::new(dec!(10)).with_delay(Duration::from_millis(50)));
        seed_player(f.store.as_ref(), "u1", dec!(1000), &["evolution"])
            .await
            .unwrap();
        let session = f
            .registry
            .create_session(&account(), &provider(), dec!(1000))
            .await
            .unwrap();

        let a = tokio::spawn({
            let r = Arc::clone(&f.reconciler);
            async move { r.end_session(session.id).await }
        });
        let b = tokio::spawn({
            let r = Arc::clone(&f.reconciler);
            async move { r.end_session(session.id).await }
        });
        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];

        assert_eq!(f.gateway.balance_calls(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, EndOutcome::Settled { .. }))
                .count(),
            1
        );
        assert_eq!(
            f.events
                .count(|e| matches!(e, Event::SessionEnded(_))),
            1
        );
        assert!(f.reconciler.guard().is_empty());
    }

    #[tokio::test]
    async fn provider_outage_force_ends_after_retries() {
        let f = fixture(ScriptedGateway::new(dec!(1)).failing(3));
        seed_player(f.store.as_ref(), "u1", dec!(1000), &["evolution"])
            .await
            .unwrap();
        let session = f
            .registry
            .create_session(&account(), &provider(), dec!(1000))
            .await
            .unwrap();

        let outcome = f.reconciler.end_session(session.id).await.unwrap();
        assert!(matches!(outcome, EndOutcome::ForceEnded { .. }));
        assert_eq!(f.gateway.balance_calls(), 3);

        let ledger = f.store.account(&account()).await.unwrap().unwrap();
        assert_eq!(ledger.balance, dec!(1000));
        assert_eq!(
            f.registry.get(session.id).await.unwrap().status,
            SessionStatus::ForceEnded
        );
        let notices: Vec<_> = f
            .events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::SessionForceEnded(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, crate::port::FORCE_END_NOTICE);
        assert!(notices[0].retryable);
    }

    #[tokio::test]
    async fn transient_outage_recovers_within_policy() {
        let f = fixture(ScriptedGateway::new(dec!(975)).failing(2));
        seed_player(f.store.as_ref(), "u1", dec!(1000), &["evolution"])
            .await
            .unwrap();
        let session = f
            .registry
            .create_session(&account(), &provider(), dec!(1000))
            .await
            .unwrap();

        let outcome = f.reconciler.end_session(session.id).await.unwrap();
        assert_eq!(outcome, EndOutcome::Settled { balance: dec!(975) });
        assert_eq!(f.gateway.balance_calls(), 3);
    }

    #[tokio::test]
    async fn provider_rejection_force_ends_without_retrying() {
        let f = fixture(ScriptedGateway::new(dec!(1)).with_balances(vec![Err(
            DomainError::ProviderRejected {
                provider: provider(),
                reason: "401 Unauthorized".into(),
            },
        )]));
        seed_player(f.store.as_ref(), "u1", dec!(1000), &["evolution"])
            .await
            .unwrap();
        let session = f
            .registry
            .create_session(&account(), &provider(), dec!(1000))
            .await
            .unwrap();

        let outcome = f.reconciler.end_session(session.id).await.unwrap();
        assert!(matches!(outcome, EndOutcome::ForceEnded { .. }));
        assert_eq!(f.gateway.balance_calls(), 1);
        let ledger = f.store.account(&account()).await.unwrap().unwrap();
        assert_eq!(ledger.balance, dec!(1000));
    }

    #[tokio::test]
    async fn missing_credential_force_ends_without_provider_call() {
        let f = fixture(ScriptedGateway::new(dec!(1)));
        seed_player(f.store.as_ref(), "u1", dec!(1000), &[])
            .await
            .unwrap();
        let session = f
            .registry
            .create_session(&account(), &provider(), dec!(1000))
            .await
            .unwrap();

        let outcome = f.reconciler.end_session(session.id).await.unwrap();
        match outcome {
            EndOutcome::ForceEnded { reason } => assert!(reason.contains("credential")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(f.gateway.balance_calls(), 0);
    }

    #[tokio::test]
    async fn ending_a_finished_or_unknown_session_is_not_active() {
        let f = fixture(ScriptedGateway::new(dec!(1)));
        seed_player(f.store.as_ref(), "u1", dec!(1000), &["evolution"])
            .await
            .unwrap();
        let session = f
            .registry
            .create_session(&account(), &provider(), dec!(1000))
            .await
            .unwrap();
        f.reconciler.end_session(session.id).await.unwrap();

        assert_eq!(
            f.reconciler.end_session(session.id).await.unwrap(),
            EndOutcome::NotActive
        );
        assert_eq!(
            f.reconciler.end_session(SessionId::new(999)).await.unwrap(),
            EndOutcome::NotActive
        );
        assert_eq!(f.gateway.balance_calls(), 1);
    }

    #[tokio::test]
    async fn ledger_is_locked_while_a_session_is_live() {
        let f = fixture(ScriptedGateway::new(dec!(1)));
        seed_player(f.store.as_ref(), "u1", dec!(1000), &["evolution"])
            .await
            .unwrap();
        f.reconciler.ensure_ledger_writable(&account()).await.unwrap();

        let session = f
            .registry
            .create_session(&account(), &provider(), dec!(1000))
            .await
            .unwrap();
        let err = f
            .reconciler
            .ensure_ledger_writable(&account())
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Conflict { existing, .. }) if *existing == session.id));
    }

    #[tokio::test]
    async fn force_close_flags_row_and_reconciles() {
        let f = fixture(ScriptedGateway::new(dec!(900)));
        seed_player(f.store.as_ref(), "u1", dec!(1000), &["evolution"])
            .await
            .unwrap();
        let session = f
            .registry
            .create_session(&account(), &provider(), dec!(1000))
            .await
            .unwrap();

        let outcome = f
            .reconciler
            .force_close_game_window(session.id)
            .await
            .unwrap();
        assert_eq!(outcome, EndOutcome::Settled { balance: dec!(900) });

        let stored = f.store.session(session.id).await.unwrap().unwrap();
        assert!(stored.close_requested);
        assert_eq!(
            f.events
                .count(|e| matches!(e, Event::GameWindowClosed { .. })),
            1
        );
    }

    #[tokio::test]
    async fn multiple_live_sessions_resolve_to_newest_and_flag_conflict() {
        let f = fixture(ScriptedGateway::new(dec!(1)));
        seed_player(f.store.as_ref(), "u1", dec!(1000), &["a", "b"])
            .await
            .unwrap();
        f.registry
            .create_session(&account(), &ProviderId::new("a"), dec!(1000))
            .await
            .unwrap();
        let newer = f
            .registry
            .create_session(&account(), &ProviderId::new("b"), dec!(700))
            .await
            .unwrap();

        let shown = f.reconciler.resolve_display_balance(&account()).await.unwrap();
        assert_eq!(shown.balance, dec!(700));
        assert_eq!(
            shown.source,
            BalanceSource::Session {
                session_id: newer.id,
                provider_id: ProviderId::new("b"),
            }
        );
        assert_eq!(
            f.events
                .count(|e| matches!(e, Event::SessionConflict { .. })),
            1
        );
    }
}
