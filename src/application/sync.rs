//! Periodic provider history sync.
//!
//! Each top-level partner scope runs one independent timer per enabled
//! provider. A tick pulls bets settled since the stored cursor, records them
//! idempotently and advances the cursor. Failed ticks are logged and retried
//! on the next tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::application::credential::PartnerCredentialResolver;
use crate::domain::bet::latest_settlement;
use crate::domain::{PartnerId, ProviderId};
use crate::error::Result;
use crate::port::{Event, NotifierRegistry, ProviderGateway, Store, SyncEvent};

/// Cadence of one configured provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSchedule {
    pub provider_id: ProviderId,
    pub interval: Duration,
}

impl ProviderSchedule {
    pub fn new(provider_id: impl Into<ProviderId>, interval: Duration) -> Self {
        Self {
            provider_id: provider_id.into(),
            interval,
        }
    }
}

/// The per-tick work, shared by every timer task.
#[derive(Clone)]
struct SyncWorker {
    store: Arc<dyn Store>,
    resolver: Arc<PartnerCredentialResolver>,
    gateway: Arc<dyn ProviderGateway>,
    notifiers: Arc<NotifierRegistry>,
}

impl SyncWorker {
    async fn tick(&self, scope: &PartnerId, provider: &ProviderId) -> Result<SyncEvent> {
        let credential = self.resolver.resolve_credential(scope, provider).await?;
        let since = self.store.cursor(scope, provider).await?;
        let bets = self.gateway.pull_settled(provider, &credential, since).await?;
        let inserted = self.store.record_settled(&bets).await?;

        if let Some(latest) = latest_settlement(&bets) {
            if since.map_or(true, |s| latest > s) {
                self.store.save_cursor(scope, provider, latest).await?;
            }
        }

        let event = SyncEvent {
            provider_id: provider.clone(),
            fetched: bets.len(),
            inserted,
        };
        debug!(
            partner = %scope,
            provider = %provider,
            fetched = event.fetched,
            inserted,
            "Provider sync tick"
        );
        self.notifiers.notify_all(Event::SyncCompleted(event.clone()));
        Ok(event)
    }

    fn spawn_timer(self, scope: PartnerId, schedule: ProviderSchedule) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(schedule.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(e) = self.tick(&scope, &schedule.provider_id).await {
                    warn!(
                        partner = %scope,
                        provider = %schedule.provider_id,
                        error = %e,
                        "Provider sync failed, retrying next tick"
                    );
                }
            }
        })
    }
}

/// Timers of one scope, tagged with the `start` call that reserved it.
struct ScopeTimers {
    generation: u64,
    handles: Vec<JoinHandle<()>>,
}

/// Starts and stops per-provider sync timers per partner scope.
pub struct ProviderSyncScheduler {
    worker: SyncWorker,
    schedules: Vec<ProviderSchedule>,
    running: Mutex<HashMap<PartnerId, ScopeTimers>>,
    generation: AtomicU64,
}

impl ProviderSyncScheduler {
    /// `schedules` lists the config-enabled providers and their cadence.
    pub fn new(
        store: Arc<dyn Store>,
        resolver: Arc<PartnerCredentialResolver>,
        gateway: Arc<dyn ProviderGateway>,
        notifiers: Arc<NotifierRegistry>,
        schedules: Vec<ProviderSchedule>,
    ) -> Self {
        Self {
            worker: SyncWorker {
                store,
                resolver,
                gateway,
                notifiers,
            },
            schedules,
            running: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Start timers for `scope`, a top-level partner.
    ///
    /// No-op when the scope is already running. Otherwise looks up the
    /// providers the partner currently holds usable credentials for and
    /// returns how many timers were started.
    pub async fn start(&self, scope: &PartnerId) -> Result<usize> {
        let Some(generation) = self.reserve(scope) else {
            debug!(partner = %scope, "Provider sync already running");
            return Ok(0);
        };

        let enabled = match self.worker.resolver.enabled_providers(scope).await {
            Ok(enabled) => enabled,
            Err(e) => {
                let mut running = self.running.lock();
                if running.get(scope).is_some_and(|t| t.generation == generation) {
                    running.remove(scope);
                }
                return Err(e);
            }
        };

        let handles: Vec<JoinHandle<()>> = self
            .schedules
            .iter()
            .filter(|s| enabled.contains(&s.provider_id))
            .map(|s| self.worker.clone().spawn_timer(scope.clone(), s.clone()))
            .collect();
        Ok(self.commit(scope, generation, handles))
    }

    /// Claim `scope` for a new `start`; `None` if it is already claimed.
    fn reserve(&self, scope: &PartnerId) -> Option<u64> {
        let mut running = self.running.lock();
        if running.contains_key(scope) {
            return None;
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        running.insert(
            scope.clone(),
            ScopeTimers {
                generation,
                handles: Vec::new(),
            },
        );
        Some(generation)
    }

    /// Hand `handles` to the reservation `generation`. If the scope was
    /// stopped or re-reserved meanwhile the handles are aborted instead.
    fn commit(&self, scope: &PartnerId, generation: u64, handles: Vec<JoinHandle<()>>) -> usize {
        let mut running = self.running.lock();
        match running.get_mut(scope) {
            Some(timers) if timers.generation == generation => {
                let started = handles.len();
                timers.handles.extend(handles);
                info!(partner = %scope, providers = started, "Provider sync started");
                started
            }
            _ => {
                handles.iter().for_each(JoinHandle::abort);
                debug!(partner = %scope, "Scope stopped during start, timers discarded");
                0
            }
        }
    }

    /// Stop every scope and clear bookkeeping.
    pub fn stop(&self) {
        let drained: Vec<(PartnerId, ScopeTimers)> = self.running.lock().drain().collect();
        for (scope, timers) in drained {
            timers.handles.iter().for_each(JoinHandle::abort);
            info!(partner = %scope, "Provider sync stopped");
        }
    }

    /// Stop one scope. Returns false if it was not running.
    pub fn stop_scope(&self, scope: &PartnerId) -> bool {
        let Some(timers) = self.running.lock().remove(scope) else {
            return false;
        };
        timers.handles.iter().for_each(JoinHandle::abort);
        info!(partner = %scope, "Provider sync stopped");
        true
    }

    #[must_use]
    pub fn is_running(&self, scope: &PartnerId) -> bool {
        self.running.lock().contains_key(scope)
    }

    /// Number of live timers for `scope`.
    #[must_use]
    pub fn timer_count(&self, scope: &PartnerId) -> usize {
        self.running.lock().get(scope).map_or(0, |t| t.handles.len())
    }

    /// Run one sync for (`scope`, `provider`) outside the timers.
    pub async fn sync_now(&self, scope: &PartnerId, provider: &ProviderId) -> Result<SyncEvent> {
        self.worker.tick(scope, provider).await
    }
}

impl Drop for ProviderSyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
