//! Stale session cleanup.
//!
//! Terminal sessions are kept for a retention window and then deleted.
//! Sessions stuck in `ending` (a crash mid-reconciliation) are force-ended
//! so none stays live forever.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::reconcile::ReconciliationGuard;
use crate::application::session::SessionRegistry;
use crate::domain::{DomainError, SessionStatus};
use crate::error::{ConfigError, Error, Result};
use crate::port::{Event, NoticeEvent, NotifierRegistry, Store};

/// Reaper cadence and thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct ReaperConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Seconds a terminal session is kept.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Seconds after which an `ending` session counts as stuck.
    #[serde(default = "default_ending_timeout_secs")]
    pub ending_timeout_secs: u64,
}

const fn default_interval_secs() -> u64 {
    3600
}

const fn default_retention_secs() -> u64 {
    3600
}

const fn default_ending_timeout_secs() -> u64 {
    300
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retention_secs: default_retention_secs(),
            ending_timeout_secs: default_ending_timeout_secs(),
        }
    }
}

/// Upper bound for every reaper window: 30 days.
pub const MAX_WINDOW_SECS: u64 = 30 * 24 * 3600;

impl ReaperConfig {
    /// Reject zero or out-of-range windows.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        for (field, secs) in [
            ("interval_secs", self.interval_secs),
            ("ending_timeout_secs", self.ending_timeout_secs),
        ] {
            if secs == 0 {
                return Err(out_of_range(field, "must be greater than 0"));
            }
        }
        for (field, secs) in [
            ("interval_secs", self.interval_secs),
            ("retention_secs", self.retention_secs),
            ("ending_timeout_secs", self.ending_timeout_secs),
        ] {
            if secs > MAX_WINDOW_SECS {
                return Err(out_of_range(
                    field,
                    &format!("must be at most {MAX_WINDOW_SECS} seconds"),
                ));
            }
        }
        Ok(())
    }

    fn retention(&self) -> Result<chrono::Duration> {
        window("retention_secs", self.retention_secs)
    }

    fn ending_timeout(&self) -> Result<chrono::Duration> {
        window("ending_timeout_secs", self.ending_timeout_secs)
    }
}

fn window(field: &'static str, secs: u64) -> Result<chrono::Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| out_of_range(field, "does not fit a duration"))
}

fn cutoff(
    now: DateTime<Utc>,
    field: &'static str,
    window: chrono::Duration,
) -> Result<DateTime<Utc>> {
    now.checked_sub_signed(window)
        .ok_or_else(|| out_of_range(field, "reaches before the earliest timestamp"))
}

fn out_of_range(field: &'static str, reason: &str) -> Error {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
    .into()
}

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub recovered: usize,
    pub deleted: usize,
}

pub struct StaleSessionReaper {
    store: Arc<dyn Store>,
    registry: Arc<SessionRegistry>,
    guard: ReconciliationGuard,
    notifiers: Arc<NotifierRegistry>,
    config: ReaperConfig,
}

impl StaleSessionReaper {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<SessionRegistry>,
        guard: ReconciliationGuard,
        notifiers: Arc<NotifierRegistry>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            store,
            registry,
            guard,
            notifiers,
            config,
        }
    }

    /// Delete terminal sessions that ended before `now - retention`.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = cutoff(now, "retention_secs", self.config.retention()?)?;
        let deleted = self.store.delete_terminal_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "Reaped terminal sessions");
        } else {
            debug!(cutoff = %cutoff, "No terminal sessions to reap");
        }
        Ok(deleted)
    }

    /// Force-end sessions that have been `ending` longer than the timeout.
    ///
    /// Sessions held by an in-process reconciliation are skipped.
    pub async fn recover_stuck(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = cutoff(now, "ending_timeout_secs", self.config.ending_timeout()?)?;
        let stuck = self
            .store
            .sessions_older_than(SessionStatus::Ending, cutoff)
            .await?;

        let mut recovered = 0;
        for session in stuck {
            let Some(_permit) = self.guard.try_acquire(session.id) else {
                debug!(session = %session.id, "Stuck candidate is being reconciled, skipping");
                continue;
            };
            match self
                .registry
                .transition(session.id, SessionStatus::Ending, SessionStatus::ForceEnded)
                .await
            {
                Ok(ended) => {
                    warn!(
                        session = %session.id,
                        account = %session.account_id,
                        since = %session.updated_at,
                        "Recovered session stuck in ending"
                    );
                    self.notifiers
                        .notify_all(Event::SessionForceEnded(NoticeEvent::force_ended(
                            &ended,
                            "reconciliation did not complete",
                            true,
                        )));
                    recovered += 1;
                }
                Err(Error::Domain(DomainError::StaleTransition { .. } | DomainError::NotFound { .. })) => {
                    debug!(session = %session.id, "Stuck session moved on before recovery");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(recovered)
    }

    /// One full sweep: recovery first so recovered sessions age out normally.
    ///
    /// Each step runs even when the other fails; failures are logged and
    /// count as zero in the report.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let recovered = self.recover_stuck(now).await.unwrap_or_else(|e| {
            warn!(error = %e, "Stuck session recovery failed, retrying next sweep");
            0
        });
        let deleted = self.run_once(now).await.unwrap_or_else(|e| {
            warn!(error = %e, "Terminal session cleanup failed, retrying next sweep");
            0
        });
        SweepReport { recovered, deleted }
    }

    /// Sweep on the configured interval until `shutdown` flips to true.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            info!("Session reaper stopped");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let report = self.sweep(Utc::now()).await;
                        debug!(recovered = report.recovered, deleted = report.deleted, "Sweep finished");
                    }
                }
            }
        })
    }
}
