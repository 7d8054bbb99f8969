//! Tracing-backed notifier.
//!
//! Writes every engine event to the log. Registered by default so a headless
//! deployment still records notices and forced logouts.

use tracing::{info, warn};

use crate::domain::BalanceSource;
use crate::port::{Event, Notifier};

/// Notifier that logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: Event) {
        match event {
            Event::BalanceUpdated(balance) => match &balance.source {
                BalanceSource::Ledger => info!(
                    account = %balance.account_id,
                    balance = %balance.balance,
                    points = %balance.points,
                    "Balance updated from ledger"
                ),
                BalanceSource::Session {
                    session_id,
                    provider_id,
                } => info!(
                    account = %balance.account_id,
                    balance = %balance.balance,
                    session = %session_id,
                    provider = %provider_id,
                    "Balance shadowed by game session"
                ),
            },
            Event::SessionEnded(e) => info!(
                session = %e.session_id,
                account = %e.account_id,
                provider = %e.provider_id,
                balance = %e.balance,
                "Session reconciled"
            ),
            Event::SessionForceEnded(notice) => warn!(
                session = %notice.session_id,
                account = %notice.account_id,
                cause = %notice.cause,
                retryable = notice.retryable,
                "{}",
                notice.message
            ),
            Event::SessionConflict {
                account_id,
                sessions,
            } => warn!(
                account = %account_id,
                sessions = ?sessions,
                "Multiple live sessions for account"
            ),
            Event::ForcedLogout { account_id } => {
                info!(account = %account_id, "Forced logout");
            }
            Event::GameWindowClosed { session_id } => {
                info!(session = %session_id, "Game window close requested");
            }
            Event::SyncCompleted(sync) => info!(
                provider = %sync.provider_id,
                fetched = sync.fetched,
                inserted = sync.inserted,
                "Provider sync completed"
            ),
        }
    }
}
