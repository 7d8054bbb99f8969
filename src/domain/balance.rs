//! The balance shown to a player at any instant.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::Account;
use super::id::{AccountId, ProviderId, SessionId};
use super::session::GameSession;

/// Where a displayed balance came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BalanceSource {
    /// Resting ledger value; no live session.
    Ledger,
    /// A live session's balance-at-launch shadows the ledger.
    Session {
        session_id: SessionId,
        provider_id: ProviderId,
    },
}

/// Resolved spendable balance for an account.
///
/// The balance always comes wholly from one source; points always come
/// from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayBalance {
    pub account_id: AccountId,
    pub balance: Decimal,
    pub points: Decimal,
    pub source: BalanceSource,
}

impl DisplayBalance {
    /// Balance taken straight from the ledger.
    #[must_use]
    pub fn from_ledger(account: &Account) -> Self {
        Self {
            account_id: account.id.clone(),
            balance: account.balance,
            points: account.points,
            source: BalanceSource::Ledger,
        }
    }

    /// Session balance with the ledger's points.
    #[must_use]
    pub fn from_session(account: &Account, session: &GameSession) -> Self {
        Self {
            account_id: account.id.clone(),
            balance: session.balance_at_launch,
            points: account.points,
            source: BalanceSource::Session {
                session_id: session.id,
                provider_id: session.provider_id.clone(),
            },
        }
    }

    /// True while a session shadows the ledger.
    #[must_use]
    pub fn is_shadowed(&self) -> bool {
        matches!(self.source, BalanceSource::Session { .. })
    }
}
