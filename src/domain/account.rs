//! Player accounts and the ledger balance of record.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{AccountId, PartnerId};

/// A player identity with its resting ledger balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Login name; also the player key at every provider.
    pub username: String,
    /// Resting balance, authoritative only while no session is live.
    pub balance: Decimal,
    /// Bonus points; never shadowed by a session.
    pub points: Decimal,
    pub online: bool,
    /// Partner that referred (owns) this account.
    pub referrer_id: Option<PartnerId>,
}

impl Account {
    /// Create an offline account with zero balances.
    pub fn new(id: impl Into<AccountId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            balance: Decimal::ZERO,
            points: Decimal::ZERO,
            online: false,
            referrer_id: None,
        }
    }

    #[must_use]
    pub fn with_balance(mut self, balance: Decimal) -> Self {
        self.balance = balance;
        self
    }

    #[must_use]
    pub fn with_points(mut self, points: Decimal) -> Self {
        self.points = points;
        self
    }

    #[must_use]
    pub fn with_referrer(mut self, partner: impl Into<PartnerId>) -> Self {
        self.referrer_id = Some(partner.into());
        self
    }

    #[must_use]
    pub fn online(mut self) -> Self {
        self.online = true;
        self
    }

    /// True when this update flips the account from online to offline.
    #[must_use]
    pub fn went_offline(old: Option<&Account>, new: &Account) -> bool {
        !new.online && old.map_or(false, |o| o.online)
    }
}
