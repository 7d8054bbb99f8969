//! Change-feed port: push delivery of table mutations.
//!
//! Mirrors the hosted backend's realtime channel. Subscribers pick a table
//! and an optional account filter; updates carry old and new rows, inserts
//! carry only the new row.

use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::{Account, AccountId, GameSession};

/// One row-level mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Account inserted (`old` is `None`) or updated.
    Account {
        old: Option<Account>,
        new: Account,
    },
    /// Session inserted (`old` is `None`) or updated.
    Session {
        old: Option<GameSession>,
        new: GameSession,
    },
    /// Session row deleted.
    SessionDeleted { old: GameSession },
}

impl Change {
    /// Table the change belongs to.
    #[must_use]
    pub fn table(&self) -> Table {
        match self {
            Change::Account { .. } => Table::Accounts,
            Change::Session { .. } | Change::SessionDeleted { .. } => Table::Sessions,
        }
    }

    /// Account the changed row belongs to.
    #[must_use]
    pub fn account_id(&self) -> &AccountId {
        match self {
            Change::Account { new, .. } => &new.id,
            Change::Session { new, .. } => &new.account_id,
            Change::SessionDeleted { old } => &old.account_id,
        }
    }
}

/// Tables exposed on the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Accounts,
    Sessions,
}

/// Subscription predicate.
#[derive(Debug, Clone, Default)]
pub struct FeedFilter {
    /// Tables of interest; empty means all.
    pub tables: Vec<Table>,
    /// Only rows owned by this account.
    pub account: Option<AccountId>,
}

impl FeedFilter {
    /// Both tables, rows of one account.
    #[must_use]
    pub fn account(account: AccountId) -> Self {
        Self {
            tables: vec![Table::Accounts, Table::Sessions],
            account: Some(account),
        }
    }

    /// Every row of one table.
    #[must_use]
    pub fn table(table: Table) -> Self {
        Self {
            tables: vec![table],
            account: None,
        }
    }

    /// Whether a change passes this filter.
    #[must_use]
    pub fn matches(&self, change: &Change) -> bool {
        let table_ok = self.tables.is_empty() || self.tables.contains(&change.table());
        let account_ok = self
            .account
            .as_ref()
            .map_or(true, |id| id == change.account_id());
        table_ok && account_ok
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Change(Change),
    /// Messages were dropped; the subscriber must resync from the store.
    Lagged(u64),
}

/// A filtered view over the feed's broadcast channel.
pub struct FeedSubscription {
    filter: FeedFilter,
    rx: broadcast::Receiver<Change>,
}

impl FeedSubscription {
    #[must_use]
    pub fn new(filter: FeedFilter, rx: broadcast::Receiver<Change>) -> Self {
        Self { filter, rx }
    }

    /// Next matching message, or `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        loop {
            match self.rx.recv().await {
                Ok(change) if self.filter.matches(&change) => {
                    return Some(FeedMessage::Change(change));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Change feed subscriber lagged");
                    return Some(FeedMessage::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Source of row-level change notifications.
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to changes matching `filter`.
    fn subscribe(&self, filter: FeedFilter) -> FeedSubscription;
}
