//! In-memory store implementation.
//!
//! Backs tests and single-process embedding. All tables sit behind one lock
//! so check-then-insert and compare-and-set are atomic.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::hub::FeedHub;
use crate::domain::{
    Account, AccountId, DomainError, GameSession, NewSession, Partner, PartnerId,
    ProviderCredential, ProviderId, SessionId, SessionStatus, SettledBet,
};
use crate::error::Result;
use crate::port::{
    AccountStore, Change, ChangeFeed, FeedFilter, FeedSubscription, PartnerStore, SessionStore,
    SyncStore,
};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    partners: HashMap<PartnerId, Partner>,
    credentials: HashMap<(PartnerId, ProviderId), ProviderCredential>,
    sessions: BTreeMap<SessionId, GameSession>,
    next_session_id: i64,
    cursors: HashMap<(PartnerId, ProviderId), DateTime<Utc>>,
    bets: HashSet<(ProviderId, String)>,
}

/// In-memory store with an attached change feed.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    hub: FeedHub,
}

impl MemoryStore {
    /// Create a new empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose feed buffers `capacity` changes per subscriber.
    #[must_use]
    pub fn with_feed_capacity(capacity: usize) -> Self {
        Self {
            tables: Mutex::default(),
            hub: FeedHub::new(capacity),
        }
    }

    /// The change feed this store publishes to.
    #[must_use]
    pub fn hub(&self) -> &FeedHub {
        &self.hub
    }

    /// Number of stored sessions in any status.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.tables.lock().sessions.len()
    }

    /// Number of recorded settled bets.
    #[must_use]
    pub fn settled_count(&self) -> usize {
        self.tables.lock().bets.len()
    }

    fn update_account<F>(&self, id: &AccountId, apply: F) -> Result<Account>
    where
        F: FnOnce(&mut Account),
    {
        let (old, new) = {
            let mut tables = self.tables.lock();
            let account = tables
                .accounts
                .get_mut(id)
                .ok_or_else(|| DomainError::account_not_found(id))?;
            let old = account.clone();
            apply(account);
            (old, account.clone())
        };
        self.hub.publish(Change::Account {
            old: Some(old),
            new: new.clone(),
        });
        Ok(new)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn put_account(&self, account: &Account) -> Result<()> {
        let old = self
            .tables
            .lock()
            .accounts
            .insert(account.id.clone(), account.clone());
        self.hub.publish(Change::Account {
            old,
            new: account.clone(),
        });
        Ok(())
    }

    async fn account(&self, id: &AccountId) -> Result<Option<Account>> {
        Ok(self.tables.lock().accounts.get(id).cloned())
    }

    async fn set_balance(&self, id: &AccountId, balance: Decimal) -> Result<Account> {
        self.update_account(id, |account| account.balance = balance)
    }

    async fn set_online(&self, id: &AccountId, online: bool) -> Result<Account> {
        self.update_account(id, |account| account.online = online)
    }
}

#[async_trait]
impl PartnerStore for MemoryStore {
    async fn put_partner(&self, partner: &Partner) -> Result<()> {
        self.tables
            .lock()
            .partners
            .insert(partner.id.clone(), partner.clone());
        Ok(())
    }

    async fn partner(&self, id: &PartnerId) -> Result<Option<Partner>> {
        Ok(self.tables.lock().partners.get(id).cloned())
    }

    async fn put_credential(&self, credential: &ProviderCredential) -> Result<()> {
        self.tables.lock().credentials.insert(
            (
                credential.partner_id.clone(),
                credential.provider_id.clone(),
            ),
            credential.clone(),
        );
        Ok(())
    }

    async fn credential(
        &self,
        partner: &PartnerId,
        provider: &ProviderId,
    ) -> Result<Option<ProviderCredential>> {
        Ok(self
            .tables
            .lock()
            .credentials
            .get(&(partner.clone(), provider.clone()))
            .cloned())
    }

    async fn credentials(&self, partner: &PartnerId) -> Result<Vec<ProviderCredential>> {
        let tables = self.tables.lock();
        let mut found: Vec<_> = tables
            .credentials
            .values()
            .filter(|c| &c.partner_id == partner)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        Ok(found)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, new: NewSession) -> Result<GameSession> {
        let session = {
            let mut tables = self.tables.lock();
            if let Some(existing) = tables.sessions.values().find(|s| {
                s.is_live() && s.account_id == new.account_id && s.provider_id == new.provider_id
            }) {
                return Err(DomainError::Conflict {
                    account: new.account_id,
                    provider: new.provider_id,
                    existing: existing.id,
                }
                .into());
            }
            tables.next_session_id += 1;
            let id = SessionId::new(tables.next_session_id);
            let session = GameSession::from_new(id, new);
            tables.sessions.insert(id, session.clone());
            session
        };
        self.hub.publish(Change::Session {
            old: None,
            new: session.clone(),
        });
        Ok(session)
    }

    async fn session(&self, id: SessionId) -> Result<Option<GameSession>> {
        Ok(self.tables.lock().sessions.get(&id).cloned())
    }

    async fn compare_and_set_status(
        &self,
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<GameSession> {
        let (old, new) = {
            let mut tables = self.tables.lock();
            let session = tables
                .sessions
                .get_mut(&id)
                .ok_or_else(|| DomainError::session_not_found(id))?;
            if session.status != from {
                return Err(DomainError::StaleTransition {
                    session: id,
                    expected: from,
                    actual: Some(session.status),
                }
                .into());
            }
            let old = session.clone();
            session.apply_status(to, at);
            (old, session.clone())
        };
        self.hub.publish(Change::Session {
            old: Some(old),
            new: new.clone(),
        });
        Ok(new)
    }

    async fn live_sessions(
        &self,
        account: &AccountId,
        provider: Option<&ProviderId>,
    ) -> Result<Vec<GameSession>> {
        let tables = self.tables.lock();
        Ok(tables
            .sessions
            .values()
            .filter(|s| s.is_live() && &s.account_id == account)
            .filter(|s| provider.map_or(true, |p| &s.provider_id == p))
            .cloned()
            .collect())
    }

    async fn request_close(&self, id: SessionId) -> Result<GameSession> {
        let (old, new) = {
            let mut tables = self.tables.lock();
            let session = tables
                .sessions
                .get_mut(&id)
                .ok_or_else(|| DomainError::session_not_found(id))?;
            if !session.is_live() || session.close_requested {
                return Ok(session.clone());
            }
            let old = session.clone();
            session.close_requested = true;
            (old, session.clone())
        };
        self.hub.publish(Change::Session {
            old: Some(old),
            new: new.clone(),
        });
        Ok(new)
    }

    async fn sessions_older_than(
        &self,
        status: SessionStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<GameSession>> {
        let tables = self.tables.lock();
        Ok(tables
            .sessions
            .values()
            .filter(|s| s.status == status)
            .filter(|s| {
                let stamp = if status.is_terminal() {
                    s.ended_at
                } else {
                    Some(s.updated_at)
                };
                stamp.is_some_and(|t| t < cutoff)
            })
            .cloned()
            .collect())
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed: Vec<GameSession> = {
            let mut tables = self.tables.lock();
            let expired: Vec<SessionId> = tables
                .sessions
                .values()
                .filter(|s| s.status.is_terminal() && s.ended_at.is_some_and(|t| t < cutoff))
                .map(|s| s.id)
                .collect();
            expired
                .iter()
                .filter_map(|id| tables.sessions.remove(id))
                .collect()
        };
        let count = removed.len();
        for old in removed {
            self.hub.publish(Change::SessionDeleted { old });
        }
        Ok(count)
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn cursor(
        &self,
        partner: &PartnerId,
        provider: &ProviderId,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .tables
            .lock()
            .cursors
            .get(&(partner.clone(), provider.clone()))
            .copied())
    }

    async fn save_cursor(
        &self,
        partner: &PartnerId,
        provider: &ProviderId,
        synced_until: DateTime<Utc>,
    ) -> Result<()> {
        self.tables
            .lock()
            .cursors
            .insert((partner.clone(), provider.clone()), synced_until);
        Ok(())
    }

    async fn record_settled(&self, bets: &[SettledBet]) -> Result<usize> {
        let mut tables = self.tables.lock();
        let inserted = bets
            .iter()
            .filter(|b| {
                tables
                    .bets
                    .insert((b.provider_id.clone(), b.external_id.clone()))
            })
            .count();
        Ok(inserted)
    }
}

impl ChangeFeed for MemoryStore {
    fn subscribe(&self, filter: FeedFilter) -> FeedSubscription {
        self.hub.subscribe(filter)
    }
}
