//! Persistence ports for accounts, partners, sessions, and sync state.
//!
//! These mirror the hosted backend's table surface. Every mutating call is
//! expected to publish a [`Change`](super::feed::Change) on the adapter's
//! change feed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    Account, AccountId, GameSession, NewSession, Partner, PartnerId, ProviderCredential,
    ProviderId, SessionId, SessionStatus, SettledBet,
};
use crate::error::Result;

/// Storage operations for player accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert or replace an account.
    async fn put_account(&self, account: &Account) -> Result<()>;

    /// Get an account by ID.
    async fn account(&self, id: &AccountId) -> Result<Option<Account>>;

    /// Overwrite the ledger balance. Returns the updated account.
    ///
    /// Fails with `NotFound` if the account does not exist.
    async fn set_balance(&self, id: &AccountId, balance: Decimal) -> Result<Account>;

    /// Flip the online flag. Returns the updated account.
    async fn set_online(&self, id: &AccountId, online: bool) -> Result<Account>;
}

/// Storage operations for the partner tree and its credentials.
#[async_trait]
pub trait PartnerStore: Send + Sync {
    /// Insert or replace a partner node.
    async fn put_partner(&self, partner: &Partner) -> Result<()>;

    /// Get a partner by ID.
    async fn partner(&self, id: &PartnerId) -> Result<Option<Partner>>;

    /// Insert or replace a credential keyed by (partner, provider).
    async fn put_credential(&self, credential: &ProviderCredential) -> Result<()>;

    /// Get the credential a partner holds for a provider.
    async fn credential(
        &self,
        partner: &PartnerId,
        provider: &ProviderId,
    ) -> Result<Option<ProviderCredential>>;

    /// All credentials held by a partner.
    async fn credentials(&self, partner: &PartnerId) -> Result<Vec<ProviderCredential>>;
}

/// Storage operations for game sessions.
///
/// Status changes go through [`compare_and_set_status`](Self::compare_and_set_status),
/// the only ordering primitive: it succeeds only when the stored status
/// still equals the expected one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new `active` session.
    ///
    /// Fails with `Conflict` if a live session exists for the same
    /// (account, provider) pair. The check and insert are atomic.
    async fn insert_session(&self, new: NewSession) -> Result<GameSession>;

    /// Get a session by ID.
    async fn session(&self, id: SessionId) -> Result<Option<GameSession>>;

    /// Atomically move `id` from `from` to `to`.
    ///
    /// Fails with `NotFound` if the row is gone and `StaleTransition` if its
    /// status is no longer `from`. Entering a terminal status stamps
    /// `ended_at = at`.
    async fn compare_and_set_status(
        &self,
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<GameSession>;

    /// Live sessions for an account, optionally narrowed to one provider.
    async fn live_sessions(
        &self,
        account: &AccountId,
        provider: Option<&ProviderId>,
    ) -> Result<Vec<GameSession>>;

    /// Set the close-requested flag on a live session.
    ///
    /// Returns the session as stored; terminal sessions are returned
    /// unchanged.
    async fn request_close(&self, id: SessionId) -> Result<GameSession>;

    /// Sessions in `status` whose last status change (for live) or end
    /// (for terminal) is before `cutoff`.
    async fn sessions_older_than(
        &self,
        status: SessionStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<GameSession>>;

    /// Delete terminal sessions whose `ended_at` is before `cutoff`.
    ///
    /// Never deletes live sessions. Returns the number deleted.
    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Storage for provider history pulls.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Last synced marker for (partner, provider).
    async fn cursor(
        &self,
        partner: &PartnerId,
        provider: &ProviderId,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Advance the marker.
    async fn save_cursor(
        &self,
        partner: &PartnerId,
        provider: &ProviderId,
        synced_until: DateTime<Utc>,
    ) -> Result<()>;

    /// Record settled bets, skipping ones already stored. Returns the
    /// number newly inserted.
    async fn record_settled(&self, bets: &[SettledBet]) -> Result<usize>;
}

/// Everything the engine needs from the persistent store.
pub trait Store: AccountStore + PartnerStore + SessionStore + SyncStore {}

impl<T> Store for T where T: AccountStore + PartnerStore + SessionStore + SyncStore {}
