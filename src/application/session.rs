//! Session registry service.
//!
//! Owns the lifecycle of game-launch sessions. The store row is ground truth;
//! every status change goes through a compare-and-set so concurrent callers
//! cannot both win the same edge.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::{
    AccountId, DomainError, GameSession, NewSession, ProviderId, SessionId, SessionStatus,
};
use crate::error::Result;
use crate::port::Store;

/// Lifecycle operations over game sessions.
pub struct SessionRegistry {
    store: Arc<dyn Store>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Open a session in `active`.
    ///
    /// Fails with [`DomainError::Conflict`] when the pair already has a live
    /// session.
    pub async fn create_session(
        &self,
        account_id: &AccountId,
        provider_id: &ProviderId,
        balance_at_launch: Decimal,
    ) -> Result<GameSession> {
        let session = self
            .store
            .insert_session(NewSession {
                account_id: account_id.clone(),
                provider_id: provider_id.clone(),
                balance_at_launch,
                created_at: Utc::now(),
            })
            .await?;
        info!(
            session = %session.id,
            account = %account_id,
            provider = %provider_id,
            balance = %balance_at_launch,
            "Session created"
        );
        Ok(session)
    }

    /// Move `session_id` from `from` to `to`.
    ///
    /// Edges the state machine forbids are rejected as
    /// [`DomainError::StaleTransition`] without a store round trip.
    pub async fn transition(
        &self,
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<GameSession> {
        if !from.can_transition_to(to) {
            return Err(DomainError::StaleTransition {
                session: session_id,
                expected: from,
                actual: None,
            }
            .into());
        }
        let session = self
            .store
            .compare_and_set_status(session_id, from, to, Utc::now())
            .await?;
        debug!(session = %session_id, from = %from, to = %to, "Session transitioned");
        Ok(session)
    }

    pub async fn get(&self, session_id: SessionId) -> Result<GameSession> {
        self.store
            .session(session_id)
            .await?
            .ok_or_else(|| DomainError::session_not_found(session_id).into())
    }

    /// Live sessions of one account on one provider.
    pub async fn list_active_or_ending(
        &self,
        account_id: &AccountId,
        provider_id: &ProviderId,
    ) -> Result<Vec<GameSession>> {
        let mut sessions = self
            .store
            .live_sessions(account_id, Some(provider_id))
            .await?;
        newest_first(&mut sessions);
        Ok(sessions)
    }

    /// Live sessions of one account across all providers, newest first.
    pub async fn list_live_for_account(&self, account_id: &AccountId) -> Result<Vec<GameSession>> {
        let mut sessions = self.store.live_sessions(account_id, None).await?;
        newest_first(&mut sessions);
        Ok(sessions)
    }

    /// Flag a live session so every client closes its game window.
    ///
    /// Terminal sessions are returned unchanged.
    pub async fn request_close(&self, session_id: SessionId) -> Result<GameSession> {
        let session = self.store.request_close(session_id).await?;
        if session.is_live() {
            info!(session = %session_id, "Close requested");
        }
        Ok(session)
    }
}

fn newest_first(sessions: &mut [GameSession]) {
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
