//! Game provider port.
//!
//! A provider holds the authoritative balance while a game is running.
//! Implementations perform the authenticated calls; they do not retry.
//! Retrying is the caller's policy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{ProviderCredential, ProviderId, SettledBet};
use crate::error::Result;

/// Authenticated access to external game providers.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Fetch the player's current balance held by `provider`.
    ///
    /// Transient network and provider-side failures map to
    /// [`DomainError::ProviderUnavailable`](crate::domain::DomainError::ProviderUnavailable);
    /// refusals that cannot succeed on retry map to
    /// [`DomainError::ProviderRejected`](crate::domain::DomainError::ProviderRejected).
    async fn fetch_balance(
        &self,
        provider: &ProviderId,
        credential: &ProviderCredential,
        username: &str,
    ) -> Result<Decimal>;

    /// Pull bets settled after `since` (all history when `None`).
    async fn pull_settled(
        &self,
        provider: &ProviderId,
        credential: &ProviderCredential,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SettledBet>>;
}
