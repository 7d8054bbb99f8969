//! Partner credential resolution.
//!
//! Credentials for a provider are held by the top-level partner of the
//! account's referral chain. The walk is bounded; a chain that does not
//! reach the top within [`MAX_HOPS`] is treated as corrupt and never
//! defaulted.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{AccountId, DomainError, PartnerId, ProviderCredential, ProviderId};
use crate::error::Result;
use crate::port::Store;

/// Maximum pointer hops from an account to its top-level partner.
///
/// The account's referrer pointer is hop 1; each parent pointer is one more.
pub const MAX_HOPS: usize = 10;

/// Walks partner chains and hands out usable provider credentials.
pub struct PartnerCredentialResolver {
    store: Arc<dyn Store>,
}

impl PartnerCredentialResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Find the level-1 partner that owns `account_id`.
    ///
    /// # Errors
    /// [`DomainError::HierarchyBroken`] for a missing account referrer, a
    /// missing partner node, a cycle, or a chain longer than [`MAX_HOPS`].
    pub async fn resolve_top_level_partner(&self, account_id: &AccountId) -> Result<PartnerId> {
        let broken = |reason: String| -> crate::error::Error {
            warn!(account = %account_id, reason = %reason, "Partner hierarchy broken");
            DomainError::HierarchyBroken {
                account: account_id.clone(),
                reason,
            }
            .into()
        };

        let account = self
            .store
            .account(account_id)
            .await?
            .ok_or_else(|| broken("account not found".into()))?;
        let mut current = account
            .referrer_id
            .ok_or_else(|| broken("account has no referrer".into()))?;

        let mut seen = HashSet::new();
        let mut hops = 1;
        loop {
            if hops > MAX_HOPS {
                return Err(broken(format!("no top-level partner within {MAX_HOPS} hops")));
            }
            if !seen.insert(current.clone()) {
                return Err(broken(format!("cycle at partner {current}")));
            }
            let partner = self
                .store
                .partner(&current)
                .await?
                .ok_or_else(|| broken(format!("partner {current} not found")))?;
            if partner.is_top_level() {
                debug!(account = %account_id, partner = %partner.id, hops, "Resolved top-level partner");
                return Ok(partner.id);
            }
            match partner.parent_id {
                Some(parent) => current = parent,
                None => return Err(broken(format!("partner {current} has no parent"))),
            }
            hops += 1;
        }
    }

    /// Usable credential of `partner_id` for `provider_id`.
    ///
    /// # Errors
    /// [`DomainError::CredentialMissing`] when absent, disabled, or incomplete.
    pub async fn resolve_credential(
        &self,
        partner_id: &PartnerId,
        provider_id: &ProviderId,
    ) -> Result<ProviderCredential> {
        match self.store.credential(partner_id, provider_id).await? {
            Some(credential) if credential.is_usable() => Ok(credential),
            _ => Err(DomainError::CredentialMissing {
                partner: partner_id.clone(),
                provider: provider_id.clone(),
            }
            .into()),
        }
    }

    /// Credential for `provider_id` from the top of `account_id`'s chain.
    pub async fn resolve_for_account(
        &self,
        account_id: &AccountId,
        provider_id: &ProviderId,
    ) -> Result<ProviderCredential> {
        let partner = self.resolve_top_level_partner(account_id).await?;
        self.resolve_credential(&partner, provider_id).await
    }

    /// Providers for which `partner_id` holds a usable credential.
    pub async fn enabled_providers(&self, partner_id: &PartnerId) -> Result<Vec<ProviderId>> {
        let mut providers: Vec<ProviderId> = self
            .store
            .credentials(partner_id)
            .await?
            .into_iter()
            .filter(ProviderCredential::is_usable)
            .map(|c| c.provider_id)
            .collect();
        providers.sort();
        providers.dedup();
        Ok(providers)
    }
}
