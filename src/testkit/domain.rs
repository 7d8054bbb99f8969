//! Fixtures for accounts, partner chains and credentials.
//!
//! Partner chains are named `p1` (top level) down to `p{depth}`; the account
//! is referred by `p{depth}`, so a chain of depth `n` is `n` hops long.

use rust_decimal::Decimal;

use crate::domain::{Account, Partner, PartnerId, ProviderCredential, ProviderId};
use crate::error::Result;
use crate::port::Store;

/// Id of the top-level partner created by [`seed_chain`].
pub fn top_partner() -> PartnerId {
    PartnerId::new("p1")
}

/// A usable credential held by `partner` for `provider`.
pub fn credential(partner: &PartnerId, provider: &str) -> ProviderCredential {
    ProviderCredential {
        partner_id: partner.clone(),
        provider_id: ProviderId::new(provider),
        operation_code: format!("op-{provider}"),
        access_token: "token".into(),
        signing_secret: "secret".into(),
        enabled: true,
    }
}

/// Insert partners `p1..=p{depth}` and return the one that refers accounts.
pub async fn seed_chain(store: &dyn Store, depth: u8) -> Result<PartnerId> {
    store.put_partner(&Partner::top("p1")).await?;
    for level in 2..=depth {
        store
            .put_partner(&Partner::child(
                format!("p{level}"),
                format!("p{}", level - 1),
                level,
            ))
            .await?;
    }
    Ok(PartnerId::new(format!("p{}", depth.max(1))))
}

/// Seed a two-hop chain, a credential for each provider, and an online
/// account with `balance`.
pub async fn seed_player(
    store: &dyn Store,
    account_id: &str,
    balance: Decimal,
    providers: &[&str],
) -> Result<Account> {
    let referrer = seed_chain(store, 2).await?;
    for provider in providers {
        store.put_credential(&credential(&top_partner(), provider)).await?;
    }
    let account = Account::new(account_id, account_id)
        .with_balance(balance)
        .with_referrer(referrer)
        .online();
    store.put_account(&account).await?;
    Ok(account)
}
