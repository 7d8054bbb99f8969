//! Settled provider-side bets pulled by the sync scheduler.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{PartnerId, ProviderId};

/// One settled bet or transaction as reported by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledBet {
    pub provider_id: ProviderId,
    /// Provider's own id; unique per provider.
    pub external_id: String,
    pub username: String,
    pub stake: Decimal,
    pub payout: Decimal,
    pub settled_at: DateTime<Utc>,
}

impl SettledBet {
    /// Net result for the player.
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.payout - self.stake
    }
}

/// Last-synced marker for one (partner, provider) pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub partner_id: PartnerId,
    pub provider_id: ProviderId,
    pub synced_until: DateTime<Utc>,
}

/// Newest settlement time in a batch, if any.
#[must_use]
pub fn latest_settlement(bets: &[SettledBet]) -> Option<DateTime<Utc>> {
    bets.iter().map(|b| b.settled_at).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bet(id: &str, minutes_ago: i64) -> SettledBet {
        SettledBet {
            provider_id: ProviderId::new("p"),
            external_id: id.into(),
            username: "alice".into(),
            stake: dec!(10),
            payout: dec!(25),
            settled_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn net_is_payout_minus_stake() {
        assert_eq!(bet("a", 0).net(), dec!(15));
    }

    #[test]
    fn latest_settlement_picks_newest() {
        let bets = vec![bet("a", 30), bet("b", 5), bet("c", 10)];
        assert_eq!(latest_settlement(&bets), Some(bets[1].settled_at));
        assert_eq!(latest_settlement(&[]), None);
    }
}
