//! Provider API wire types.
//!
//! Balance response:
//! ```json
//! {"username":"alice","balance":"950.00"}
//! ```
//!
//! History response:
//! ```json
//! {"bets":[{"id":"b-1","username":"alice","stake":"5","payout":"9","settled_at":"2026-10-01T12:00:00Z"}]}
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{ProviderId, SettledBet};

#[derive(Debug, Deserialize)]
pub struct BalanceResponse {
    #[serde(default)]
    pub username: Option<String>,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub bets: Vec<SettledBetDto>,
}

#[derive(Debug, Deserialize)]
pub struct SettledBetDto {
    pub id: String,
    pub username: String,
    pub stake: Decimal,
    pub payout: Decimal,
    pub settled_at: DateTime<Utc>,
}

impl SettledBetDto {
    /// Convert to a domain bet owned by `provider`.
    #[must_use]
    pub fn into_domain(self, provider: &ProviderId) -> SettledBet {
        SettledBet {
            provider_id: provider.clone(),
            external_id: self.id,
            username: self.username,
            stake: self.stake,
            payout: self.payout,
            settled_at: self.settled_at,
        }
    }
}

/// Error body some providers return with a 2xx status.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balance_accepts_string_and_number() {
        let s: BalanceResponse = serde_json::from_str(r#"{"balance":"950.50"}"#).unwrap();
        let n: BalanceResponse = serde_json::from_str(r#"{"balance":950.5}"#).unwrap();
        assert_eq!(s.balance, dec!(950.50));
        assert_eq!(n.balance, dec!(950.5));
    }

    #[test]
    fn history_maps_to_domain_bets() {
        let raw = r#"{"bets":[{"id":"b-1","username":"alice","stake":"5","payout":"9","settled_at":"2026-10-01T12:00:00Z"}]}"#;
        let resp: HistoryResponse = serde_json::from_str(raw).unwrap();
        let bet = resp
            .bets
            .into_iter()
            .next()
            .unwrap()
            .into_domain(&ProviderId::new("evolution"));
        assert_eq!(bet.external_id, "b-1");
        assert_eq!(bet.net(), dec!(4));
    }

    #[test]
    fn missing_bets_defaults_to_empty() {
        let resp: HistoryResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.bets.is_empty());
    }
}
