//! Database model types for Diesel ORM.
//!
//! Decimals are stored as TEXT to keep exact values; timestamps as
//! fixed-width RFC 3339 TEXT so lexical order matches time order.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;

use super::schema::{
    accounts, game_sessions, partners, provider_credentials, settled_bets, sync_cursors,
};
use crate::domain::{
    Account, AccountId, GameSession, NewSession, Partner, PartnerId, ProviderCredential,
    ProviderId, SessionId, SessionStatus, SettledBet,
};
use crate::error::{Error, Result};

/// Format a timestamp for storage.
#[must_use]
pub fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("timestamp '{raw}': {e}")))
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| Error::Parse(format!("decimal '{raw}': {e}")))
}

/// Database row for an account.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = accounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AccountRow {
    pub id: String,
    pub username: String,
    pub balance: String,
    pub points: String,
    pub online: bool,
    pub referrer_id: Option<String>,
}

impl From<&Account> for AccountRow {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            username: account.username.clone(),
            balance: account.balance.to_string(),
            points: account.points.to_string(),
            online: account.online,
            referrer_id: account.referrer_id.as_ref().map(ToString::to_string),
        }
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = Error;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Self {
            id: AccountId::from(row.id),
            username: row.username,
            balance: parse_decimal(&row.balance)?,
            points: parse_decimal(&row.points)?,
            online: row.online,
            referrer_id: row.referrer_id.map(PartnerId::from),
        })
    }
}

/// Database row for a partner.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = partners)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PartnerRow {
    pub id: String,
    pub parent_id: Option<String>,
    pub level: i32,
}

impl From<&Partner> for PartnerRow {
    fn from(partner: &Partner) -> Self {
        Self {
            id: partner.id.to_string(),
            parent_id: partner.parent_id.as_ref().map(ToString::to_string),
            level: i32::from(partner.level),
        }
    }
}

impl TryFrom<PartnerRow> for Partner {
    type Error = Error;

    fn try_from(row: PartnerRow) -> Result<Self> {
        let level = u8::try_from(row.level)
            .map_err(|_| Error::Parse(format!("partner level {} out of range", row.level)))?;
        Ok(Self {
            id: PartnerId::from(row.id),
            parent_id: row.parent_id.map(PartnerId::from),
            level,
        })
    }
}

/// Database row for a provider credential.
#[derive(Queryable, Selectable, Insertable, Clone)]
#[diesel(table_name = provider_credentials)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CredentialRow {
    pub partner_id: String,
    pub provider_id: String,
    pub operation_code: String,
    pub access_token: String,
    pub signing_secret: String,
    pub enabled: bool,
}

impl From<&ProviderCredential> for CredentialRow {
    fn from(c: &ProviderCredential) -> Self {
        Self {
            partner_id: c.partner_id.to_string(),
            provider_id: c.provider_id.to_string(),
            operation_code: c.operation_code.clone(),
            access_token: c.access_token.clone(),
            signing_secret: c.signing_secret.clone(),
            enabled: c.enabled,
        }
    }
}

impl From<CredentialRow> for ProviderCredential {
    fn from(row: CredentialRow) -> Self {
        Self {
            partner_id: PartnerId::from(row.partner_id),
            provider_id: ProviderId::from(row.provider_id),
            operation_code: row.operation_code,
            access_token: row.access_token,
            signing_secret: row.signing_secret,
            enabled: row.enabled,
        }
    }
}

/// Database row for a game session (queryable).
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = game_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SessionRow {
    pub id: i64,
    pub account_id: String,
    pub provider_id: String,
    pub status: String,
    pub balance_at_launch: String,
    pub created_at: String,
    pub updated_at: String,
    pub ended_at: Option<String>,
    pub close_requested: bool,
}

impl TryFrom<SessionRow> for GameSession {
    type Error = Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        let status = row
            .status
            .parse::<SessionStatus>()
            .map_err(|e| Error::Parse(e.to_string()))?;
        Ok(Self {
            id: SessionId::new(row.id),
            account_id: AccountId::from(row.account_id),
            provider_id: ProviderId::from(row.provider_id),
            status,
            balance_at_launch: parse_decimal(&row.balance_at_launch)?,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
            ended_at: row.ended_at.as_deref().map(parse_time).transpose()?,
            close_requested: row.close_requested,
        })
    }
}

/// Database row for a game session (insertable).
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = game_sessions)]
pub struct NewSessionRow {
    pub account_id: String,
    pub provider_id: String,
    pub status: String,
    pub balance_at_launch: String,
    pub created_at: String,
    pub updated_at: String,
    pub close_requested: bool,
}

impl From<&NewSession> for NewSessionRow {
    fn from(new: &NewSession) -> Self {
        Self {
            account_id: new.account_id.to_string(),
            provider_id: new.provider_id.to_string(),
            status: SessionStatus::Active.as_str().to_string(),
            balance_at_launch: new.balance_at_launch.to_string(),
            created_at: format_time(new.created_at),
            updated_at: format_time(new.created_at),
            close_requested: false,
        }
    }
}

/// Database row for a settled bet.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = settled_bets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SettledBetRow {
    pub provider_id: String,
    pub external_id: String,
    pub username: String,
    pub stake: String,
    pub payout: String,
    pub settled_at: String,
}

impl From<&SettledBet> for SettledBetRow {
    fn from(bet: &SettledBet) -> Self {
        Self {
            provider_id: bet.provider_id.to_string(),
            external_id: bet.external_id.clone(),
            username: bet.username.clone(),
            stake: bet.stake.to_string(),
            payout: bet.payout.to_string(),
            settled_at: format_time(bet.settled_at),
        }
    }
}

/// Database row for a sync cursor.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = sync_cursors)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncCursorRow {
    pub partner_id: String,
    pub provider_id: String,
    pub synced_until: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn time_format_is_fixed_width_and_round_trips() {
        let at = Utc::now();
        let raw = format_time(at);
        assert!(raw.ends_with('Z'));
        assert_eq!(raw.len(), "2026-01-01T00:00:00.000000Z".len());
        let back = parse_time(&raw).unwrap();
        assert_eq!(back.timestamp_micros(), at.timestamp_micros());
    }

    #[test]
    fn account_row_preserves_decimals() {
        let account = Account::new("u", "alice")
            .with_balance(dec!(1234.5678))
            .with_points(dec!(0.01))
            .with_referrer("agent");
        let row = AccountRow::from(&account);
        assert_eq!(row.balance, "1234.5678");
        let back = Account::try_from(row).unwrap();
        assert_eq!(back, account);
    }

    #[test]
    fn session_row_rejects_unknown_status() {
        let row = SessionRow {
            id: 1,
            account_id: "u".into(),
            provider_id: "p".into(),
            status: "paused".into(),
            balance_at_launch: "1".into(),
            created_at: format_time(Utc::now()),
            updated_at: format_time(Utc::now()),
            ended_at: None,
            close_requested: false,
        };
        assert!(matches!(GameSession::try_from(row), Err(Error::Parse(_))));
    }
}
