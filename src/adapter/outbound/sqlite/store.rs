//! SQLite store implementation.
//!
//! Provides persistent storage for accounts, partners, sessions, and sync
//! state using SQLite and Diesel ORM. Committed mutations are published on
//! an in-process [`FeedHub`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::BigInt;
use diesel::SqliteConnection;
use rust_decimal::Decimal;

use super::database::connection::DbPool;
use super::database::model::{
    format_time, parse_time, AccountRow, CredentialRow, NewSessionRow, PartnerRow, SessionRow,
    SettledBetRow, SyncCursorRow,
};
use super::database::schema::{
    accounts, game_sessions, partners, provider_credentials, settled_bets, sync_cursors,
};
use crate::adapter::outbound::hub::FeedHub;
use crate::domain::{
    Account, AccountId, DomainError, GameSession, NewSession, Partner, PartnerId,
    ProviderCredential, ProviderId, SessionId, SessionStatus, SettledBet,
};
use crate::error::{Error, Result};
use crate::port::{
    AccountStore, Change, ChangeFeed, FeedFilter, FeedSubscription, PartnerStore, SessionStore,
    SyncStore,
};

type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;

const LIVE_STATUSES: [&str; 2] = ["active", "ending"];
const TERMINAL_STATUSES: [&str; 2] = ["ended", "force_ended"];

fn db_err(e: DieselError) -> Error {
    Error::Database(e.to_string())
}

/// Outcome of the guarded insert transaction.
enum InsertOutcome {
    Inserted(SessionRow),
    Conflict(i64),
}

/// Outcome of the guarded status update transaction.
enum CasOutcome {
    Updated { old: SessionRow, new: SessionRow },
    Missing,
    Stale(String),
}

/// SQLite-backed implementation of every store port.
pub struct SqliteStore {
    /// Database connection pool.
    pool: DbPool,
    hub: FeedHub,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection pool.
    #[must_use]
    pub fn new(pool: DbPool, hub: FeedHub) -> Self {
        Self { pool, hub }
    }

    /// The change feed this store publishes to.
    #[must_use]
    pub fn hub(&self) -> &FeedHub {
        &self.hub
    }

    fn conn(&self) -> Result<Conn> {
        self.pool
            .get()
            .map_err(|e| Error::Connection(e.to_string()))
    }

    fn load_account(conn: &mut SqliteConnection, id: &AccountId) -> Result<Option<Account>> {
        let row: Option<AccountRow> = accounts::table
            .find(id.as_str())
            .select(AccountRow::as_select())
            .first(conn)
            .optional()
            .map_err(db_err)?;
        row.map(Account::try_from).transpose()
    }

    fn load_session(conn: &mut SqliteConnection, id: i64) -> Result<Option<GameSession>> {
        let row: Option<SessionRow> = game_sessions::table
            .find(id)
            .select(SessionRow::as_select())
            .first(conn)
            .optional()
            .map_err(db_err)?;
        row.map(GameSession::try_from).transpose()
    }

    fn update_account<F>(&self, id: &AccountId, apply: F) -> Result<Account>
    where
        F: FnOnce(&mut Account),
    {
        let mut conn = self.conn()?;
        let (old, new) = conn
            .immediate_transaction(|conn| {
                let old = Self::load_account(conn, id)?
                    .ok_or_else(|| DomainError::account_not_found(id))?;
                let mut new = old.clone();
                apply(&mut new);
                let row = AccountRow::from(&new);
                diesel::update(accounts::table.find(id.as_str()))
                    .set((
                        accounts::balance.eq(&row.balance),
                        accounts::online.eq(row.online),
                    ))
                    .execute(conn)
                    .map_err(db_err)?;
                Ok::<_, Error>((old, new))
            })?;
        self.hub.publish(Change::Account {
            old: Some(old),
            new: new.clone(),
        });
        Ok(new)
    }
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn put_account(&self, account: &Account) -> Result<()> {
        let mut conn = self.conn()?;
        let old = Self::load_account(&mut conn, &account.id)?;
        diesel::replace_into(accounts::table)
            .values(&AccountRow::from(account))
            .execute(&mut conn)
            .map_err(db_err)?;
        self.hub.publish(Change::Account {
            old,
            new: account.clone(),
        });
        Ok(())
    }

    async fn account(&self, id: &AccountId) -> Result<Option<Account>> {
        let mut conn = self.conn()?;
        Self::load_account(&mut conn, id)
    }

    async fn set_balance(&self, id: &AccountId, balance: Decimal) -> Result<Account> {
        self.update_account(id, |account| account.balance = balance)
    }

    async fn set_online(&self, id: &AccountId, online: bool) -> Result<Account> {
        self.update_account(id, |account| account.online = online)
    }
}

#[async_trait]
impl PartnerStore for SqliteStore {
    async fn put_partner(&self, partner: &Partner) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::replace_into(partners::table)
            .values(&PartnerRow::from(partner))
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn partner(&self, id: &PartnerId) -> Result<Option<Partner>> {
        let mut conn = self.conn()?;
        let row: Option<PartnerRow> = partners::table
            .find(id.as_str())
            .select(PartnerRow::as_select())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(Partner::try_from).transpose()
    }

    async fn put_credential(&self, credential: &ProviderCredential) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::replace_into(provider_credentials::table)
            .values(&CredentialRow::from(credential))
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn credential(
        &self,
        partner: &PartnerId,
        provider: &ProviderId,
    ) -> Result<Option<ProviderCredential>> {
        let mut conn = self.conn()?;
        let row: Option<CredentialRow> = provider_credentials::table
            .find((partner.as_str(), provider.as_str()))
            .select(CredentialRow::as_select())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        Ok(row.map(ProviderCredential::from))
    }

    async fn credentials(&self, partner: &PartnerId) -> Result<Vec<ProviderCredential>> {
        let mut conn = self.conn()?;
        let rows: Vec<CredentialRow> = provider_credentials::table
            .filter(provider_credentials::partner_id.eq(partner.as_str()))
            .order(provider_credentials::provider_id.asc())
            .select(CredentialRow::as_select())
            .load(&mut conn)
            .map_err(db_err)?;
        Ok(rows.into_iter().map(ProviderCredential::from).collect())
    }
}

/// Id of the live session on the row's (account, provider) pair.
fn live_session_id(conn: &mut SqliteConnection, row: &NewSessionRow) -> QueryResult<Option<i64>> {
    game_sessions::table
        .filter(game_sessions::account_id.eq(&row.account_id))
        .filter(game_sessions::provider_id.eq(&row.provider_id))
        .filter(game_sessions::status.eq_any(LIVE_STATUSES))
        .select(game_sessions::id)
        .first(conn)
        .optional()
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn insert_session(&self, new: NewSession) -> Result<GameSession> {
        let mut conn = self.conn()?;
        let row = NewSessionRow::from(&new);

        let outcome = conn.immediate_transaction(|conn| {
            if let Some(id) = live_session_id(conn, &row)? {
                return Ok::<_, DieselError>(InsertOutcome::Conflict(id));
            }

            diesel::insert_into(game_sessions::table)
                .values(&row)
                .execute(conn)?;
            let id: i64 = diesel::select(sql::<BigInt>("last_insert_rowid()")).get_result(conn)?;
            let inserted = game_sessions::table
                .find(id)
                .select(SessionRow::as_select())
                .first(conn)?;
            Ok(InsertOutcome::Inserted(inserted))
        });

        let conflict = |existing: i64| -> Error {
            DomainError::Conflict {
                account: new.account_id.clone(),
                provider: new.provider_id.clone(),
                existing: SessionId::new(existing),
            }
            .into()
        };

        let session = match outcome {
            Ok(InsertOutcome::Inserted(row)) => GameSession::try_from(row)?,
            Ok(InsertOutcome::Conflict(existing)) => return Err(conflict(existing)),
            // Another process won the race; the partial unique index caught it.
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)) => {
                return match live_session_id(&mut conn, &row).map_err(db_err)? {
                    Some(existing) => Err(conflict(existing)),
                    None => Err(db_err(DieselError::DatabaseError(
                        DatabaseErrorKind::UniqueViolation,
                        info,
                    ))),
                };
            }
            Err(e) => return Err(db_err(e)),
        };

        self.hub.publish(Change::Session {
            old: None,
            new: session.clone(),
        });
        Ok(session)
    }

    async fn session(&self, id: SessionId) -> Result<Option<GameSession>> {
        let mut conn = self.conn()?;
        Self::load_session(&mut conn, id.value())
    }

    async fn compare_and_set_status(
        &self,
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<GameSession> {
        let mut conn = self.conn()?;
        let ended_at = to.is_terminal().then(|| format_time(at));

        let outcome = conn
            .immediate_transaction(|conn| {
                let current: Option<SessionRow> = game_sessions::table
                    .find(id.value())
                    .select(SessionRow::as_select())
                    .first(conn)
                    .optional()?;
                let Some(old) = current else {
                    return Ok::<_, DieselError>(CasOutcome::Missing);
                };

                let updated = diesel::update(
                    game_sessions::table
                        .find(id.value())
                        .filter(game_sessions::status.eq(from.as_str())),
                )
                .set((
                    game_sessions::status.eq(to.as_str()),
                    game_sessions::updated_at.eq(format_time(at)),
                    game_sessions::ended_at.eq(&ended_at),
                ))
                .execute(conn)?;
                if updated == 0 {
                    return Ok(CasOutcome::Stale(old.status));
                }

                let new = game_sessions::table
                    .find(id.value())
                    .select(SessionRow::as_select())
                    .first(conn)?;
                Ok(CasOutcome::Updated { old, new })
            })
            .map_err(db_err)?;

        match outcome {
            CasOutcome::Updated { old, new } => {
                let old = GameSession::try_from(old)?;
                let new = GameSession::try_from(new)?;
                self.hub.publish(Change::Session {
                    old: Some(old),
                    new: new.clone(),
                });
                Ok(new)
            }
            CasOutcome::Missing => Err(DomainError::session_not_found(id).into()),
            CasOutcome::Stale(actual) => {
                let actual = actual
                    .parse::<SessionStatus>()
                    .map_err(|e| Error::Parse(e.to_string()))?;
                Err(DomainError::StaleTransition {
                    session: id,
                    expected: from,
                    actual: Some(actual),
                }
                .into())
            }
        }
    }

    async fn live_sessions(
        &self,
        account: &AccountId,
        provider: Option<&ProviderId>,
    ) -> Result<Vec<GameSession>> {
        let mut conn = self.conn()?;
        let mut query = game_sessions::table
            .filter(game_sessions::account_id.eq(account.as_str()))
            .filter(game_sessions::status.eq_any(LIVE_STATUSES))
            .select(SessionRow::as_select())
            .into_boxed();
        if let Some(provider) = provider {
            query = query.filter(game_sessions::provider_id.eq(provider.as_str().to_string()));
        }
        let rows: Vec<SessionRow> = query.load(&mut conn).map_err(db_err)?;
        rows.into_iter().map(GameSession::try_from).collect()
    }

    async fn request_close(&self, id: SessionId) -> Result<GameSession> {
        let mut conn = self.conn()?;
        let old = Self::load_session(&mut conn, id.value())?
            .ok_or_else(|| DomainError::session_not_found(id))?;
        if !old.is_live() || old.close_requested {
            return Ok(old);
        }

        let updated = diesel::update(
            game_sessions::table
                .find(id.value())
                .filter(game_sessions::status.eq_any(LIVE_STATUSES)),
        )
        .set(game_sessions::close_requested.eq(true))
        .execute(&mut conn)
        .map_err(db_err)?;

        let new = Self::load_session(&mut conn, id.value())?
            .ok_or_else(|| DomainError::session_not_found(id))?;
        if updated > 0 {
            self.hub.publish(Change::Session {
                old: Some(old),
                new: new.clone(),
            });
        }
        Ok(new)
    }

    async fn sessions_older_than(
        &self,
        status: SessionStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<GameSession>> {
        let mut conn = self.conn()?;
        let cutoff = format_time(cutoff);
        let query = game_sessions::table
            .filter(game_sessions::status.eq(status.as_str()))
            .select(SessionRow::as_select());
        let loaded = if status.is_terminal() {
            query
                .filter(game_sessions::ended_at.lt(&cutoff))
                .load::<SessionRow>(&mut conn)
        } else {
            query
                .filter(game_sessions::updated_at.lt(&cutoff))
                .load::<SessionRow>(&mut conn)
        };
        let rows = loaded.map_err(db_err)?;
        rows.into_iter().map(GameSession::try_from).collect()
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn()?;
        let cutoff = format_time(cutoff);

        let removed: Vec<SessionRow> = conn
            .immediate_transaction(|conn| {
                let expired = game_sessions::table
                    .filter(game_sessions::status.eq_any(TERMINAL_STATUSES))
                    .filter(game_sessions::ended_at.lt(&cutoff))
                    .select(SessionRow::as_select())
                    .load::<SessionRow>(conn)?;
                let ids: Vec<i64> = expired.iter().map(|r| r.id).collect();
                diesel::delete(
                    game_sessions::table
                        .filter(game_sessions::id.eq_any(&ids))
                        .filter(game_sessions::status.eq_any(TERMINAL_STATUSES)),
                )
                .execute(conn)?;
                Ok::<_, DieselError>(expired)
            })
            .map_err(db_err)?;

        let count = removed.len();
        for row in removed {
            self.hub.publish(Change::SessionDeleted {
                old: GameSession::try_from(row)?,
            });
        }
        Ok(count)
    }
}

#[async_trait]
impl SyncStore for SqliteStore {
    async fn cursor(
        &self,
        partner: &PartnerId,
        provider: &ProviderId,
    ) -> Result<Option<DateTime<Utc>>> {
        let mut conn = self.conn()?;
        let raw: Option<String> = sync_cursors::table
            .find((partner.as_str(), provider.as_str()))
            .select(sync_cursors::synced_until)
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        raw.as_deref().map(parse_time).transpose()
    }

    async fn save_cursor(
        &self,
        partner: &PartnerId,
        provider: &ProviderId,
        synced_until: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::replace_into(sync_cursors::table)
            .values(&SyncCursorRow {
                partner_id: partner.to_string(),
                provider_id: provider.to_string(),
                synced_until: format_time(synced_until),
            })
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn record_settled(&self, bets: &[SettledBet]) -> Result<usize> {
        if bets.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let rows: Vec<SettledBetRow> = bets.iter().map(SettledBetRow::from).collect();
        let mut inserted = 0;
        for row in &rows {
            inserted += diesel::insert_or_ignore_into(settled_bets::table)
                .values(row)
                .execute(&mut conn)
                .map_err(db_err)?;
        }
        Ok(inserted)
    }
}

impl ChangeFeed for SqliteStore {
    fn subscribe(&self, filter: FeedFilter) -> FeedSubscription {
        self.hub.subscribe(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::outbound::sqlite::database::connection::{create_pool, run_migrations};
    use rust_decimal_macros::dec;

    fn setup_store() -> SqliteStore {
        let pool = create_pool(":memory:").unwrap();
        run_migrations(&pool).unwrap();
        SqliteStore::new(pool, FeedHub::default())
    }

    fn new_session(account: &str, provider: &str) -> NewSession {
        NewSession {
            account_id: AccountId::new(account),
            provider_id: ProviderId::new(provider),
            balance_at_launch: dec!(1000),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unique_violation_resolves_the_live_session_id() {
        let store = setup_store();
        let first = store.insert_session(new_session("u1", "evo")).await.unwrap();

        let mut conn = store.conn().unwrap();
        let row = NewSessionRow::from(&new_session("u1", "evo"));
        let err = diesel::insert_into(game_sessions::table)
            .values(&row)
            .execute(&mut conn)
            .unwrap_err();
        assert!(matches!(
            err,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
        ));
        assert_eq!(
            live_session_id(&mut conn, &row).unwrap(),
            Some(first.id.value())
        );
    }

    #[tokio::test]
    async fn account_round_trip_and_balance_update() {
        let store = setup_store();
        let account = Account::new("u1", "alice")
            .with_balance(dec!(10.25))
            .with_referrer("agent");
        store.put_account(&account).await.unwrap();

        let updated = store
            .set_balance(&AccountId::new("u1"), dec!(950))
            .await
            .unwrap();
        assert_eq!(updated.balance, dec!(950));

        let loaded = store.account(&AccountId::new("u1")).await.unwrap().unwrap();
        assert_eq!(loaded.balance, dec!(950));
        assert_eq!(loaded.referrer_id, Some(PartnerId::new("agent")));
    }

    #[tokio::test]
    async fn set_balance_on_missing_account_is_not_found() {
        let store = setup_store();
        let err = store
            .set_balance(&AccountId::new("ghost"), dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn insert_session_enforces_single_live_session() {
        let store = setup_store();
        let first = store.insert_session(new_session("u", "p")).await.unwrap();
        assert_eq!(first.status, SessionStatus::Active);

        let err = store.insert_session(new_session("u", "p")).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Conflict { .. })));

        let now = Utc::now();
        store
            .compare_and_set_status(first.id, SessionStatus::Active, SessionStatus::Ending, now)
            .await
            .unwrap();
        store
            .compare_and_set_status(first.id, SessionStatus::Ending, SessionStatus::Ended, now)
            .await
            .unwrap();

        let second = store.insert_session(new_session("u", "p")).await.unwrap();
        assert_ne!(second.id, first.id);
    }

    #[tokio::test]
    async fn compare_and_set_distinguishes_stale_and_missing() {
        let store = setup_store();
        let s = store.insert_session(new_session("u", "p")).await.unwrap();
        let now = Utc::now();

        let ended = store
            .compare_and_set_status(s.id, SessionStatus::Active, SessionStatus::ForceEnded, now)
            .await
            .unwrap();
        assert!(ended.ended_at.is_some());

        let stale = store
            .compare_and_set_status(s.id, SessionStatus::Active, SessionStatus::Ending, now)
            .await
            .unwrap_err();
        assert!(matches!(
            stale.as_domain(),
            Some(DomainError::StaleTransition {
                actual: Some(SessionStatus::ForceEnded),
                ..
            })
        ));

        let missing = store
            .compare_and_set_status(
                SessionId::new(404),
                SessionStatus::Active,
                SessionStatus::Ending,
                now,
            )
            .await
            .unwrap_err();
        assert!(matches!(missing.as_domain(), Some(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn delete_terminal_before_spares_live_sessions() {
        let store = setup_store();
        let long_ago = Utc::now() - chrono::Duration::hours(3);
        let live = store.insert_session(new_session("u", "p")).await.unwrap();
        let done = store.insert_session(new_session("u", "q")).await.unwrap();
        store
            .compare_and_set_status(done.id, SessionStatus::Active, SessionStatus::Ending, long_ago)
            .await
            .unwrap();
        store
            .compare_and_set_status(done.id, SessionStatus::Ending, SessionStatus::Ended, long_ago)
            .await
            .unwrap();

        let deleted = store
            .delete_terminal_before(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(store.session(live.id).await.unwrap().is_some());
        assert!(store.session(done.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn credentials_and_cursors_persist() {
        let store = setup_store();
        let credential = ProviderCredential {
            partner_id: PartnerId::new("top"),
            provider_id: ProviderId::new("evolution"),
            operation_code: "op".into(),
            access_token: "tok".into(),
            signing_secret: "sec".into(),
            enabled: true,
        };
        store.put_credential(&credential).await.unwrap();
        let loaded = store
            .credential(&PartnerId::new("top"), &ProviderId::new("evolution"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, credential);
        assert_eq!(store.credentials(&PartnerId::new("top")).await.unwrap().len(), 1);

        let at = Utc::now();
        store
            .save_cursor(&PartnerId::new("top"), &ProviderId::new("evolution"), at)
            .await
            .unwrap();
        let cursor = store
            .cursor(&PartnerId::new("top"), &ProviderId::new("evolution"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.timestamp_micros(), at.timestamp_micros());
    }

    #[tokio::test]
    async fn record_settled_ignores_duplicates() {
        let store = setup_store();
        let bet = SettledBet {
            provider_id: ProviderId::new("p"),
            external_id: "x1".into(),
            username: "alice".into(),
            stake: dec!(5),
            payout: dec!(9),
            settled_at: Utc::now(),
        };
        assert_eq!(store.record_settled(&[bet.clone()]).await.unwrap(), 1);
        assert_eq!(store.record_settled(&[bet]).await.unwrap(), 0);
    }
}
