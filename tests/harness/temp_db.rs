use std::sync::Arc;

use diesel::prelude::*;
use gamebridge::adapter::outbound::sqlite::database::connection::{
    create_pool, run_migrations, DbPool,
};
use gamebridge::adapter::outbound::{FeedHub, SqliteStore};
use gamebridge::port::Store;
use tempfile::TempDir;

/// SQLite database in a temporary directory, removed on drop.
pub struct TempDb {
    _dir: TempDir,
    pool: DbPool,
    store: Arc<SqliteStore>,
}

impl TempDb {
    pub fn create(name: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp directory");
        let path = dir.path().join(format!("gamebridge-{name}.db"));

        let pool = create_pool(&path.display().to_string()).expect("create sqlite pool");
        run_migrations(&pool).expect("run migrations");

        // WAL mode improves concurrent writer behavior in tests.
        {
            let mut conn = pool.get().expect("get sqlite connection");
            diesel::sql_query("PRAGMA journal_mode=WAL")
                .execute(&mut conn)
                .expect("enable WAL mode");
        }

        let store = Arc::new(SqliteStore::new(pool.clone(), FeedHub::default()));
        Self {
            _dir: dir,
            pool,
            store,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn store(&self) -> Arc<SqliteStore> {
        Arc::clone(&self.store)
    }

    pub fn dyn_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }
}
