//! SQLite persistence adapters.
//!
//! Provides the SQLite-backed store for accounts, partners, sessions and
//! provider sync state using Diesel ORM.

pub mod database;
pub mod store;

pub use store::SqliteStore;
