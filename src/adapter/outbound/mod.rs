//! Outbound adapters (driven side).

pub mod hub;
pub mod memory;
pub mod notifier;
pub mod provider;
pub mod sqlite;

pub use hub::FeedHub;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
