//! Gamebridge - game session and balance reconciliation engine.
//!
//! While a player has a third-party game open, the provider holds the
//! authoritative balance. This crate keeps the platform ledger and the
//! provider consistent: it tracks game sessions through a guarded state
//! machine, decides which balance the player sees, and writes the provider's
//! balance back to the ledger exactly once when a session ends.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - [`domain`] - Sessions, accounts, the partner tree and the error taxonomy
//! - [`port`] - Store, change feed, provider gateway and notifier traits
//! - [`application`] - Session registry, reconciler, listener, sync scheduler,
//!   presence guard, reaper and window signal bus
//! - [`adapter`] - SQLite and in-memory stores, HTTP provider client,
//!   log notifier
//! - [`infrastructure`] - Configuration, logging and the composition root
//!
//! # Session lifecycle
//!
//! ```text
//! active ──► ending ──► ended
//!   │          │
//!   └──────────┴──────► force_ended
//! ```
//!
//! Every transition is a compare-and-set on the stored row, so at most one
//! end completes per session even across processes.
//!
//! # Example
//!
//! ```no_run
//! use gamebridge::infrastructure::config::settings::Config;
//! use gamebridge::infrastructure::{Components, Engine};
//!
//! # async fn run() -> gamebridge::error::Result<()> {
//! let config = Config::load("config.toml")?;
//! let engine = Engine::start(&config, Components::from_config(&config)?).await?;
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
