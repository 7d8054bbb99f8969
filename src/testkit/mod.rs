//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`provider`] - [`ScriptedGateway`](provider::ScriptedGateway), a
//!   provider gateway with queued responses and call counters.
//! - [`notifier`] - [`RecordingNotifier`](notifier::RecordingNotifier) that
//!   keeps every event for assertions.
//! - [`domain`] - Fixtures for accounts, partner chains and credentials.
//! - [`config`] - Canonical fast test configurations.

pub mod config;
pub mod domain;
pub mod notifier;
pub mod provider;
