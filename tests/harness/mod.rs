//! Shared integration-test fixtures.

#![allow(dead_code)]

pub mod services;
pub mod temp_db;

pub use gamebridge::testkit::config::{fast_retry, short_debounce};
pub use gamebridge::testkit::domain::{credential, seed_chain, seed_player, top_partner};
pub use gamebridge::testkit::notifier::RecordingNotifier;
pub use gamebridge::testkit::provider::ScriptedGateway;
