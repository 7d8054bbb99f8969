//! Outbound ports (driven side): interfaces implemented by outbound adapters.
//!
//! These contracts describe the hosted backend (store and change feed),
//! the game providers, and UI notifications.

pub mod feed;
pub mod notifier;
pub mod provider;
pub mod store;
