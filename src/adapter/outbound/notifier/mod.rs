//! Notification adapters.
//!
//! Implements the `port::Notifier` trait for various notification backends.

pub mod log;

pub use log::LogNotifier;
