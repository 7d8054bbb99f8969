//! Infrastructure layer.
//!
//! Provides technical concerns that support the application without
//! containing business logic: configuration loading, logging setup, and
//! the composition root that wires adapters into services.
//!
//! # Submodules
//!
//! - [`bootstrap`] - Composition root and background task lifecycle
//! - [`config`] - Configuration loading and validation

pub mod bootstrap;
pub mod config;

pub use bootstrap::{run_with_shutdown, Components, Engine};
