//! Game provider adapter.
//!
//! Signed HTTP access to provider balance and settled-history endpoints.

pub mod client;
pub mod dto;
pub mod settings;
pub mod signing;

pub use client::HttpProviderClient;
pub use settings::{ProviderConfig, ProviderHttpConfig};
