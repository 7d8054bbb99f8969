//! Balance reconciliation.
//!
//! - [`service`] - [`BalanceReconciler`]: display balance and session end.
//! - [`guard`] - process-local dedup of concurrent reconciliations.
//! - [`retry`] - backoff policy for provider calls.

pub mod guard;
pub mod retry;
pub mod service;

pub use guard::{ReconcilePermit, ReconciliationGuard};
pub use retry::RetryPolicy;
pub use service::{BalanceReconciler, EndOutcome};
