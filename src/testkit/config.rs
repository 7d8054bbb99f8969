//! Canonical test configurations.

use std::time::Duration;

use crate::application::reconcile::RetryPolicy;

/// Retry policy with the default shape but millisecond delays.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay_ms: 1,
        multiplier: 2.0,
        max_delay_ms: 4,
    }
}

/// Debounce short enough for real-time tests.
pub fn short_debounce() -> Duration {
    Duration::from_millis(20)
}
