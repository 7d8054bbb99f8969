//! In-process change feed shared by the store adapters.
//!
//! Stores publish every committed mutation here; subscribers get a
//! filtered broadcast receiver.

use tokio::sync::broadcast;
use tracing::trace;

use crate::port::{Change, ChangeFeed, FeedFilter, FeedSubscription};

/// Default number of changes buffered per subscriber.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Broadcast hub for row-level changes.
#[derive(Debug, Clone)]
pub struct FeedHub {
    tx: broadcast::Sender<Change>,
}

impl FeedHub {
    /// Create a hub buffering up to `capacity` changes per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a change. Having no subscribers is not an error.
    pub fn publish(&self, change: Change) {
        let table = change.table();
        if self.tx.send(change).is_err() {
            trace!(?table, "Change published with no subscribers");
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FeedHub {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed for FeedHub {
    fn subscribe(&self, filter: FeedFilter) -> FeedSubscription {
        FeedSubscription::new(filter, self.tx.subscribe())
    }
}
