//! Notifier that records events for assertions.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::port::{Event, Notifier, NotifierRegistry};

/// Records every event it receives. Clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding only a clone of this recorder.
    pub fn registry(&self) -> Arc<NotifierRegistry> {
        let mut registry = NotifierRegistry::new();
        registry.register(Box::new(self.clone()));
        Arc::new(registry)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Number of recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: Event) {
        self.events.lock().push(event);
    }
}
