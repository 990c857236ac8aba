use std::collections::VecDeque;
use tracing::debug;

/// Default number of event identifiers retained for duplicate suppression.
pub const RECENT_WINDOW_CAPACITY: usize = 10;

/// Bounded, insertion-ordered window of recently seen event identifiers.
///
/// Eviction is size-bounded, not time-bounded: once the window holds
/// `capacity` identifiers the oldest is dropped to admit a new one, so an
/// identifier that reappears after enough distinct events is treated as new
/// again. The window lives only in memory and is reset on restart.
///
/// `accept` is a check-then-insert and is NOT safe for concurrent callers on
/// the same identifier. Callers must invoke it from a single ordered event
/// stream; the router owns one instance inside its processing loop.
#[derive(Debug)]
pub struct RecentEventWindow {
    ids: VecDeque<String>,
    capacity: usize,
}

impl RecentEventWindow {
    pub fn new() -> Self {
        Self::with_capacity(RECENT_WINDOW_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns true if the identifier has not been seen recently, recording
    /// it as seen. Returns false for a duplicate, with no side effect.
    pub fn accept(&mut self, id: &str) -> bool {
        if self.ids.iter().any(|seen| seen == id) {
            debug!(event_id = %id, "duplicate event id ignored");
            return false;
        }
        if self.ids.len() == self.capacity {
            self.ids.pop_front();
        }
        self.ids.push_back(id.to_owned());
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for RecentEventWindow {
    fn default() -> Self {
        Self::new()
    }
}
