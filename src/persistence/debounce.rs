//! Trailing-edge debounce for draft writes

use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: chrono::Duration,
    last_change: Option<DateTime<Utc>>,
}

impl Debouncer {
    /// A zero delay makes every change due immediately.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay: chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero()),
            last_change: None,
        }
    }

    pub fn note_change(&mut self, now: DateTime<Utc>) {
        self.last_change = Some(now);
    }

    pub fn is_dirty(&self) -> bool {
        self.last_change.is_some()
    }

    /// Whether the quiet period after the last change has elapsed
    pub fn due(&self, now: DateTime<Utc>) -> bool {
        self.last_change
            .is_some_and(|changed| now - changed >= self.delay)
    }

    /// Mark the pending change as written
    pub fn clear(&mut self) {
        self.last_change = None;
    }
}
