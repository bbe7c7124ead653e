//! Wall-clock helpers.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in Unix milliseconds (0 if the clock is before the epoch).
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A per-sender clock whose readings never go backwards, even if the
/// system clock does.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the clock: `max(now, previous reading)`.
    pub fn now(&self) -> i64 {
        self.observe(now_millis())
    }

    /// Feed an externally observed time and return the clamped reading.
    pub fn observe(&self, at: i64) -> i64 {
        let previous = self.last.fetch_max(at, Ordering::SeqCst);
        previous.max(at)
    }
}
