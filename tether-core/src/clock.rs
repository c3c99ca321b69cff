//! Time as seen by the relay.

use std::time::{Duration, Instant};

/// The moment an event is processed.
///
/// `at` drives liveness and queue ages; `unix_ms` stamps wire messages and
/// persisted records. The caller reads both clocks once per event so that a
/// single event sees one consistent time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Monotonic time.
    pub at: Instant,
    /// Wall-clock time in unix milliseconds.
    pub unix_ms: u64,
}

impl Tick {
    /// Create a tick from both clocks.
    pub fn new(at: Instant, unix_ms: u64) -> Self {
        Self { at, unix_ms }
    }

    /// The same tick moved forward by `elapsed`.
    pub fn advance(self, elapsed: Duration) -> Self {
        Self {
            at: self.at + elapsed,
            unix_ms: self.unix_ms + elapsed.as_millis() as u64,
        }
    }
}
