//! Heartbeat liveness policy.
//!
//! Every `interval` the relay sweeps its connections: a peer whose last
//! `pong` is more than `timeout` old is closed, every other peer gets a
//! `ping`.

use std::time::{Duration, Instant};

/// Default sweep period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default silence after which a peer is considered dead.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(90);

/// Outcome of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Ping it again.
    Alive,
    /// Close it.
    TimedOut,
}

/// Heartbeat timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPolicy {
    /// Sweep period.
    pub interval: Duration,
    /// Maximum silence.
    pub timeout: Duration,
}

impl HeartbeatPolicy {
    /// Create a policy.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Check a peer whose last pong was at `last_pong_at`.
    pub fn assess(&self, last_pong_at: Instant, now: Instant) -> Liveness {
        if now.saturating_duration_since(last_pong_at) > self.timeout {
            Liveness::TimedOut
        } else {
            Liveness::Alive
        }
    }
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT)
    }
}
