//! Rate limiting for tether-relay.
//!
//! Clients are keyed by peer IP address:
//! - **connection limiter** for WebSocket upgrades (producer and viewer)
//! - **pairing limiter** for unauthenticated pairing registrations
//!
//! Both use the governor crate's keyed rate limiters backed by DashMap.

use crate::config::LimitsConfig;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Rate limiters for the relay server.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits WebSocket upgrades per IP.
    connection_limiter: Arc<KeyedLimiter<IpAddr>>,
    /// Limits pairing registrations per IP.
    pairing_limiter: Arc<KeyedLimiter<IpAddr>>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("connection_limiter", &"KeyedLimiter<IpAddr>")
            .field("pairing_limiter", &"KeyedLimiter<IpAddr>")
            .finish()
    }
}

/// Per-minute quota; zero is rejected by `Config::validate` and treated as one.
fn per_minute(value: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN))
}

impl RateLimits {
    /// Create rate limiters from configuration.
    pub fn new(config: &LimitsConfig) -> Self {
        Self {
            connection_limiter: Arc::new(RateLimiter::keyed(per_minute(
                config.connections_per_minute,
            ))),
            pairing_limiter: Arc::new(RateLimiter::keyed(per_minute(config.pairing_per_minute))),
        }
    }

    /// Check if a WebSocket upgrade from `ip` is allowed.
    pub fn check_connection(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        self.connection_limiter
            .check_key(&ip)
            .map_err(|_| RateLimitError::ConnectionLimitExceeded)
    }

    /// Check if a pairing registration from `ip` is allowed.
    pub fn check_pairing(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        self.pairing_limiter
            .check_key(&ip)
            .map_err(|_| RateLimitError::PairingLimitExceeded)
    }

    /// Number of tracked connection keys (for metrics).
    pub fn connection_keys_count(&self) -> usize {
        self.connection_limiter.len()
    }

    /// Number of tracked pairing keys (for metrics).
    pub fn pairing_keys_count(&self) -> usize {
        self.pairing_limiter.len()
    }

    /// Evict keys whose quota has fully recharged. Called from the cleanup task.
    pub fn shrink(&self) {
        self.connection_limiter.retain_recent();
        self.connection_limiter.shrink_to_fit();
        self.pairing_limiter.retain_recent();
        self.pairing_limiter.shrink_to_fit();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Too many WebSocket upgrades from this address.
    #[error("connection rate limit exceeded")]
    ConnectionLimitExceeded,
    /// Too many pairing registrations from this address.
    #[error("pairing rate limit exceeded")]
    PairingLimitExceeded,
}
