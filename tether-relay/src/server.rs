//! Relay server state shared by every handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tether_types::ConnId;

use crate::auth::IdentityVerifier;
use crate::config::Config;
use crate::limits::RateLimits;
use crate::pairing::PairingMediator;
use crate::session::SessionHub;
use crate::storage::SessionStore;

/// Operational metrics for the relay server.
///
/// All counters are monotonically increasing (reset on restart) except
/// `connections_active`. Uses `Relaxed` ordering since exact cross-thread
/// consistency is not required for monitoring.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total WebSocket connections accepted.
    pub connections_total: AtomicU64,
    /// WebSocket connections currently open.
    pub connections_active: AtomicU64,
    /// Total text frames received from sockets.
    pub frames_received: AtomicU64,
    /// Total text frames queued for sockets.
    pub frames_sent: AtomicU64,
    /// Producers closed because a newer producer connected.
    pub evictions_total: AtomicU64,
    /// Sockets closed for missing heartbeats.
    pub heartbeat_timeouts: AtomicU64,
    /// Sockets dropped because they read too slowly.
    pub overloaded_closes: AtomicU64,
    /// Pairing requests opened.
    pub pairings_registered: AtomicU64,
    /// Pairing approvals collected by initiators.
    pub pairings_completed: AtomicU64,
    /// Total rate limit rejections (connection + pairing).
    pub rate_limit_hits: AtomicU64,
    /// Requests rejected for a missing or unknown bearer token.
    pub auth_failures: AtomicU64,
    /// Internal errors (storage writes, frame encoding).
    pub errors_total: AtomicU64,
}

impl RelayMetrics {
    /// Count a newly opened socket.
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a socket that went away.
    pub fn connection_closed(&self) {
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }
}

/// Main relay server.
pub struct TetherRelay {
    config: Config,
    store: Arc<dyn SessionStore>,
    verifier: Arc<dyn IdentityVerifier>,
    /// Running session actors.
    hub: SessionHub,
    /// Pending device pairings.
    pairing: PairingMediator,
    /// Rate limiters for upgrades and pairing registrations.
    rate_limits: RateLimits,
    /// Operational metrics (counters, gauges).
    metrics: Arc<RelayMetrics>,
    next_conn: AtomicU64,
}

impl std::fmt::Debug for TetherRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TetherRelay")
            .field("config", &self.config)
            .field("hub", &self.hub)
            .field("pairing", &self.pairing.len())
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl TetherRelay {
    /// Create a relay with the given config, session store and token verifier.
    pub fn new(
        config: Config,
        store: Arc<dyn SessionStore>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let metrics = Arc::new(RelayMetrics::default());
        let hub = SessionHub::new(
            store.clone(),
            metrics.clone(),
            config.session.relay_config(),
            config.session.command_buffer,
        );
        Self {
            pairing: PairingMediator::new(&config.pairing),
            rate_limits: RateLimits::new(&config.limits),
            config,
            store,
            verifier,
            hub,
            metrics,
            next_conn: AtomicU64::new(1),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the session store.
    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Get a clone of the store Arc for background tasks.
    pub fn store_arc(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    /// Get the bearer token verifier.
    pub fn verifier(&self) -> &dyn IdentityVerifier {
        self.verifier.as_ref()
    }

    /// Get the session actor directory.
    pub fn hub(&self) -> &SessionHub {
        &self.hub
    }

    /// Get the pairing mediator.
    pub fn pairing(&self) -> &PairingMediator {
        &self.pairing
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Allocate a connection id, unique for the life of the process.
    pub fn next_conn_id(&self) -> ConnId {
        ConnId::new(self.next_conn.fetch_add(1, Ordering::Relaxed))
    }
}
