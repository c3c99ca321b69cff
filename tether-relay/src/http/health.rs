//! `GET /health`: liveness plus a storage probe.
//!
//! Reports `degraded` (still 200) when the session store cannot be read,
//! since sockets keep relaying without it.

use crate::server::TetherRelay;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

static STARTED: OnceLock<Instant> = OnceLock::new();

/// Record process start for `uptime_seconds`. Later calls are no-ops.
pub fn init_start_time() {
    STARTED.get_or_init(Instant::now);
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// `ok` or `degraded`.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Open WebSocket connections.
    pub connections: u64,
    /// Sessions with a running actor.
    pub sessions: usize,
    /// Session records in storage, absent when the probe failed.
    pub stored_sessions: Option<u64>,
    /// Open pairing requests.
    pub pairings: usize,
    /// Seconds since [`init_start_time`].
    pub uptime_seconds: u64,
}

/// Health check handler.
pub async fn health_handler(Extension(relay): Extension<Arc<TetherRelay>>) -> Json<HealthStatus> {
    let stored_sessions = match relay.store().count_sessions().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "health probe could not read session store");
            None
        }
    };

    Json(HealthStatus {
        status: if stored_sessions.is_some() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        connections: relay.metrics().connections_active.load(Ordering::Relaxed),
        sessions: relay.hub().len(),
        stored_sessions,
        pairings: relay.pairing().len(),
        uptime_seconds: STARTED.get().map_or(0, |start| start.elapsed().as_secs()),
    })
}
