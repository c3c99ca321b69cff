//! Prometheus metrics endpoint.

use crate::server::TetherRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<TetherRelay>>) -> impl IntoResponse {
    let m = relay.metrics();

    // Gauges
    let connections = m.connections_active.load(Ordering::Relaxed);
    let sessions = relay.hub().len();
    let pairings = relay.pairing().len();

    // Counters
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let frames_rx = m.frames_received.load(Ordering::Relaxed);
    let frames_tx = m.frames_sent.load(Ordering::Relaxed);
    let evictions = m.evictions_total.load(Ordering::Relaxed);
    let timeouts = m.heartbeat_timeouts.load(Ordering::Relaxed);
    let overloaded = m.overloaded_closes.load(Ordering::Relaxed);
    let registered = m.pairings_registered.load(Ordering::Relaxed);
    let completed = m.pairings_completed.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);
    let auth_failures = m.auth_failures.load(Ordering::Relaxed);
    let errors = m.errors_total.load(Ordering::Relaxed);

    // Best effort: a failing store reports zero rather than failing the scrape.
    let stored_sessions = relay.store().count_sessions().await.unwrap_or(0);

    let body = format!(
        r#"# HELP tether_relay_connections_active Number of open WebSocket connections
# TYPE tether_relay_connections_active gauge
tether_relay_connections_active {connections}

# HELP tether_relay_sessions_active Number of sessions with a running actor
# TYPE tether_relay_sessions_active gauge
tether_relay_sessions_active {sessions}

# HELP tether_relay_pairings_open Number of open pairing requests
# TYPE tether_relay_pairings_open gauge
tether_relay_pairings_open {pairings}

# HELP tether_relay_info Server information
# TYPE tether_relay_info gauge
tether_relay_info{{version="{version}"}} 1

# HELP tether_relay_connections_total Total WebSocket connections accepted
# TYPE tether_relay_connections_total counter
tether_relay_connections_total {conns_total}

# HELP tether_relay_frames_received_total Total text frames received
# TYPE tether_relay_frames_received_total counter
tether_relay_frames_received_total {frames_rx}

# HELP tether_relay_frames_sent_total Total text frames sent
# TYPE tether_relay_frames_sent_total counter
tether_relay_frames_sent_total {frames_tx}

# HELP tether_relay_evictions_total Producers replaced by a newer producer
# TYPE tether_relay_evictions_total counter
tether_relay_evictions_total {evictions}

# HELP tether_relay_heartbeat_timeouts_total Connections closed for missing heartbeats
# TYPE tether_relay_heartbeat_timeouts_total counter
tether_relay_heartbeat_timeouts_total {timeouts}

# HELP tether_relay_overloaded_closes_total Connections dropped for a full outbound buffer
# TYPE tether_relay_overloaded_closes_total counter
tether_relay_overloaded_closes_total {overloaded}

# HELP tether_relay_pairings_registered_total Pairing requests opened
# TYPE tether_relay_pairings_registered_total counter
tether_relay_pairings_registered_total {registered}

# HELP tether_relay_pairings_completed_total Pairing approvals collected
# TYPE tether_relay_pairings_completed_total counter
tether_relay_pairings_completed_total {completed}

# HELP tether_relay_rate_limit_hits_total Total rate limit rejections
# TYPE tether_relay_rate_limit_hits_total counter
tether_relay_rate_limit_hits_total {rate_limits}

# HELP tether_relay_auth_failures_total Requests with a missing or unknown token
# TYPE tether_relay_auth_failures_total counter
tether_relay_auth_failures_total {auth_failures}

# HELP tether_relay_errors_total Total internal errors
# TYPE tether_relay_errors_total counter
tether_relay_errors_total {errors}

# HELP tether_relay_storage_sessions Number of session records in the database
# TYPE tether_relay_storage_sessions gauge
tether_relay_storage_sessions {stored_sessions}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
