//! Background cleanup task.
//!
//! Runs periodically to drop expired pairing records, forget idle rate
//! limiter keys and delete session records that stayed detached longer than
//! the storage retention.

use crate::server::TetherRelay;
use crate::session::unix_ms;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// What one cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Expired pairing records dropped.
    pub pairings: usize,
    /// Stale session records deleted.
    pub sessions: u64,
}

/// Run one cleanup pass.
pub async fn run_cleanup(relay: &TetherRelay) -> CleanupReport {
    let now = unix_ms();
    let pairings = relay.pairing().purge_expired(now);
    relay.rate_limits().shrink();

    let retention_ms = relay.config().storage.retention_secs.saturating_mul(1000);
    let cutoff = now.saturating_sub(retention_ms);
    let sessions = match relay.store().purge_detached_before(cutoff).await {
        Ok(deleted) => deleted,
        Err(e) => {
            tracing::error!("Cleanup error: {}", e);
            0
        }
    };

    CleanupReport { pairings, sessions }
}

/// Spawn a background cleanup task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_task(relay: Arc<TetherRelay>) -> tokio::task::JoinHandle<()> {
    let config = relay.config().cleanup.clone();
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Cleanup task disabled");
            return;
        }

        let interval_secs = config.interval_secs;
        tracing::info!("Cleanup task started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs));

        loop {
            timer.tick().await;

            let report = run_cleanup(&relay).await;
            if report == CleanupReport::default() {
                tracing::debug!("Cleanup: nothing expired");
            } else {
                tracing::info!(
                    "Cleanup: dropped {} pairings, deleted {} sessions",
                    report.pairings,
                    report.sessions
                );
            }
        }
    })
}
