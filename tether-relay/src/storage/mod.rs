//! Storage layer for tether-relay.
//!
//! Persists the last known [`SessionInfo`] of every session so a relay
//! restart can still describe sessions to viewers. Nothing else (no terminal
//! output, no queued input) touches disk.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StorageError;
use async_trait::async_trait;
use tether_types::{SessionId, SessionInfo};

/// Trait for session metadata backends.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session record.
    async fn save_session(&self, info: &SessionInfo) -> Result<(), StorageError>;

    /// Fetch a session record.
    async fn load_session(&self, id: &SessionId) -> Result<Option<SessionInfo>, StorageError>;

    /// Number of stored sessions.
    async fn count_sessions(&self) -> Result<u64, StorageError>;

    /// Delete detached sessions last updated before `cutoff_ms`.
    ///
    /// Returns the number of records deleted.
    async fn purge_detached_before(&self, cutoff_ms: u64) -> Result<u64, StorageError>;
}
