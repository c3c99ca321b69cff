//! In-process session store.
//!
//! Keeps records in a map guarded by a mutex. Used by tests and by
//! deployments that do not need metadata to survive a restart.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tether_types::{SessionId, SessionInfo, SessionStatus};

use super::SessionStore;
use crate::error::StorageError;

/// Volatile [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<SessionId, SessionInfo>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, SessionInfo>> {
        // A poisoned map is still a consistent map: every write is a single insert or remove.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save_session(&self, info: &SessionInfo) -> Result<(), StorageError> {
        self.lock().insert(info.id.clone(), info.clone());
        Ok(())
    }

    async fn load_session(&self, id: &SessionId) -> Result<Option<SessionInfo>, StorageError> {
        Ok(self.lock().get(id).cloned())
    }

    async fn count_sessions(&self) -> Result<u64, StorageError> {
        Ok(self.lock().len() as u64)
    }

    async fn purge_detached_before(&self, cutoff_ms: u64) -> Result<u64, StorageError> {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, info| {
            info.status == SessionStatus::Attached || info.updated_at >= cutoff_ms
        });
        Ok((before - sessions.len()) as u64)
    }
}
