//! Error types for tether-relay.

use std::path::PathBuf;

/// Main error type for tether-relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Pairing error.
    #[error("pairing error: {0}")]
    Pairing(#[from] PairingError),

    /// The session actor could not accept the connection.
    #[error("session {session_id} is unavailable")]
    SessionUnavailable {
        /// The session that refused the connection.
        session_id: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be turned back into a session.
    #[error("corrupt session row {session_id}: {reason}")]
    Corrupt {
        /// The session id of the row.
        session_id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Pairing mediator errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingError {
    /// No pairing with this code.
    #[error("pairing code not found")]
    NotFound,

    /// The pairing outlived its TTL.
    #[error("pairing code expired")]
    Expired,

    /// The pairing was already approved.
    #[error("pairing already completed")]
    AlreadyCompleted,

    /// The request body is unusable.
    #[error("invalid pairing request: {reason}")]
    InvalidRequest {
        /// Why it was rejected.
        reason: String,
    },
}

impl PairingError {
    /// Shorthand for [`PairingError::InvalidRequest`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for pairing operations.
pub type PairingResult<T> = std::result::Result<T, PairingError>;
