//! Error types for Tether wire types.

use thiserror::Error;

/// Errors that can occur while encoding, decoding or validating wire types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed (malformed frame or unknown type)
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Session identifier is not a valid ULID
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    /// Pairing code has the wrong length or alphabet
    #[error("invalid pairing code: {0}")]
    InvalidPairingCode(String),
}
