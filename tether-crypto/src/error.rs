//! Error types for tether-crypto.

use thiserror::Error;

/// Errors from key derivation, envelope handling and pairing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Encryption operation failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authenticated decryption failed (wrong key or tampered envelope).
    /// No details provided to prevent oracle attacks.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Envelope version is not understood.
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    /// Decoded nonce has the wrong length.
    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Decoded tag has the wrong length.
    #[error("invalid tag length: expected {expected}, got {actual}")]
    InvalidTagLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Key material has the wrong length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// A field is not valid base64 / hex / UTF-8.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Peer public key is not a valid P-256 point.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// The OS random number generator failed.
    #[error("random number generation failed: {0}")]
    RandomFailed(String),
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Fill a buffer from the OS RNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> CryptoResult<()> {
    getrandom::getrandom(buf).map_err(|e| CryptoError::RandomFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_failure_reveals_nothing() {
        assert_eq!(CryptoError::DecryptionFailed.to_string(), "decryption failed");
    }

    #[test]
    fn length_errors_name_both_sides() {
        let err = CryptoError::InvalidNonceLength {
            expected: 12,
            actual: 8,
        };
        assert_eq!(err.to_string(), "invalid nonce length: expected 12, got 8");
    }
}
