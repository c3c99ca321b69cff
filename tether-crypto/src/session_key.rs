//! Per-session content keys.
//!
//! `session_key = HKDF-SHA256(MEK, info = "session-v1:" + session_id)`.
//! Every device holding the MEK derives the same key for a session without
//! asking anyone.

use tether_types::{EncryptedContent, SessionId};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::aead::{self, KEY_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf;
use crate::mek::MasterKey;

const SESSION_INFO_PREFIX: &str = "session-v1:";

/// Content key for one terminal session. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Derive the key for `session_id`. Pure and deterministic.
    pub fn derive(mek: &MasterKey, session_id: &SessionId) -> Self {
        let info = format!("{SESSION_INFO_PREFIX}{session_id}");
        Self(kdf::expand(mek.as_bytes(), info.as_bytes()))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encrypt a payload with a fresh nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<EncryptedContent> {
        aead::seal(&self.0, plaintext)
    }

    /// Decrypt a payload. Fails closed on any tampering.
    pub fn decrypt(&self, envelope: &EncryptedContent) -> CryptoResult<Vec<u8>> {
        aead::open(&self.0, envelope)
    }

    /// Encrypt terminal text.
    pub fn encrypt_text(&self, text: &str) -> CryptoResult<EncryptedContent> {
        self.encrypt(text.as_bytes())
    }

    /// Decrypt terminal text.
    pub fn decrypt_text(&self, envelope: &EncryptedContent) -> CryptoResult<String> {
        let bytes = self.decrypt(envelope)?;
        String::from_utf8(bytes).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}
