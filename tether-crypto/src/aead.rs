//! AES-256-GCM sealing into the shared [`EncryptedContent`] envelope.
//!
//! The AEAD primitive emits `ciphertext || tag`; the envelope carries the two
//! halves base64-encoded separately, so opening re-joins them after checking
//! every length.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tether_types::{EncryptedContent, ENVELOPE_VERSION};

use crate::error::{fill_random, CryptoError, CryptoResult};

/// AES-256 key size (256 bits).
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size (96 bits).
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size (128 bits).
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub(crate) fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> CryptoResult<EncryptedContent> {
    let mut nonce = [0u8; NONCE_SIZE];
    fill_random(&mut nonce)?;

    let cipher = Aes256Gcm::new(key.into());
    let mut sealed = cipher
        .encrypt((&nonce).into(), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed("AES-256-GCM failed".into()))?;

    let tag = sealed.split_off(sealed.len() - TAG_SIZE);

    Ok(EncryptedContent {
        v: ENVELOPE_VERSION,
        nonce: STANDARD.encode(nonce),
        ciphertext: STANDARD.encode(&sealed),
        tag: STANDARD.encode(tag),
    })
}

/// Decrypt an envelope under `key`.
///
/// Version, nonce length and tag length are checked before the AEAD call.
pub(crate) fn open(key: &[u8; KEY_SIZE], envelope: &EncryptedContent) -> CryptoResult<Vec<u8>> {
    if envelope.v != ENVELOPE_VERSION {
        return Err(CryptoError::UnsupportedVersion(envelope.v));
    }

    let nonce = decode_field("nonce", &envelope.nonce)?;
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_SIZE,
            actual: nonce.len(),
        });
    }

    let tag = decode_field("tag", &envelope.tag)?;
    if tag.len() != TAG_SIZE {
        return Err(CryptoError::InvalidTagLength {
            expected: TAG_SIZE,
            actual: tag.len(),
        });
    }

    let mut sealed = decode_field("ciphertext", &envelope.ciphertext)?;
    sealed.extend_from_slice(&tag);

    let nonce: [u8; NONCE_SIZE] = nonce
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt((&nonce).into(), sealed.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn decode_field(name: &str, value: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::InvalidEncoding(format!("{name}: {e}")))
}
