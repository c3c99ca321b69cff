//! AEAD envelope shared by encrypted terminal content and the wrapped MEK.

use serde::{Deserialize, Serialize};

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// AES-256-GCM ciphertext with its nonce and tag, each base64-encoded.
///
/// The relay never inspects these fields; they travel inside `output.data`
/// or as the pairing `encryptedMek` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedContent {
    /// Format version, always [`ENVELOPE_VERSION`]
    pub v: u8,
    /// Base64 12-byte nonce
    pub nonce: String,
    /// Base64 ciphertext (same length as the plaintext)
    pub ciphertext: String,
    /// Base64 16-byte authentication tag
    pub tag: String,
}

/// The master encryption key wrapped under a password- or pairing-derived key.
pub type EncryptedMek = EncryptedContent;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_on_the_wire() {
        let envelope = EncryptedContent {
            v: ENVELOPE_VERSION,
            nonce: "AAAAAAAAAAAAAAAA".into(),
            ciphertext: "".into(),
            tag: "AAAAAAAAAAAAAAAAAAAAAA==".into(),
        };
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["v"], 1);
        assert!(value.get("nonce").is_some());
        assert!(value.get("ciphertext").is_some());
        assert!(value.get("tag").is_some());
    }
}
