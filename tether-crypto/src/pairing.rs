//! Device pairing over an untrusted mediator.
//!
//! Protocol:
//! 1. The new device creates a [`PairingInitiator`] and registers its public
//!    key with the relay, receiving a pairing code.
//! 2. A trusted device fetches that key over an authenticated channel and
//!    calls [`approve_pairing`], which runs ECDH with a fresh ephemeral key,
//!    derives `pairing_key = HKDF-SHA256(shared, "pairing-v1")` and wraps the
//!    MEK under it.
//! 3. The new device polls, then [`PairingInitiator::complete`] derives the
//!    same key from its own secret and unwraps the MEK.
//!
//! The relay only ever holds the two public keys and the wrapped MEK.
//! Public keys travel as base64 uncompressed SEC1 points (65 bytes).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use rand::rngs::OsRng;
use tether_types::EncryptedMek;
use zeroize::Zeroizing;

use crate::aead::KEY_SIZE;
use crate::error::{CryptoError, CryptoResult};
use crate::kdf;
use crate::mek::MasterKey;

const PAIRING_INFO: &[u8] = b"pairing-v1";

/// The joining device's side of a pairing.
///
/// Holds the ephemeral secret until the approval arrives; consumed by
/// [`complete`](Self::complete) so the secret is used exactly once.
pub struct PairingInitiator {
    secret: EphemeralSecret,
    public_key: String,
}

impl PairingInitiator {
    /// Generate a fresh ephemeral keypair.
    pub fn new() -> Self {
        let secret = EphemeralSecret::random(&mut OsRng);
        let public_key = encode_public_key(&secret.public_key());
        Self { secret, public_key }
    }

    /// Base64 public key to register with the relay.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Recover the MEK from the approver's reply.
    pub fn complete(
        self,
        approver_public_key: &str,
        encrypted_mek: &EncryptedMek,
    ) -> CryptoResult<MasterKey> {
        let peer = decode_public_key(approver_public_key)?;
        let key = pairing_key(&self.secret, &peer);
        MasterKey::unwrap(&key, encrypted_mek)
    }
}

impl Default for PairingInitiator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PairingInitiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingInitiator")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// What the approver submits to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingApproval {
    /// Approver's ephemeral public key (base64 SEC1).
    pub public_key: String,
    /// MEK wrapped under the pairing key.
    pub encrypted_mek: EncryptedMek,
}

/// Approve a pairing request: wrap `mek` for the holder of
/// `initiator_public_key`.
pub fn approve_pairing(initiator_public_key: &str, mek: &MasterKey) -> CryptoResult<PairingApproval> {
    let peer = decode_public_key(initiator_public_key)?;
    let secret = EphemeralSecret::random(&mut OsRng);
    let key = pairing_key(&secret, &peer);

    Ok(PairingApproval {
        public_key: encode_public_key(&secret.public_key()),
        encrypted_mek: mek.wrap(&key)?,
    })
}

fn pairing_key(secret: &EphemeralSecret, peer: &PublicKey) -> Zeroizing<[u8; KEY_SIZE]> {
    let shared = secret.diffie_hellman(peer);
    Zeroizing::new(kdf::expand(shared.raw_secret_bytes().as_slice(), PAIRING_INFO))
}

fn encode_public_key(key: &PublicKey) -> String {
    STANDARD.encode(key.to_encoded_point(false).as_bytes())
}

fn decode_public_key(encoded: &str) -> CryptoResult<PublicKey> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::InvalidEncoding(format!("public key: {e}")))?;
    PublicKey::from_sec1_bytes(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}
