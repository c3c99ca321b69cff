//! Master Encryption Key and its password envelope.
//!
//! The MEK is generated once per account and only ever stored wrapped under
//! `enc_key`. A password change re-wraps the same MEK, so content encrypted
//! before the change stays readable.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tether_types::EncryptedMek;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::aead::{self, KEY_SIZE};
use crate::error::{fill_random, CryptoError, CryptoResult};
use crate::kdf::{self, AuthKeyHash, PBKDF2_ITERATIONS};

/// 256-bit Master Encryption Key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    /// Generate a fresh random MEK.
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encrypt this MEK under a wrapping key (`enc_key` or a pairing key).
    pub fn wrap(&self, wrapping_key: &[u8; KEY_SIZE]) -> CryptoResult<EncryptedMek> {
        aead::seal(wrapping_key, &self.0)
    }

    /// Decrypt a wrapped MEK.
    ///
    /// A wrong key or tampered envelope fails with
    /// [`CryptoError::DecryptionFailed`].
    pub fn unwrap(wrapping_key: &[u8; KEY_SIZE], wrapped: &EncryptedMek) -> CryptoResult<Self> {
        let mut plaintext = aead::open(wrapping_key, wrapped)?;
        let result = <[u8; KEY_SIZE]>::try_from(plaintext.as_slice())
            .map(Self)
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: plaintext.len(),
            });
        plaintext.zeroize();
        result
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// The per-account triple an account store keeps and replaces atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Base64 PBKDF2 salt.
    pub salt: String,
    /// MEK wrapped under `enc_key`.
    pub encrypted_mek: EncryptedMek,
    /// Server-side hash of `auth_key`.
    pub auth_key_hash: AuthKeyHash,
    /// PBKDF2 iterations the record was derived with.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

fn default_iterations() -> u32 {
    PBKDF2_ITERATIONS
}

impl CredentialRecord {
    /// Bootstrap an account: fresh MEK, salt, envelope and auth hash.
    pub fn create(password: &str) -> CryptoResult<(Self, MasterKey)> {
        Self::create_with_iterations(password, PBKDF2_ITERATIONS)
    }

    pub(crate) fn create_with_iterations(
        password: &str,
        iterations: u32,
    ) -> CryptoResult<(Self, MasterKey)> {
        let mek = MasterKey::generate()?;
        let record = Self::seal(password, &mek, iterations)?;
        Ok((record, mek))
    }

    /// Recover the MEK with the account password.
    pub fn unlock(&self, password: &str) -> CryptoResult<MasterKey> {
        let salt = self.salt_bytes()?;
        let keys = kdf::derive_keys_with_iterations(password, &salt, self.iterations);
        MasterKey::unwrap(keys.enc_key(), &self.encrypted_mek)
    }

    /// Check a login attempt against the stored auth hash.
    pub fn verify_password(&self, password: &str) -> CryptoResult<bool> {
        let salt = self.salt_bytes()?;
        let keys = kdf::derive_keys_with_iterations(password, &salt, self.iterations);
        self.auth_key_hash.verify(keys.auth_key())
    }

    /// Re-wrap the same MEK under a new password and fresh salt.
    ///
    /// Fails with [`CryptoError::DecryptionFailed`] if `old_password` is
    /// wrong. The returned record replaces this one as a whole.
    pub fn change_password(&self, old_password: &str, new_password: &str) -> CryptoResult<Self> {
        let mek = self.unlock(old_password)?;
        Self::seal(new_password, &mek, self.iterations)
    }

    fn seal(password: &str, mek: &MasterKey, iterations: u32) -> CryptoResult<Self> {
        let salt = kdf::generate_salt()?;
        let keys = kdf::derive_keys_with_iterations(password, &salt, iterations);

        Ok(Self {
            salt: STANDARD.encode(salt),
            encrypted_mek: mek.wrap(keys.enc_key())?,
            auth_key_hash: AuthKeyHash::new(keys.auth_key())?,
            iterations,
        })
    }

    fn salt_bytes(&self) -> CryptoResult<Vec<u8>> {
        STANDARD
            .decode(&self.salt)
            .map_err(|e| CryptoError::InvalidEncoding(format!("salt: {e}")))
    }
}
