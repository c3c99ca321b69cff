//! Password-based key derivation.
//!
//! `PBKDF2-HMAC-SHA256(password, salt, 100 000)` yields a base key, which is
//! split by HKDF-SHA256 into two independent subkeys:
//! - `auth_key` (`info = "auth-v1"`) proves knowledge of the password to the
//!   server, which stores only [`AuthKeyHash`] of it
//! - `enc_key` (`info = "encrypt-v1"`) wraps the MEK and never leaves the device

use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::aead::KEY_SIZE;
use crate::error::{fill_random, CryptoError, CryptoResult};

/// PBKDF2 work factor.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt size in bytes.
pub const SALT_SIZE: usize = 16;

const AUTH_INFO: &[u8] = b"auth-v1";
const ENCRYPT_INFO: &[u8] = b"encrypt-v1";

/// The two subkeys derived from a password.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeys {
    auth_key: [u8; KEY_SIZE],
    enc_key: [u8; KEY_SIZE],
}

impl DerivedKeys {
    /// Key sent to the server for login verification.
    pub fn auth_key(&self) -> &[u8; KEY_SIZE] {
        &self.auth_key
    }

    /// Key that wraps the MEK. Never transmitted.
    pub fn enc_key(&self) -> &[u8; KEY_SIZE] {
        &self.enc_key
    }
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKeys([REDACTED])")
    }
}

/// Derive `auth_key` and `enc_key` from a password and salt.
pub fn derive_keys(password: &str, salt: &[u8]) -> DerivedKeys {
    derive_keys_with_iterations(password, salt, PBKDF2_ITERATIONS)
}

/// [`derive_keys`] with an explicit PBKDF2 iteration count.
pub fn derive_keys_with_iterations(password: &str, salt: &[u8], iterations: u32) -> DerivedKeys {
    let mut base_key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut *base_key);

    DerivedKeys {
        auth_key: expand(&*base_key, AUTH_INFO),
        enc_key: expand(&*base_key, ENCRYPT_INFO),
    }
}

/// HKDF-SHA256 expand of `ikm` to a 32-byte key.
pub(crate) fn expand(ikm: &[u8], info: &[u8]) -> [u8; KEY_SIZE] {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .expect("HKDF expand should not fail with valid lengths");
    okm
}

/// Generate a random password salt.
pub fn generate_salt() -> CryptoResult<[u8; SALT_SIZE]> {
    let mut salt = [0u8; SALT_SIZE];
    fill_random(&mut salt)?;
    Ok(salt)
}

/// Server-side record of an `auth_key`: `SHA-256(salt || auth_key)` with a
/// fresh random salt, both hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthKeyHash {
    /// Hex salt.
    pub salt: String,
    /// Hex digest.
    pub hash: String,
}

impl AuthKeyHash {
    /// Hash an `auth_key` under a fresh salt.
    pub fn new(auth_key: &[u8; KEY_SIZE]) -> CryptoResult<Self> {
        let salt = generate_salt()?;
        Ok(Self {
            salt: hex::encode(salt),
            hash: hex::encode(digest(&salt, auth_key)),
        })
    }

    /// Check a presented `auth_key` in constant time.
    pub fn verify(&self, auth_key: &[u8; KEY_SIZE]) -> CryptoResult<bool> {
        let salt =
            hex::decode(&self.salt).map_err(|e| CryptoError::InvalidEncoding(format!("salt: {e}")))?;
        let expected =
            hex::decode(&self.hash).map_err(|e| CryptoError::InvalidEncoding(format!("hash: {e}")))?;

        let actual = digest(&salt, auth_key);
        Ok(actual.as_slice().ct_eq(&expected).into())
    }
}

fn digest(salt: &[u8], auth_key: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(auth_key);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low iteration count keeps unit tests fast; the constant is covered once.
    const FAST: u32 = 1_000;

    #[test]
    fn derive_keys_known_answer() {
        // Computed independently with Python hashlib.pbkdf2_hmac and hmac.
        let keys = derive_keys("correct horse", &[7u8; SALT_SIZE]);
        assert_eq!(
            hex::encode(keys.auth_key()),
            "d0076c3d4e1bc0609f2f6970d25a965464d85c3508c4bcec890fb3d44c9690d7"
        );
        assert_eq!(
            hex::encode(keys.enc_key()),
            "7da231cb4e29a95893844021bb0ddde8a5125b7d492d6cdc187532f36028d1c4"
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let salt = [7u8; SALT_SIZE];
        let a = derive_keys("correct horse", &salt);
        let b = derive_keys("correct horse", &salt);

        assert_eq!(a.auth_key(), b.auth_key());
        assert_eq!(a.enc_key(), b.enc_key());
    }

    #[test]
    fn auth_and_enc_keys_are_independent() {
        let keys = derive_keys_with_iterations("pw", &[1u8; SALT_SIZE], FAST);
        assert_ne!(keys.auth_key(), keys.enc_key());
    }

    #[test]
    fn salt_changes_keys() {
        let a = derive_keys_with_iterations("pw", &[1u8; SALT_SIZE], FAST);
        let b = derive_keys_with_iterations("pw", &[2u8; SALT_SIZE], FAST);
        assert_ne!(a.enc_key(), b.enc_key());
    }

    #[test]
    fn password_changes_keys() {
        let salt = [1u8; SALT_SIZE];
        let a = derive_keys_with_iterations("pw-a", &salt, FAST);
        let b = derive_keys_with_iterations("pw-b", &salt, FAST);
        assert_ne!(a.auth_key(), b.auth_key());
    }

    #[test]
    fn iteration_count_matters() {
        let salt = [1u8; SALT_SIZE];
        let a = derive_keys_with_iterations("pw", &salt, FAST);
        let b = derive_keys_with_iterations("pw", &salt, FAST + 1);
        assert_ne!(a.enc_key(), b.enc_key());
    }

    #[test]
    fn salts_are_random() {
        assert_ne!(generate_salt().unwrap(), generate_salt().unwrap());
    }

    #[test]
    fn auth_hash_verifies_only_the_right_key() {
        let keys = derive_keys_with_iterations("pw", &[3u8; SALT_SIZE], FAST);
        let other = derive_keys_with_iterations("nope", &[3u8; SALT_SIZE], FAST);
        let stored = AuthKeyHash::new(keys.auth_key()).unwrap();

        assert!(stored.verify(keys.auth_key()).unwrap());
        assert!(!stored.verify(other.auth_key()).unwrap());
    }

    #[test]
    fn auth_hash_is_salted() {
        let key = [9u8; KEY_SIZE];
        let a = AuthKeyHash::new(&key).unwrap();
        let b = AuthKeyHash::new(&key).unwrap();

        assert_ne!(a.hash, b.hash);
        assert!(a.verify(&key).unwrap() && b.verify(&key).unwrap());
    }

    #[test]
    fn debug_is_redacted() {
        let keys = derive_keys_with_iterations("pw", &[0u8; SALT_SIZE], FAST);
        assert_eq!(format!("{keys:?}"), "DerivedKeys([REDACTED])");
    }
}
