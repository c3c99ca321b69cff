//! # tether-crypto
//!
//! End-to-end encryption key hierarchy for Tether.
//!
//! ```text
//! password + salt
//!   └─ PBKDF2-HMAC-SHA256 (100 000) ─ base_key
//!        ├─ HKDF "auth-v1"    ─ auth_key  (sent to server, re-hashed there)
//!        └─ HKDF "encrypt-v1" ─ enc_key   (never leaves the device)
//!             └─ AES-256-GCM ─ wraps the MEK
//!                  └─ HKDF "session-v1:<id>" ─ per-session key
//!                       └─ AES-256-GCM ─ terminal content
//! ```
//!
//! A second device obtains the MEK through [`pairing`]: an ephemeral P-256
//! ECDH exchange relayed by a server that only sees public keys and an
//! envelope it cannot open.
//!
//! All operations are synchronous and stateless. Every failure is fail-closed:
//! decryption either returns the exact plaintext or an error.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod aead;
mod error;
pub mod kdf;
pub mod mek;
pub mod pairing;
pub mod session_key;

pub use aead::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{
    derive_keys, derive_keys_with_iterations, generate_salt, AuthKeyHash, DerivedKeys,
    PBKDF2_ITERATIONS, SALT_SIZE,
};
pub use mek::{CredentialRecord, MasterKey};
pub use pairing::{approve_pairing, PairingApproval, PairingInitiator};
pub use session_key::SessionKey;
