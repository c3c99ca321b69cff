//! Identity types for Tether.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// Identifier of a terminal session.
///
/// Session ids are ULIDs minted by the producer. On the wire they are plain
/// strings so that a viewer naming a foreign session can be answered with a
/// `session_mismatch` error instead of a parse failure; [`SessionId::parse`]
/// is used where the relay accepts a new session (the connection route).
///
/// ULIDs decode case-insensitively, so every valid ULID is stored in its
/// canonical uppercase form. Anything else is kept as sent.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh ULID session id.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Parse and validate a ULID session id.
    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        ulid::Ulid::from_string(raw)
            .map(|ulid| Self(ulid.to_string()))
            .map_err(|e| TypesError::InvalidSessionId(format!("{raw}: {e}")))
    }

    /// Wrap a string without rejecting it, canonicalizing it if it is a ULID.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        match ulid::Ulid::from_string(&raw) {
            Ok(ulid) => Self(ulid.to_string()),
            Err(_) => Self(raw),
        }
    }

    /// Borrow the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(raw: String) -> Self {
        Self::from_raw(raw)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// Relay-local handle for one live socket.
///
/// Assigned by the session actor, never sent on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    /// Create a ConnId with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl fmt::Debug for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnId({})", self.0)
    }
}

/// Which side of a session a connection speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The terminal-producing client (one per session).
    Producer,
    /// A terminal-viewing client (any number per session).
    Viewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => f.write_str("producer"),
            Role::Viewer => f.write_str("viewer"),
        }
    }
}

/// Number of base32 characters in a pairing code.
const PAIRING_CODE_LEN: usize = 8;

/// Short human-enterable code identifying a pending pairing request.
///
/// 8 characters of RFC 4648 base32 (40 bits), displayed as `XXXX-XXXX`.
/// The code only locates the request; fetching the initiator's key requires
/// an authenticated approver.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PairingCode(String);

impl PairingCode {
    /// Generate a new random pairing code.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 5];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(base32_encode(&bytes))
    }

    /// Parse user input, ignoring dashes, whitespace and case.
    pub fn parse(input: &str) -> Result<Self, TypesError> {
        let clean: String = input
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if clean.len() != PAIRING_CODE_LEN {
            return Err(TypesError::InvalidPairingCode(format!(
                "expected {} characters, got {}",
                PAIRING_CODE_LEN,
                clean.len()
            )));
        }

        if !clean.chars().all(is_base32_char) {
            return Err(TypesError::InvalidPairingCode(
                "invalid characters (must be A-Z or 2-7)".into(),
            ));
        }

        Ok(Self(clean))
    }

    /// The normalized code without separators.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PairingCode {
    type Error = TypesError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<PairingCode> for String {
    fn from(code: PairingCode) -> Self {
        code.0
    }
}

impl fmt::Display for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", &self.0[..4], &self.0[4..])
    }
}

impl fmt::Debug for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PairingCode({self})")
    }
}

/// Encode bytes as base32 (RFC 4648, uppercase, no padding).
fn base32_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut result = String::new();
    let mut bits = 0u32;
    let mut bit_count = 0;

    for &byte in bytes {
        bits = (bits << 8) | (byte as u32);
        bit_count += 8;

        while bit_count >= 5 {
            bit_count -= 5;
            let index = ((bits >> bit_count) & 0x1F) as usize;
            result.push(ALPHABET[index] as char);
        }
    }

    if bit_count > 0 {
        let index = ((bits << (5 - bit_count)) & 0x1F) as usize;
        result.push(ALPHABET[index] as char);
    }

    result
}

fn is_base32_char(c: char) -> bool {
    matches!(c, 'A'..='Z' | '2'..='7')
}
