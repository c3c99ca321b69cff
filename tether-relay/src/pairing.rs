//! Pairing mediator.
//!
//! Holds short-lived pairing records so two devices that share no channel
//! yet can exchange ECDH public keys and a wrapped master key:
//!
//! ```text
//! initiator                  relay                     approver (signed in)
//!     |-- register(name, pk) -->|                            |
//!     |<-- code, ttl -----------|                            |
//!     |        (code shown on screen, typed on approver)     |
//!     |                         |<-- fetch(code) ------------|
//!     |                         |--- name, pk -------------->|
//!     |                         |<-- approve(pk', wrapped) --|
//!     |-- poll(code) ---------->|                            |
//!     |<-- completed, pk', wrapped                           |
//! ```
//!
//! The relay only stores public keys and an AEAD envelope; it can never
//! derive the pairing key. Records expire after the configured TTL and are
//! removed once the initiator has collected the approval.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tether_types::pairing::{
    ApprovePairing, PairingDetails, PairingStatus, PairingTicket, PollResponse,
    RegisterPairing,
};
use tether_types::{EncryptedMek, PairingCode};
use tracing::{debug, info};

use crate::config::PairingConfig;
use crate::error::{PairingError, PairingResult};

/// Length of an uncompressed SEC1 P-256 point.
const PUBLIC_KEY_LEN: usize = 65;

/// Attempts at drawing an unused code before giving up.
const CODE_ATTEMPTS: usize = 8;

/// One pending or completed pairing.
#[derive(Debug, Clone)]
struct PairingRecord {
    device_name: String,
    initiator_public_key: String,
    approval: Option<Approval>,
    created_at: u64,
    expires_at: u64,
}

#[derive(Debug, Clone)]
struct Approval {
    public_key: String,
    encrypted_mek: EncryptedMek,
}

impl PairingRecord {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    /// Gate shared by fetch and approve.
    fn check_open(&self, now_ms: u64) -> PairingResult<()> {
        if self.is_expired(now_ms) {
            Err(PairingError::Expired)
        } else if self.approval.is_some() {
            Err(PairingError::AlreadyCompleted)
        } else {
            Ok(())
        }
    }
}

/// In-memory store of pairing records, keyed by code.
#[derive(Debug)]
pub struct PairingMediator {
    records: DashMap<PairingCode, PairingRecord>,
    ttl: Duration,
    max_device_name_len: usize,
}

impl PairingMediator {
    /// Create a mediator from the `[pairing]` section.
    pub fn new(config: &PairingConfig) -> Self {
        Self {
            records: DashMap::new(),
            ttl: Duration::from_secs(config.ttl_secs),
            max_device_name_len: config.max_device_name_len,
        }
    }

    /// Open a pairing for a new device and hand back its code.
    pub fn register(&self, request: RegisterPairing, now_ms: u64) -> PairingResult<PairingTicket> {
        let device_name = request.device_name.trim().to_string();
        if device_name.is_empty() {
            return Err(PairingError::invalid("device name is empty"));
        }
        if device_name.chars().count() > self.max_device_name_len {
            return Err(PairingError::invalid(format!(
                "device name longer than {} characters",
                self.max_device_name_len
            )));
        }
        validate_public_key(&request.public_key)?;

        let record = PairingRecord {
            device_name,
            initiator_public_key: request.public_key,
            approval: None,
            created_at: now_ms,
            expires_at: now_ms.saturating_add(self.ttl.as_millis() as u64),
        };

        for _ in 0..CODE_ATTEMPTS {
            let code = PairingCode::generate();
            if let Entry::Vacant(slot) = self.records.entry(code.clone()) {
                slot.insert(record);
                info!(%code, "pairing registered");
                return Ok(PairingTicket {
                    pairing_code: code,
                    ttl: self.ttl.as_secs(),
                });
            }
        }
        Err(PairingError::invalid("no free pairing code"))
    }

    /// Show the initiator's name and key to an approver.
    pub fn fetch(&self, code: &PairingCode, now_ms: u64) -> PairingResult<PairingDetails> {
        let record = self.records.get(code).ok_or(PairingError::NotFound)?;
        record.check_open(now_ms)?;
        Ok(PairingDetails {
            device_name: record.device_name.clone(),
            public_key: record.initiator_public_key.clone(),
            created_at: record.created_at,
        })
    }

    /// Record the approver's key and the wrapped master key.
    pub fn approve(
        &self,
        code: &PairingCode,
        request: ApprovePairing,
        now_ms: u64,
    ) -> PairingResult<()> {
        validate_public_key(&request.public_key)?;
        let mut record = self.records.get_mut(code).ok_or(PairingError::NotFound)?;
        record.check_open(now_ms)?;
        record.approval = Some(Approval {
            public_key: request.public_key,
            encrypted_mek: request.encrypted_mek,
        });
        info!(%code, "pairing approved");
        Ok(())
    }

    /// Report progress to the initiator.
    ///
    /// A completed pairing is handed out once and then forgotten.
    pub fn poll(&self, code: &PairingCode, now_ms: u64) -> PairingResult<PollResponse> {
        let record = self.records.get(code).ok_or(PairingError::NotFound)?;
        if record.is_expired(now_ms) {
            return Ok(PollResponse::status(PairingStatus::Expired));
        }
        if record.approval.is_none() {
            return Ok(PollResponse::status(PairingStatus::Pending));
        }
        drop(record);

        // Another poll may have collected it between the two lookups.
        let (_, record) = self.records.remove(code).ok_or(PairingError::NotFound)?;
        let approval = record.approval.ok_or(PairingError::NotFound)?;
        debug!(%code, "pairing collected");
        Ok(PollResponse {
            status: PairingStatus::Completed,
            public_key: Some(approval.public_key),
            encrypted_mek: Some(approval.encrypted_mek),
        })
    }

    /// Drop every expired record. Returns how many were removed.
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now_ms));
        before.saturating_sub(self.records.len())
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no pairing is open.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Accept only base64 uncompressed SEC1 points that lie on P-256.
fn validate_public_key(encoded: &str) -> PairingResult<()> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| PairingError::invalid("public key is not base64"))?;
    if bytes.len() != PUBLIC_KEY_LEN || bytes[0] != 0x04 {
        return Err(PairingError::invalid(
            "public key is not an uncompressed P-256 point",
        ));
    }
    p256::PublicKey::from_sec1_bytes(&bytes)
        .map_err(|_| PairingError::invalid("public key is not on the P-256 curve"))?;
    Ok(())
}
