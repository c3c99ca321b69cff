//! Request and response bodies for the pairing mediator.
//!
//! Field names are camelCase on the wire to match the browser client.

use serde::{Deserialize, Serialize};

use crate::{EncryptedMek, PairingCode};

/// `POST /pairing` body from the device that wants to join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPairing {
    /// Name shown to the approver
    pub device_name: String,
    /// Base64 uncompressed SEC1 P-256 public key
    pub public_key: String,
}

/// Response to a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingTicket {
    /// Code the user carries to the approving device
    pub pairing_code: PairingCode,
    /// Seconds until the request expires
    pub ttl: u64,
}

/// `GET /pairing/{code}` response for an authenticated approver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingDetails {
    /// Name the initiator registered with
    pub device_name: String,
    /// Initiator's public key
    pub public_key: String,
    /// Registration time, unix milliseconds
    pub created_at: u64,
}

/// `POST /pairing/{code}/approve` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovePairing {
    /// Approver's ephemeral public key
    pub public_key: String,
    /// MEK wrapped under the pairing key
    pub encrypted_mek: EncryptedMek,
}

/// Lifecycle of a pairing request as seen by the initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingStatus {
    /// Waiting for approval
    Pending,
    /// Approved; key material attached
    Completed,
    /// Not approved within the TTL
    Expired,
}

/// `GET /pairing/{code}/poll` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    /// Current status
    pub status: PairingStatus,
    /// Approver's public key, once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Wrapped MEK, once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_mek: Option<EncryptedMek>,
}

impl PollResponse {
    /// A response carrying only a status.
    pub fn status(status: PairingStatus) -> Self {
        Self {
            status,
            public_key: None,
            encrypted_mek: None,
        }
    }
}
