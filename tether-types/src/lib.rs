//! # tether-types
//!
//! Wire format types for the Tether terminal relay.
//!
//! This crate provides the foundational types used across all Tether crates:
//! - [`SessionId`], [`PairingCode`], [`ConnId`] - Identity types
//! - [`ProducerMessage`], [`ViewerMessage`], [`ToProducer`], [`ToViewer`] - JSON frames
//! - [`EncryptedContent`] - The AEAD envelope shared by content and the MEK
//! - [`pairing`] - Request/response bodies for the pairing mediator
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod ids;
mod messages;
pub mod pairing;

pub use envelope::{EncryptedContent, EncryptedMek, ENVELOPE_VERSION};
pub use error::TypesError;
pub use ids::{ConnId, PairingCode, Role, SessionId};
pub use messages::{
    Attach, CloseCode, Detach, ErrorCode, ErrorMessage, Output, Prompt, PromptRequest,
    ProducerMessage, Resize, SessionInfo, SessionStatus, Snapshot, Status, Subscribe,
    ToProducer, ToViewer, ViewerMessage, WireFrame,
};
