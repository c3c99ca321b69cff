//! JSON frames exchanged over session connections.
//!
//! Each direction has its own tagged enum, so a frame that is valid in one
//! direction (e.g. `output` from a viewer) is rejected at the boundary as an
//! unknown variant.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{SessionId, TypesError};

/// JSON encoding shared by all frame enums.
pub trait WireFrame: Serialize + DeserializeOwned {
    /// Serialize to a JSON text frame.
    fn to_json(&self) -> Result<String, TypesError> {
        serde_json::to_string(self).map_err(TypesError::Serialization)
    }

    /// Deserialize from a JSON text frame.
    fn from_json(text: &str) -> Result<Self, TypesError> {
        serde_json::from_str(text).map_err(TypesError::Deserialization)
    }
}

/// Frames sent by the producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProducerMessage {
    /// Producer announces the session it serves
    Attach(Attach),
    /// Terminal output
    Output(Output),
    /// Producer leaves without closing the socket
    Detach(Detach),
    /// Heartbeat reply
    Pong,
}

/// Frames sent to the producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToProducer {
    /// Input typed by a viewer
    Prompt(Prompt),
    /// Terminal geometry change
    Resize(Resize),
    /// Error addressed to the producer
    Error(ErrorMessage),
    /// Heartbeat probe
    Ping,
}

/// Frames sent by a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerMessage {
    /// Ask for the current state of some sessions
    Subscribe(Subscribe),
    /// Input for the producer
    Prompt(PromptRequest),
    /// Terminal geometry change
    Resize(Resize),
    /// Heartbeat reply
    Pong,
}

/// Frames sent to a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToViewer {
    /// Terminal output relayed from the producer
    Output(Output),
    /// Attachment status change
    Status(Status),
    /// Full session descriptions
    Snapshot(Snapshot),
    /// Error addressed to this viewer only
    Error(ErrorMessage),
    /// Heartbeat probe
    Ping,
}

impl WireFrame for ProducerMessage {}
impl WireFrame for ToProducer {}
impl WireFrame for ViewerMessage {}
impl WireFrame for ToViewer {}

/// Producer attach announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attach {
    /// Session being served
    pub session_id: SessionId,
    /// Producer device identifier
    pub device_id: String,
    /// Human-readable device name
    pub device_name: String,
    /// Working directory of the terminal
    pub cwd: String,
}

/// Terminal output chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Session the output belongs to
    pub session_id: SessionId,
    /// Base64 terminal bytes (opaque to the relay)
    pub data: String,
    /// Producer timestamp, unix milliseconds
    pub timestamp: u64,
}

/// Producer detach notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detach {
    /// Session being left
    pub session_id: SessionId,
}

/// Viewer subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscribe {
    /// Sessions the viewer is interested in
    pub session_ids: Vec<SessionId>,
}

/// Prompt as sent by a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    /// Target session
    pub session_id: SessionId,
    /// Input text
    pub text: String,
}

/// Prompt as delivered to the producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Target session
    pub session_id: SessionId,
    /// Input text
    pub text: String,
    /// Origin of the input (`"web"` for viewers)
    pub source: String,
    /// Relay receive time, unix milliseconds
    pub timestamp: u64,
}

/// Terminal resize request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resize {
    /// Target session
    pub session_id: SessionId,
    /// Columns
    pub cols: u16,
    /// Rows
    pub rows: u16,
}

/// Attachment status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// A producer has attached
    Attached,
    /// No producer is attached
    Detached,
}

impl SessionStatus {
    /// Wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Attached => "attached",
            SessionStatus::Detached => "detached",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "attached" => Some(SessionStatus::Attached),
            "detached" => Some(SessionStatus::Detached),
            _ => None,
        }
    }
}

/// Status change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Session concerned
    pub session_id: SessionId,
    /// New status
    pub status: SessionStatus,
}

/// Session descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// One entry per known session
    pub sessions: Vec<SessionInfo>,
}

/// Everything the relay knows about a session.
///
/// This is also the record persisted to the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session id (ULID)
    pub id: SessionId,
    /// Producer device identifier
    pub device_id: String,
    /// Producer device name
    pub device_name: String,
    /// Terminal working directory
    pub cwd: String,
    /// Attachment status
    pub status: SessionStatus,
    /// First attach, unix milliseconds
    pub created_at: u64,
    /// Last transition, unix milliseconds
    pub updated_at: u64,
}

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed JSON or unknown message type
    InvalidMessage,
    /// Frame names a session other than the one this relay serves
    SessionMismatch,
}

/// Error frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable detail
    pub message: String,
}

impl ErrorMessage {
    /// Frame could not be parsed or is not allowed from this sender.
    pub fn invalid_message(detail: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidMessage,
            message: detail.into(),
        }
    }

    /// Frame names a session other than `bound`.
    pub fn session_mismatch(bound: &SessionId, got: &SessionId) -> Self {
        Self {
            code: ErrorCode::SessionMismatch,
            message: format!("connection is bound to session {bound}, not {got}"),
        }
    }
}

/// WebSocket close codes used by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Normal closure
    Normal,
    /// A newer producer connection took over the session
    Superseded,
    /// The peer stopped answering pings
    HeartbeatTimeout,
    /// The peer read too slowly and its outbound buffer filled up
    Overloaded,
}

impl CloseCode {
    /// Numeric close code.
    pub fn code(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::Superseded => 4000,
            CloseCode::HeartbeatTimeout => 4001,
            CloseCode::Overloaded => 1013,
        }
    }

    /// Close reason sent with the code.
    pub fn reason(&self) -> &'static str {
        match self {
            CloseCode::Normal => "normal closure",
            CloseCode::Superseded => "superseded by new connection",
            CloseCode::HeartbeatTimeout => "heartbeat timeout",
            CloseCode::Overloaded => "outbound buffer full",
        }
    }
}
