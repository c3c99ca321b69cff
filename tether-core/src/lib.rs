//! # tether-core
//!
//! Pure session relay logic for Tether (no I/O, instant tests).
//!
//! This crate decides *what* a session relay does with every connection,
//! frame, close and heartbeat tick, without owning any socket or timer.
//!
//! ## Design Philosophy
//!
//! [`Relay::handle`] takes an [`Event`] plus the current [`Tick`] and returns
//! a list of [`Action`]s (send a frame, close a connection, persist the
//! session). `tether-relay` owns the sockets and the timer and interprets
//! those actions. This keeps every routing rule testable without async code
//! or mocks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod heartbeat;
pub mod queue;
pub mod registry;
pub mod router;

pub use clock::Tick;
pub use heartbeat::{
    HeartbeatPolicy, Liveness, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT,
};
pub use queue::{OfflineQueue, QueuedMessage, DEFAULT_QUEUE_CAPACITY, DEFAULT_QUEUE_MAX_AGE};
pub use registry::{Connection, ConnectionRegistry, ProducerSlot};
pub use router::{Action, Event, Outbound, Relay, RelayConfig};
