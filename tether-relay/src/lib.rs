//! # tether-relay
//!
//! WebSocket relay between a terminal and its remote viewers.
//!
//! This crate implements a relay server that:
//! - Binds one producer (the terminal) and any number of viewers per session
//! - Forwards producer output to viewers without decoding the payload
//! - Queues viewer input while the producer is away
//! - Closes silent sockets after a heartbeat timeout
//! - Mediates device pairing without ever holding a usable key
//!
//! ## Architecture
//!
//! ```text
//! producer ──┐                       ┌── viewer
//!            │      WebSocket        │
//!            ├──────────────────────►├── viewer
//!        ┌───┴───────────────────────┴───┐
//!        │          tether-relay         │
//!        │  one actor per session        │
//!        │  ┌─────────────────────────┐  │
//!        │  │ SQLite (session records)│  │
//!        │  └─────────────────────────┘  │
//!        └───────────────────────────────┘
//! ```
//!
//! ## Endpoints
//!
//! - `GET /sessions/{id}/producer`, `GET /sessions/{id}/viewer`: WebSocket
//!   upgrades carrying JSON frames (see `tether-types`)
//! - `/pairing/...`: pairing mediator REST API
//! - `GET /health`, `GET /metrics`
//!
//! Close codes: 1000 normal, 4000 superseded by a newer producer, 4001
//! heartbeat timeout, 1013 for a reader too slow to keep up.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod http;
pub mod limits;
pub mod pairing;
pub mod server;
pub mod session;
pub mod storage;
pub mod ws;
