//! Pairing REST handlers.
//!
//! | method | path                      | auth   | result                      |
//! |--------|---------------------------|--------|-----------------------------|
//! | POST   | `/pairing`                | none   | 201 code + ttl              |
//! | GET    | `/pairing/{code}`         | bearer | initiator name + key        |
//! | POST   | `/pairing/{code}/approve` | bearer | 204                         |
//! | GET    | `/pairing/{code}/poll`    | none   | status (+ key, wrapped MEK) |
//!
//! Registration is rate limited per client IP since it needs no token.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use tether_types::pairing::{
    ApprovePairing, PairingDetails, PairingStatus, PairingTicket, PollResponse, RegisterPairing,
};
use tether_types::PairingCode;
use tracing::info;

use super::{authenticate, rate_limited, ApiError, TokenQuery};
use crate::server::TetherRelay;
use crate::session::unix_ms;

fn parse_code(raw: &str) -> Result<PairingCode, ApiError> {
    PairingCode::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// `POST /pairing`
pub async fn register_handler(
    Extension(relay): Extension<Arc<TetherRelay>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<RegisterPairing>,
) -> Result<(StatusCode, Json<PairingTicket>), ApiError> {
    relay
        .rate_limits()
        .check_pairing(addr.ip())
        .map_err(|e| rate_limited(&relay, e))?;

    let ticket = relay.pairing().register(body, unix_ms())?;
    relay
        .metrics()
        .pairings_registered
        .fetch_add(1, Ordering::Relaxed);
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// `GET /pairing/{code}`
pub async fn fetch_handler(
    Extension(relay): Extension<Arc<TetherRelay>>,
    Path(code): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<PairingDetails>, ApiError> {
    authenticate(&relay, &headers, &query).await?;
    let code = parse_code(&code)?;
    Ok(Json(relay.pairing().fetch(&code, unix_ms())?))
}

/// `POST /pairing/{code}/approve`
pub async fn approve_handler(
    Extension(relay): Extension<Arc<TetherRelay>>,
    Path(code): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    Json(body): Json<ApprovePairing>,
) -> Result<StatusCode, ApiError> {
    let identity = authenticate(&relay, &headers, &query).await?;
    let code = parse_code(&code)?;
    relay.pairing().approve(&code, body, unix_ms())?;
    info!(user_id = %identity.user_id, "device pairing approved");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /pairing/{code}/poll`
pub async fn poll_handler(
    Extension(relay): Extension<Arc<TetherRelay>>,
    Path(code): Path<String>,
) -> Result<Json<PollResponse>, ApiError> {
    let code = parse_code(&code)?;
    let response = relay.pairing().poll(&code, unix_ms())?;
    if response.status == PairingStatus::Completed {
        relay
            .metrics()
            .pairings_completed
            .fetch_add(1, Ordering::Relaxed);
    }
    Ok(Json(response))
}
