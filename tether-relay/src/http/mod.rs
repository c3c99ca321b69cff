//! HTTP endpoints for tether-relay.
//!
//! One router serves everything:
//! - `GET /sessions/{id}/producer` and `GET /sessions/{id}/viewer` (WebSocket upgrades)
//! - the pairing REST API under `/pairing`
//! - `GET /health` and `GET /metrics`

pub mod health;
mod metrics;
mod pairing;

use crate::auth::{bearer_token, Identity};
use crate::error::PairingError;
use crate::limits::RateLimitError;
use crate::server::TetherRelay;
use crate::ws;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<TetherRelay>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health::health_handler))
        .route("/sessions/:session_id/producer", get(ws::producer_handler))
        .route("/sessions/:session_id/viewer", get(ws::viewer_handler))
        .route("/pairing", post(pairing::register_handler))
        .route("/pairing/:code", get(pairing::fetch_handler))
        .route("/pairing/:code/approve", post(pairing::approve_handler))
        .route("/pairing/:code/poll", get(pairing::poll_handler));

    if relay.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(relay))
}

/// `?token=` for clients that cannot send an `Authorization` header.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    /// Bearer token.
    pub token: Option<String>,
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Request failures, mapped to HTTP statuses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unknown bearer token.
    Unauthorized,
    /// Caller exceeded a rate limit.
    RateLimited(RateLimitError),
    /// Malformed path parameter.
    BadRequest(String),
    /// Pairing mediator refused the request.
    Pairing(PairingError),
}

impl From<PairingError> for ApiError {
    fn from(e: PairingError) -> Self {
        ApiError::Pairing(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::RateLimited(e) => (StatusCode::TOO_MANY_REQUESTS, e.to_string()),
            ApiError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason),
            ApiError::Pairing(e) => {
                let status = match e {
                    PairingError::NotFound => StatusCode::NOT_FOUND,
                    PairingError::Expired => StatusCode::GONE,
                    PairingError::AlreadyCompleted => StatusCode::CONFLICT,
                    PairingError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
                };
                (status, e.to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Resolve the caller's bearer token or fail with 401.
pub(crate) async fn authenticate(
    relay: &TetherRelay,
    headers: &HeaderMap,
    query: &TokenQuery,
) -> Result<Identity, ApiError> {
    let identity = match bearer_token(headers, query.token.as_deref()) {
        Some(token) => relay.verifier().verify(&token).await,
        None => None,
    };
    identity.ok_or_else(|| {
        relay.metrics().auth_failures.fetch_add(1, Ordering::Relaxed);
        ApiError::Unauthorized
    })
}

/// Count a rate limit rejection and convert it.
pub(crate) fn rate_limited(relay: &TetherRelay, e: RateLimitError) -> ApiError {
    relay.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(error = %e, "rate limited");
    ApiError::RateLimited(e)
}
