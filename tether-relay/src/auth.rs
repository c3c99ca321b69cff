//! Bearer token authentication.
//!
//! The relay does not manage accounts. It asks an [`IdentityVerifier`] to
//! turn a bearer token into an [`Identity`]; the bundled [`StaticTokens`]
//! verifier reads a token table from the configuration.
//!
//! Tokens are accepted from the `Authorization: Bearer <token>` header or,
//! for browser WebSocket clients that cannot set headers, a `token` query
//! parameter.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user identifier.
    pub user_id: String,
}

/// Resolves bearer tokens to identities.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Return the identity behind `token`, or `None` if it is not valid.
    async fn verify(&self, token: &str) -> Option<Identity>;
}

/// Verifier backed by a fixed token table.
pub struct StaticTokens {
    tokens: HashMap<String, String>,
}

impl std::fmt::Debug for StaticTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokens")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl StaticTokens {
    /// Build from the `[auth]` section.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            tokens: config.tokens.clone(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokens {
    async fn verify(&self, token: &str) -> Option<Identity> {
        // Compare against every entry so timing does not reveal a prefix match.
        let mut found = None;
        for (candidate, user_id) in &self.tokens {
            if bool::from(candidate.as_bytes().ct_eq(token.as_bytes())) {
                found = Some(user_id);
            }
        }
        found.map(|user_id| Identity {
            user_id: user_id.clone(),
        })
    }
}

/// Extract a bearer token from the request headers, falling back to `query_token`.
pub fn bearer_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    from_header
        .or_else(|| query_token.filter(|token| !token.is_empty()))
        .map(str::to_string)
}
