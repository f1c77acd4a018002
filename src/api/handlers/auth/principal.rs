//! Authenticated principal extraction from bearer access tokens.
//!
//! Access tokens are validated offline (signature + expiry); revocation is
//! only enforced for refresh tokens, so a revoked session's access token
//! remains usable until its short TTL runs out.

use axum::http::HeaderMap;
use uuid::Uuid;

use super::state::AuthState;
use super::utils::extract_bearer_token;
use crate::api::error::ApiError;
use crate::tokens::{TokenKind, unix_now};

/// Authenticated account context derived from the access token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub account_id: Uuid,
    pub session_id: Uuid,
}

/// Resolve the `Authorization` header into a principal, or fail with the
/// token error kind.
///
/// # Errors
/// Returns `InvalidOrExpiredToken` when the header is missing, malformed, or
/// the token does not validate as an access token.
pub fn require_auth(headers: &HeaderMap, state: &AuthState) -> Result<Principal, ApiError> {
    let token = extract_bearer_token(headers).ok_or(ApiError::InvalidOrExpiredToken)?;
    let claims = state
        .tokens()
        .validate(&token, TokenKind::Access, unix_now())
        .map_err(|_| ApiError::InvalidOrExpiredToken)?;
    let session_id = claims.sid.ok_or(ApiError::InvalidOrExpiredToken)?;
    Ok(Principal {
        account_id: claims.sub,
        session_id,
    })
}
