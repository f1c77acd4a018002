//! Credential authentication, token lifecycle, and password management.
//!
//! Flow Overview:
//! 1) `login` verifies credentials; MFA-enabled accounts get a signed
//!    challenge token instead of a token pair.
//! 2) The second `login` call presents the challenge token plus a TOTP or
//!    recovery code and receives the pair.
//! 3) `refresh` rotates single-use refresh tokens; `logout` revokes the
//!    current session.
//!
//! Security boundaries:
//! - Credential failures are indistinguishable whether or not the account
//!   exists (dummy-hash verification, uniform error).
//! - No server-side state exists between the two login steps; the challenge
//!   token itself carries the binding.
//! - Changing or resetting a password revokes standing sessions.

pub(crate) mod password;
pub mod principal;
pub mod state;
pub(crate) mod storage;
pub mod types;
pub(crate) mod utils;

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub use state::{AuthConfig, AuthState};

use crate::api::error::ApiError;
use crate::api::handlers::mfa::consume_recovery_code;
use crate::tokens::{TokenKind, unix_now};
use crate::totp::valid_code_format;
use principal::require_auth;
use storage::AccountRecord;
use types::{
    ChangePasswordRequest, LoginRequest, LoginResponse, MfaChallengeResponse,
    PasswordResetConfirmRequest, PasswordResetRequest, RefreshRequest, TokenPairResponse,
};
use utils::{
    extract_client_ip, extract_user_agent, generate_reset_token, hash_refresh_token,
    hash_reset_token, normalize_identifier, valid_email,
};

/// Mint a session row plus its access/refresh pair.
async fn issue_token_pair(
    pool: &PgPool,
    auth_state: &AuthState,
    account_id: Uuid,
    client_ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<TokenPairResponse, ApiError> {
    let now = unix_now();
    // The session id goes into both tokens, so it is chosen before signing.
    let session_id = Uuid::new_v4();
    let refresh_token = auth_state
        .tokens()
        .issue_refresh(account_id, session_id, now)
        .map_err(|err| ApiError::Internal(err.into()))?;
    let access_token = auth_state
        .tokens()
        .issue_access(account_id, session_id, now)
        .map_err(|err| ApiError::Internal(err.into()))?;

    storage::insert_session(
        pool,
        session_id,
        account_id,
        &hash_refresh_token(&refresh_token),
        auth_state.config().refresh_ttl_seconds(),
        client_ip,
        user_agent,
    )
    .await?;

    Ok(TokenPairResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in_seconds: auth_state.config().access_ttl_seconds(),
    })
}

/// Check a second factor: 6-digit codes go through TOTP, anything else is
/// tried as a one-time recovery code.
async fn verify_second_factor(
    pool: &PgPool,
    auth_state: &AuthState,
    account: &AccountRecord,
    code: &str,
) -> Result<bool, ApiError> {
    if valid_code_format(code) {
        let Some(secret) = account.totp_secret.as_deref() else {
            return Ok(false);
        };
        return Ok(auth_state.totp().verify(secret, code));
    }
    consume_recovery_code(pool, account.id, code, auth_state.recovery_pepper()).await
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair or MFA challenge", body = LoginResponse),
        (status = 401, description = "Invalid credentials or MFA code"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let client_ip = extract_client_ip(&headers);
    let user_agent = extract_user_agent(&headers);
    let identifier = normalize_identifier(&request.username_or_email);

    let account = storage::lookup_account_by_identifier(&pool, &identifier).await?;
    let password_ok = password::verify_or_dummy(
        &request.password,
        account.as_ref().map(|a| a.password_hash.as_str()),
    );
    let Some(account) = account.filter(|_| password_ok) else {
        warn!(
            target: "audit",
            event = "login_failure",
            identifier = %identifier,
            client_ip = client_ip.as_deref().unwrap_or("")
        );
        return Err(ApiError::InvalidCredentials);
    };

    if account.mfa_enabled {
        let (Some(challenge_token), Some(mfa_code)) =
            (request.challenge_token.as_deref(), request.mfa_code.as_deref())
        else {
            // First step done: hand back a stateless challenge instead of tokens.
            let challenge_token = auth_state
                .tokens()
                .issue_challenge(account.id, unix_now())
                .map_err(|err| ApiError::Internal(err.into()))?;
            return Ok((
                StatusCode::OK,
                Json(LoginResponse::MfaChallenge(MfaChallengeResponse {
                    mfa_required: true,
                    challenge_token,
                })),
            )
                .into_response());
        };

        let claims = auth_state
            .tokens()
            .validate(challenge_token, TokenKind::MfaChallenge, unix_now())
            .map_err(|_| ApiError::InvalidOrExpiredToken)?;
        if claims.sub != account.id {
            return Err(ApiError::InvalidOrExpiredToken);
        }
        if !verify_second_factor(&pool, &auth_state, &account, mfa_code).await? {
            warn!(
                target: "audit",
                event = "mfa_failure",
                account_id = %account.id,
                client_ip = client_ip.as_deref().unwrap_or("")
            );
            // The challenge token stays valid; the caller may retry within
            // its expiry, bounded by the login rate buckets.
            return Err(ApiError::InvalidMfaCode);
        }
    }

    let pair = issue_token_pair(
        &pool,
        &auth_state,
        account.id,
        client_ip.as_deref(),
        user_agent.as_deref(),
    )
    .await?;
    info!(
        target: "audit",
        event = "login_success",
        account_id = %account.id,
        mfa = account.mfa_enabled
    );
    Ok((StatusCode::OK, Json(LoginResponse::Tokens(pair))).into_response())
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenPairResponse),
        (status = 401, description = "Invalid, expired, or already-rotated token")
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Response, ApiError> {
    let claims = auth_state
        .tokens()
        .validate(&request.refresh_token, TokenKind::Refresh, unix_now())
        .map_err(|_| ApiError::InvalidOrExpiredToken)?;
    let session_id = claims.sid.ok_or(ApiError::InvalidOrExpiredToken)?;

    // Single-use rotation: only the caller that wins this conditional update
    // gets a new pair; a replayed token finds the row already revoked.
    let refresh_hash = hash_refresh_token(&request.refresh_token);
    let Some(account_id) =
        storage::revoke_session_for_rotation(&pool, session_id, &refresh_hash).await?
    else {
        warn!(
            target: "audit",
            event = "refresh_rejected",
            session_id = %session_id
        );
        return Err(ApiError::InvalidOrExpiredToken);
    };

    let client_ip = extract_client_ip(&headers);
    let user_agent = extract_user_agent(&headers);
    let pair = issue_token_pair(
        &pool,
        &auth_state,
        account_id,
        client_ip.as_deref(),
        user_agent.as_deref(),
    )
    .await?;
    Ok((StatusCode::OK, Json(pair)).into_response())
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing or invalid access token")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    // Idempotent: revoking an already-revoked session is a no-op.
    storage::revoke_session(&pool, principal.session_id).await?;
    info!(
        target: "audit",
        event = "logout",
        account_id = %principal.account_id,
        session_id = %principal.session_id
    );
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[utoipa::path(
    post,
    path = "/auth/password/change",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed, other sessions revoked"),
        (status = 400, description = "New password rejected"),
        (status = 401, description = "Current password or token invalid")
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;

    let account = storage::lookup_account_by_id(&pool, principal.account_id)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;
    if !password::verify_password(&request.current_password, &account.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }
    if !password::acceptable_password(&request.new_password) {
        return Err(ApiError::ValidationFailed(format!(
            "password must be at least {} characters",
            password::MIN_PASSWORD_CHARS
        )));
    }

    let new_hash = password::hash_password(&request.new_password)?;
    storage::update_password_hash(&pool, account.id, &new_hash).await?;

    // A password change invalidates every other standing session.
    let revoked =
        storage::revoke_account_sessions(&pool, account.id, Some(principal.session_id)).await?;
    info!(
        target: "audit",
        event = "password_change",
        account_id = %account.id,
        sessions_revoked = revoked
    );
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[utoipa::path(
    post,
    path = "/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Accepted whether or not the account exists"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn password_reset_request(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Response, ApiError> {
    let identifier = normalize_identifier(&request.username_or_email);

    // Identifiers with an '@' that are not well-formed emails can never
    // match an account; skip the lookup but keep the response uniform.
    if identifier.contains('@') && !valid_email(&identifier) {
        return Ok(StatusCode::ACCEPTED.into_response());
    }

    // Always 202: the response must not reveal whether the account exists.
    if let Some(account) = storage::lookup_account_by_identifier(&pool, &identifier).await? {
        let token = generate_reset_token()?;
        storage::insert_password_reset(
            &pool,
            account.id,
            &hash_reset_token(&token),
            auth_state.config().reset_token_ttl_seconds(),
        )
        .await?;
        // The raw token leaves the process only through the out-of-band
        // delivery channel, never through this response or the logs.
        info!(
            target: "audit",
            event = "password_reset_requested",
            account_id = %account.id
        );
    }
    Ok(StatusCode::ACCEPTED.into_response())
}

#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 204, description = "Password reset, all sessions revoked"),
        (status = 400, description = "New password rejected"),
        (status = 401, description = "Token invalid, expired, or already used")
    ),
    tag = "auth"
)]
pub async fn password_reset_confirm(
    pool: Extension<PgPool>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Response, ApiError> {
    if !password::acceptable_password(&request.new_password) {
        return Err(ApiError::ValidationFailed(format!(
            "password must be at least {} characters",
            password::MIN_PASSWORD_CHARS
        )));
    }

    // Consuming is atomic; a second confirm with the same token fails here.
    let token_hash = hash_reset_token(&request.token);
    let Some(account_id) = storage::consume_password_reset(&pool, &token_hash).await? else {
        return Err(ApiError::InvalidOrExpiredToken);
    };

    let new_hash = password::hash_password(&request.new_password)?;
    storage::update_password_hash(&pool, account_id, &new_hash).await?;
    let revoked = storage::revoke_account_sessions(&pool, account_id, None).await?;
    info!(
        target: "audit",
        event = "password_reset_confirmed",
        account_id = %account_id,
        sessions_revoked = revoked
    );
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::types::{LoginResponse, MfaChallengeResponse, TokenPairResponse};

    #[test]
    fn login_response_serializes_both_arms() {
        let tokens = LoginResponse::Tokens(TokenPairResponse {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            token_type: "Bearer".to_string(),
            expires_in_seconds: 900,
        });
        let value = serde_json::to_value(&tokens).expect("serialize");
        assert!(value.get("accessToken").is_some());
        assert!(value.get("mfaRequired").is_none());

        let challenge = LoginResponse::MfaChallenge(MfaChallengeResponse {
            mfa_required: true,
            challenge_token: "c".to_string(),
        });
        let value = serde_json::to_value(&challenge).expect("serialize");
        assert!(value.get("mfaRequired").is_some());
        assert!(value.get("accessToken").is_none());
    }
}
