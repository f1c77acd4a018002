//! Multi-factor authentication enrollment, verification, and recovery codes.
//!
//! Flow Overview:
//! 1) `setup` stores an unconfirmed secret and returns the enrollment URI.
//! 2) `confirm` proves possession with a first code, enables MFA, and
//!    returns the recovery codes exactly once.
//! 3) `disable` clears the secret and burns all unused recovery codes.
//!
//! Security boundaries:
//! - Plaintext recovery codes exist only in the response that creates them.
//! - Consuming a recovery code is atomic per code row, so a replayed code
//!   can never succeed twice.

pub(crate) mod recovery;
pub(crate) mod storage;

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

use crate::api::error::ApiError;
use crate::api::handlers::auth::{
    AuthState,
    principal::require_auth,
    types::{
        MfaConfirmRequest, MfaConfirmResponse, MfaSetupResponse, MfaStatusResponse,
        RecoveryCodesResponse,
    },
};

/// Try to consume a recovery code for the account. Returns false for
/// malformed, unknown, or already-used codes.
///
/// # Errors
/// Returns an error only on storage failures; a losing race is `Ok(false)`.
pub(crate) async fn consume_recovery_code(
    pool: &PgPool,
    account_id: Uuid,
    code: &str,
    pepper: Option<&[u8]>,
) -> Result<bool, ApiError> {
    if recovery::normalize_recovery_code(code).is_err() {
        return Ok(false);
    }
    let candidates = storage::list_unused_codes(pool, account_id).await?;
    for (code_id, hash) in candidates {
        if !recovery::verify_recovery_code(code, &hash, pepper).unwrap_or(false) {
            continue;
        }
        // A concurrent replay may have consumed this row between the list
        // and this update; the conditional update decides the winner.
        if storage::consume_code(pool, code_id).await? {
            info!(
                target: "audit",
                event = "recovery_code_used",
                account_id = %account_id
            );
            return Ok(true);
        }
    }
    Ok(false)
}

#[utoipa::path(
    post,
    path = "/mfa/setup",
    responses(
        (status = 200, description = "Enrollment started", body = MfaSetupResponse),
        (status = 400, description = "MFA already enabled"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "mfa"
)]
pub async fn setup(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    let account = crate::api::handlers::auth::storage::lookup_account_by_id(
        &pool,
        principal.account_id,
    )
    .await?
    .ok_or(ApiError::ResourceNotFound)?;

    if account.mfa_enabled {
        return Err(ApiError::ValidationFailed(
            "MFA is already enabled".to_string(),
        ));
    }

    let secret = auth_state.totp().generate_secret()?;
    storage::store_pending_secret(&pool, account.id, &secret).await?;
    let enrollment = auth_state.totp().enrollment(&secret, &account.username)?;

    Ok((
        StatusCode::OK,
        Json(MfaSetupResponse {
            secret: enrollment.secret,
            otpauth_uri: enrollment.otpauth_uri,
        }),
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/mfa/confirm",
    request_body = MfaConfirmRequest,
    responses(
        (status = 200, description = "MFA enabled, recovery codes shown once", body = MfaConfirmResponse),
        (status = 400, description = "No pending enrollment"),
        (status = 401, description = "Invalid code")
    ),
    tag = "mfa"
)]
pub async fn confirm(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<MfaConfirmRequest>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    let account = crate::api::handlers::auth::storage::lookup_account_by_id(
        &pool,
        principal.account_id,
    )
    .await?
    .ok_or(ApiError::ResourceNotFound)?;

    if account.mfa_enabled {
        return Err(ApiError::ValidationFailed(
            "MFA is already enabled".to_string(),
        ));
    }
    let Some(secret) = account.totp_secret.as_deref() else {
        return Err(ApiError::ValidationFailed(
            "no pending MFA enrollment".to_string(),
        ));
    };

    if !auth_state.totp().verify(secret, &request.code) {
        warn!(
            target: "audit",
            event = "mfa_confirm_failure",
            account_id = %account.id
        );
        return Err(ApiError::InvalidMfaCode);
    }

    let batch = recovery::RecoveryCodeBatch::generate(auth_state.recovery_pepper())?;
    // Stale codes from an earlier enrollment must not survive this one.
    storage::burn_unused_codes(&pool, account.id).await?;
    storage::insert_recovery_codes(&pool, account.id, &batch.code_hashes).await?;
    storage::enable_mfa(&pool, account.id).await?;

    info!(
        target: "audit",
        event = "mfa_enabled",
        account_id = %account.id
    );

    Ok((
        StatusCode::OK,
        Json(MfaConfirmResponse {
            enabled: true,
            recovery_codes: batch.codes,
        }),
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/mfa/disable",
    responses(
        (status = 204, description = "MFA disabled, unused recovery codes burned"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "mfa"
)]
pub async fn disable(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    storage::disable_mfa(&pool, principal.account_id).await?;
    let burned = storage::burn_unused_codes(&pool, principal.account_id).await?;
    info!(
        target: "audit",
        event = "mfa_disabled",
        account_id = %principal.account_id,
        codes_burned = burned
    );
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[utoipa::path(
    post,
    path = "/mfa/recovery-codes/regenerate",
    responses(
        (status = 200, description = "Fresh batch, prior unused codes invalidated", body = RecoveryCodesResponse),
        (status = 400, description = "MFA not enabled"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "mfa"
)]
pub async fn regenerate_recovery_codes(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    let account = crate::api::handlers::auth::storage::lookup_account_by_id(
        &pool,
        principal.account_id,
    )
    .await?
    .ok_or(ApiError::ResourceNotFound)?;

    if !account.mfa_enabled {
        return Err(ApiError::ValidationFailed("MFA is not enabled".to_string()));
    }

    let batch = recovery::RecoveryCodeBatch::generate(auth_state.recovery_pepper())?;
    storage::burn_unused_codes(&pool, account.id).await?;
    storage::insert_recovery_codes(&pool, account.id, &batch.code_hashes).await?;

    info!(
        target: "audit",
        event = "recovery_codes_regenerated",
        account_id = %account.id
    );

    Ok((
        StatusCode::OK,
        Json(RecoveryCodesResponse {
            recovery_codes: batch.codes,
        }),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/mfa/status",
    responses(
        (status = 200, description = "MFA state for the current account", body = MfaStatusResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "mfa"
)]
pub async fn status(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    let account = crate::api::handlers::auth::storage::lookup_account_by_id(
        &pool,
        principal.account_id,
    )
    .await?
    .ok_or(ApiError::ResourceNotFound)?;
    let active_recovery_codes = storage::count_unused_codes(&pool, account.id).await?;
    Ok((
        StatusCode::OK,
        Json(MfaStatusResponse {
            enabled: account.mfa_enabled,
            active_recovery_codes,
        }),
    )
        .into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::recovery::{RecoveryCodeBatch, verify_recovery_code};
    use std::collections::HashSet;

    // Mirrors the consume semantics of `consume_recovery_code`: verify against
    // unused hashes, then mark the winner used.
    struct InMemoryRecoveryStore {
        hashes: Vec<String>,
        used: HashSet<String>,
    }

    impl InMemoryRecoveryStore {
        fn from_batch(batch: &RecoveryCodeBatch) -> Self {
            Self {
                hashes: batch.code_hashes.clone(),
                used: HashSet::new(),
            }
        }

        fn consume(&mut self, code: &str, pepper: Option<&[u8]>) -> bool {
            for hash in &self.hashes {
                if self.used.contains(hash) {
                    continue;
                }
                if verify_recovery_code(code, hash, pepper).unwrap_or(false) {
                    self.used.insert(hash.clone());
                    return true;
                }
            }
            false
        }
    }

    #[test]
    fn recovery_code_consumed_at_most_once() {
        let batch = RecoveryCodeBatch::generate(None).unwrap();
        let mut store = InMemoryRecoveryStore::from_batch(&batch);
        let code = batch.codes[0].clone();

        assert!(store.consume(&code, None));
        assert!(!store.consume(&code, None));
        // Other codes in the batch are unaffected.
        assert!(store.consume(&batch.codes[1], None));
    }

    #[test]
    fn regeneration_invalidates_old_codes() {
        let first = RecoveryCodeBatch::generate(None).unwrap();
        let second = RecoveryCodeBatch::generate(None).unwrap();
        // Regeneration replaces the stored hashes wholesale; old plaintext
        // codes no longer match anything.
        let mut store = InMemoryRecoveryStore::from_batch(&second);
        assert!(!store.consume(&first.codes[0], None));
        assert!(store.consume(&second.codes[0], None));
    }
}
