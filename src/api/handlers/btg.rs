//! Break-the-glass grant endpoint.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::handlers::auth::{
    AuthState,
    principal::require_auth,
    types::{BtgGrantRequest, BtgGrantResponse},
};
use crate::btg::{BtgAccessManager, GrantError};

#[utoipa::path(
    post,
    path = "/btg/grant",
    request_body = BtgGrantRequest,
    responses(
        (status = 200, description = "Emergency access granted", body = BtgGrantResponse),
        (status = 400, description = "Minutes or reason out of bounds"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "btg"
)]
pub async fn grant(
    headers: HeaderMap,
    btg: Extension<BtgAccessManager>,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<BtgGrantRequest>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;

    let consent = btg
        .grant(
            principal.account_id,
            request.patient_id,
            request.minutes,
            &request.reason,
        )
        .await
        .map_err(|err| match err {
            GrantError::MinutesOutOfRange | GrantError::ReasonTooShort => {
                ApiError::ValidationFailed(err.to_string())
            }
            GrantError::Db(err) => ApiError::Internal(err),
        })?;

    Ok((
        StatusCode::OK,
        Json(BtgGrantResponse {
            consent_id: consent.id,
            expires_at: consent.expires_at_unix,
        }),
    )
        .into_response())
}

/// Authorization guard for protected patient records.
///
/// Clinical handlers call this before serving a record that normal consent
/// rules would withhold. The denial names the patient so emergency-access
/// refusals stay auditable and distinguishable from plain 404s.
///
/// # Errors
/// Returns `BtgAccessDenied` when no live grant exists, or an internal error
/// if the lookup fails.
pub async fn require_active_grant(
    btg: &BtgAccessManager,
    account_id: Uuid,
    patient_id: Uuid,
) -> Result<(), ApiError> {
    if btg.has_active_grant(account_id, patient_id).await? {
        Ok(())
    } else {
        Err(ApiError::BtgAccessDenied {
            patient_id,
            detail: "no active emergency access grant".to_string(),
        })
    }
}
