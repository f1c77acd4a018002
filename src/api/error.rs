//! Single boundary translator from component error kinds to HTTP responses.
//!
//! Credential and MFA failures are normalized to generic messages so a caller
//! can never learn whether an account exists. Rate-limit denials carry retry
//! guidance verbatim. BTG denials name the patient because the caller is
//! already authenticated and the audit trail depends on specificity.
//! Everything unexpected becomes an opaque 500; internal detail stays in the
//! server log.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("multi-factor authentication required")]
    MfaRequired,
    #[error("invalid MFA code")]
    InvalidMfaCode,
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("too many requests for bucket {bucket}")]
    RateLimited {
        bucket: String,
        retry_after_seconds: u64,
    },
    #[error("no active emergency access grant for patient {patient_id}")]
    BtgAccessDenied { patient_id: Uuid, detail: String },
    #[error("resource not found")]
    ResourceNotFound,
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidCredentials => error_body(
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid credentials",
            ),
            Self::MfaRequired => error_body(
                StatusCode::UNAUTHORIZED,
                "mfa_required",
                "Multi-factor authentication required",
            ),
            Self::InvalidMfaCode => error_body(
                StatusCode::UNAUTHORIZED,
                "invalid_mfa_code",
                "Invalid MFA code",
            ),
            Self::InvalidOrExpiredToken => error_body(
                StatusCode::UNAUTHORIZED,
                "invalid_or_expired_token",
                "Invalid or expired token",
            ),
            Self::RateLimited {
                bucket,
                retry_after_seconds,
            } => rate_limited_response(&bucket, retry_after_seconds),
            Self::BtgAccessDenied { patient_id, detail } => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "btg_access_denied",
                    "patientId": patient_id,
                    "message": detail,
                })),
            )
                .into_response(),
            Self::ResourceNotFound => {
                error_body(StatusCode::NOT_FOUND, "not_found", "Resource not found")
            }
            Self::ValidationFailed(message) => {
                error_body(StatusCode::BAD_REQUEST, "validation_failed", &message)
            }
            Self::Internal(err) => {
                error!("Internal error: {err:#}");
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        }
    }
}

fn error_body(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": code, "message": message })),
    )
        .into_response()
}

/// 429 with `Retry-After` and the structured body the gate promises.
pub(crate) fn rate_limited_response(bucket: &str, retry_after_seconds: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "too_many_requests",
            "bucket": bucket,
            "retryAfterSeconds": retry_after_seconds,
        })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
        response.headers_mut().insert(RETRY_AFTER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_map_to_401() {
        assert_eq!(
            ApiError::InvalidCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::InvalidMfaCode.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::InvalidOrExpiredToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn rate_limited_sets_retry_after_header() {
        let response = ApiError::RateLimited {
            bucket: "login-ip".to_string(),
            retry_after_seconds: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("42")
        );
    }

    #[test]
    fn btg_denial_is_403_with_patient_context() {
        let patient = Uuid::new_v4();
        let response = ApiError::BtgAccessDenied {
            patient_id: patient,
            detail: "no active grant".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn validation_maps_to_400_and_internal_to_500() {
        assert_eq!(
            ApiError::ValidationFailed("minutes out of range".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom"))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
