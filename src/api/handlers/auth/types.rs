//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_token: Option<String>,
}

/// Successful credential check either yields tokens or an MFA challenge.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens(TokenPairResponse),
    MfaChallenge(MfaChallengeResponse),
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in_seconds: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MfaChallengeResponse {
    pub mfa_required: bool,
    pub challenge_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetRequest {
    pub username_or_email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MfaSetupResponse {
    pub secret: String,
    pub otpauth_uri: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MfaConfirmRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MfaConfirmResponse {
    pub enabled: bool,
    pub recovery_codes: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryCodesResponse {
    pub recovery_codes: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MfaStatusResponse {
    pub enabled: bool,
    pub active_recovery_codes: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BtgGrantRequest {
    pub patient_id: uuid::Uuid,
    pub minutes: i64,
    pub reason: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BtgGrantResponse {
    pub consent_id: uuid::Uuid,
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn login_request_optional_fields_default() -> Result<()> {
        let request: LoginRequest = serde_json::from_value(serde_json::json!({
            "usernameOrEmail": "alice@clinic.test",
            "password": "secret",
        }))?;
        assert_eq!(request.username_or_email, "alice@clinic.test");
        assert!(request.mfa_code.is_none());
        assert!(request.challenge_token.is_none());
        Ok(())
    }

    #[test]
    fn token_pair_uses_camel_case_wire_names() -> Result<()> {
        let response = TokenPairResponse {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            token_type: "Bearer".to_string(),
            expires_in_seconds: 900,
        };
        let value = serde_json::to_value(&response)?;
        assert!(value.get("accessToken").is_some());
        assert!(value.get("refreshToken").is_some());
        assert_eq!(
            value.get("tokenType").and_then(serde_json::Value::as_str),
            Some("Bearer")
        );
        assert_eq!(
            value
                .get("expiresInSeconds")
                .and_then(serde_json::Value::as_i64),
            Some(900)
        );
        Ok(())
    }

    #[test]
    fn login_response_untagged_shapes() -> Result<()> {
        let challenge = LoginResponse::MfaChallenge(MfaChallengeResponse {
            mfa_required: true,
            challenge_token: "c".to_string(),
        });
        let value = serde_json::to_value(&challenge)?;
        assert_eq!(
            value.get("mfaRequired").and_then(serde_json::Value::as_bool),
            Some(true)
        );
        let token = value
            .get("challengeToken")
            .and_then(serde_json::Value::as_str)
            .context("missing challengeToken")?;
        assert_eq!(token, "c");
        Ok(())
    }

    #[test]
    fn btg_grant_request_round_trips() -> Result<()> {
        let patient = uuid::Uuid::new_v4();
        let request: BtgGrantRequest = serde_json::from_value(serde_json::json!({
            "patientId": patient,
            "minutes": 30,
            "reason": "unconscious on arrival",
        }))?;
        assert_eq!(request.patient_id, patient);
        assert_eq!(request.minutes, 30);
        Ok(())
    }
}
