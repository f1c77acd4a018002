//! Break-the-glass (BTG) emergency access grants.
//!
//! A grant lets an authenticated clinician bypass normal consent checks on a
//! protected patient record for a bounded number of minutes, with a mandatory
//! reason captured for audit. Grants are never mutated after creation and end
//! only by expiry; there is deliberately no revocation API.

use anyhow::Context;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{Instrument, info};
use uuid::Uuid;

pub const MIN_MINUTES: i64 = 1;
pub const MAX_MINUTES: i64 = 120;
pub const MIN_REASON_CHARS: usize = 3;

#[derive(Debug, Error)]
pub enum GrantError {
    #[error("minutes must be between {MIN_MINUTES} and {MAX_MINUTES}")]
    MinutesOutOfRange,
    #[error("reason must be at least {MIN_REASON_CHARS} characters")]
    ReasonTooShort,
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

/// A freshly created consent, returned to the grantor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consent {
    pub id: Uuid,
    pub expires_at_unix: i64,
}

/// Validate the requested duration without touching storage.
///
/// # Errors
/// Returns `MinutesOutOfRange` outside `[MIN_MINUTES, MAX_MINUTES]`.
pub fn validate_minutes(minutes: i64) -> Result<(), GrantError> {
    if (MIN_MINUTES..=MAX_MINUTES).contains(&minutes) {
        Ok(())
    } else {
        Err(GrantError::MinutesOutOfRange)
    }
}

/// Validate the audit reason without touching storage.
///
/// # Errors
/// Returns `ReasonTooShort` when the trimmed reason is under the minimum.
pub fn validate_reason(reason: &str) -> Result<(), GrantError> {
    if reason.trim().chars().count() >= MIN_REASON_CHARS {
        Ok(())
    } else {
        Err(GrantError::ReasonTooShort)
    }
}

/// A consent is active strictly before its expiry instant.
#[must_use]
pub fn active_at(expires_at_unix: i64, now_unix: i64) -> bool {
    now_unix < expires_at_unix
}

/// Creates and checks emergency access grants backed by `btg_consents`.
#[derive(Clone, Debug)]
pub struct BtgAccessManager {
    pool: PgPool,
}

impl BtgAccessManager {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a grant for `(account, patient)` expiring `minutes` from now.
    ///
    /// # Errors
    /// Returns a validation error for out-of-range inputs, or a database
    /// error if the insert fails.
    pub async fn grant(
        &self,
        account_id: Uuid,
        patient_id: Uuid,
        minutes: i64,
        reason: &str,
    ) -> Result<Consent, GrantError> {
        validate_minutes(minutes)?;
        validate_reason(reason)?;

        let query = r"
            INSERT INTO btg_consents (patient_id, account_id, reason, expires_at)
            VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 minute'))
            RETURNING id, EXTRACT(EPOCH FROM expires_at)::bigint AS expires_at_unix
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(patient_id)
            .bind(account_id)
            .bind(reason.trim())
            .bind(minutes)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert BTG consent")?;

        let consent = Consent {
            id: row.get("id"),
            expires_at_unix: row.get("expires_at_unix"),
        };

        info!(
            target: "audit",
            event = "btg_grant",
            account_id = %account_id,
            patient_id = %patient_id,
            consent_id = %consent.id,
            minutes
        );

        Ok(consent)
    }

    /// True iff a non-expired consent exists for `(account, patient)`.
    ///
    /// # Errors
    /// Returns an error if the lookup fails.
    pub async fn has_active_grant(
        &self,
        account_id: Uuid,
        patient_id: Uuid,
    ) -> anyhow::Result<bool> {
        let query = r"
            SELECT EXISTS (
                SELECT 1
                FROM btg_consents
                WHERE account_id = $1
                  AND patient_id = $2
                  AND expires_at > NOW()
            ) AS active
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .bind(patient_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check BTG consent")?;
        Ok(row.get("active"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_bounds_enforced() {
        assert!(validate_minutes(1).is_ok());
        assert!(validate_minutes(120).is_ok());
        assert!(matches!(
            validate_minutes(0),
            Err(GrantError::MinutesOutOfRange)
        ));
        assert!(matches!(
            validate_minutes(121),
            Err(GrantError::MinutesOutOfRange)
        ));
        assert!(matches!(
            validate_minutes(-5),
            Err(GrantError::MinutesOutOfRange)
        ));
    }

    #[test]
    fn reason_must_carry_content() {
        assert!(validate_reason("fall in ward 3").is_ok());
        assert!(validate_reason("abc").is_ok());
        assert!(matches!(
            validate_reason("ab"),
            Err(GrantError::ReasonTooShort)
        ));
        assert!(matches!(
            validate_reason("  a  "),
            Err(GrantError::ReasonTooShort)
        ));
    }

    #[test]
    fn grant_window_is_half_open() {
        let issued = 1_700_000_000;
        let expires = issued + 30 * 60;
        assert!(active_at(expires, issued));
        assert!(active_at(expires, expires - 1));
        assert!(!active_at(expires, expires));
        assert!(!active_at(expires, expires + 1));
    }
}
