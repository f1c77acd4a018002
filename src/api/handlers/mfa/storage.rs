//! Database helpers for MFA secrets and recovery codes.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// Store a freshly generated, unconfirmed secret. MFA stays disabled until
/// the first code verifies.
pub(crate) async fn store_pending_secret(
    pool: &PgPool,
    account_id: Uuid,
    secret: &str,
) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET totp_secret = $2,
            mfa_enabled = false,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(secret)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store pending TOTP secret")?;
    Ok(())
}

pub(crate) async fn enable_mfa(pool: &PgPool, account_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET mfa_enabled = true,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to enable MFA")?;
    Ok(())
}

/// Clear the secret and disable MFA in one statement.
pub(crate) async fn disable_mfa(pool: &PgPool, account_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET totp_secret = NULL,
            mfa_enabled = false,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to disable MFA")?;
    Ok(())
}

pub(crate) async fn insert_recovery_codes(
    pool: &PgPool,
    account_id: Uuid,
    code_hashes: &[String],
) -> Result<()> {
    let query = r"
        INSERT INTO recovery_codes (account_id, code_hash)
        SELECT $1, unnest($2::text[])
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(code_hashes)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert recovery codes")?;
    Ok(())
}

/// Burn every unused code for the account (MFA disable or regeneration).
pub(crate) async fn burn_unused_codes(pool: &PgPool, account_id: Uuid) -> Result<u64> {
    let query = r"
        UPDATE recovery_codes
        SET used_at = NOW()
        WHERE account_id = $1
          AND used_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(account_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to burn recovery codes")?;
    Ok(result.rows_affected())
}

/// Unused code rows for the account: `(id, hash)` pairs for verification.
pub(crate) async fn list_unused_codes(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<Vec<(Uuid, String)>> {
    let query = r"
        SELECT id, code_hash
        FROM recovery_codes
        WHERE account_id = $1
          AND used_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(account_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list recovery codes")?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get("id"), row.get("code_hash")))
        .collect())
}

/// Mark a single code used; returns false when a concurrent attempt already
/// consumed it. This is the check-then-mark step made atomic per code row.
pub(crate) async fn consume_code(pool: &PgPool, code_id: Uuid) -> Result<bool> {
    let query = r"
        UPDATE recovery_codes
        SET used_at = NOW()
        WHERE id = $1
          AND used_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(code_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to consume recovery code")?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn count_unused_codes(pool: &PgPool, account_id: Uuid) -> Result<i64> {
    let query = r"
        SELECT COUNT(*) AS remaining
        FROM recovery_codes
        WHERE account_id = $1
          AND used_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to count recovery codes")?;
    Ok(row.get("remaining"))
}
