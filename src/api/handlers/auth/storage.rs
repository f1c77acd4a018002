//! Database helpers for accounts, sessions, and password reset state.
//!
//! Every "consume exactly once" operation (refresh rotation, reset token
//! consumption) is a single conditional UPDATE so the database serializes
//! concurrent attempts per row; only one caller observes the returned row.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// Account fields needed by the auth and MFA flows.
pub(crate) struct AccountRecord {
    pub(crate) id: Uuid,
    pub(crate) username: String,
    pub(crate) password_hash: String,
    pub(crate) totp_secret: Option<String>,
    pub(crate) mfa_enabled: bool,
}

/// Look up an account by normalized username or email.
pub(crate) async fn lookup_account_by_identifier(
    pool: &PgPool,
    identifier: &str,
) -> Result<Option<AccountRecord>> {
    let query = r"
        SELECT id, username, password_hash, totp_secret, mfa_enabled
        FROM accounts
        WHERE username = $1 OR email = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(identifier)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup account")?;

    Ok(row.map(|row| AccountRecord {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        totp_secret: row.get("totp_secret"),
        mfa_enabled: row.get("mfa_enabled"),
    }))
}

pub(crate) async fn lookup_account_by_id(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<Option<AccountRecord>> {
    let query = r"
        SELECT id, username, password_hash, totp_secret, mfa_enabled
        FROM accounts
        WHERE id = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup account by id")?;

    Ok(row.map(|row| AccountRecord {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        totp_secret: row.get("totp_secret"),
        mfa_enabled: row.get("mfa_enabled"),
    }))
}

pub(crate) async fn update_password_hash(
    pool: &PgPool,
    account_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET password_hash = $2,
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
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password hash")?;
    Ok(())
}

/// Insert a session row with a caller-chosen id.
///
/// The id is generated before the refresh token is signed so the token can
/// carry it as a claim; the row stores only the token's hash.
pub(crate) async fn insert_session(
    pool: &PgPool,
    session_id: Uuid,
    account_id: Uuid,
    refresh_hash: &[u8],
    ttl_seconds: i64,
    client_ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<()> {
    let query = r"
        INSERT INTO sessions (id, account_id, refresh_hash, expires_at, client_ip, user_agent)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'), $5, $6)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_id)
        .bind(account_id)
        .bind(refresh_hash)
        .bind(ttl_seconds)
        .bind(client_ip)
        .bind(user_agent)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert session")?;
    Ok(())
}

/// Atomically revoke a session for refresh rotation.
///
/// Succeeds at most once per session: the row must match the presented
/// token's hash, be unrevoked, and be unexpired. Returns the owning account
/// id when this caller won the rotation.
pub(crate) async fn revoke_session_for_rotation(
    pool: &PgPool,
    session_id: Uuid,
    refresh_hash: &[u8],
) -> Result<Option<Uuid>> {
    let query = r"
        UPDATE sessions
        SET revoked_at = NOW()
        WHERE id = $1
          AND refresh_hash = $2
          AND revoked_at IS NULL
          AND expires_at > NOW()
        RETURNING account_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(session_id)
        .bind(refresh_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to rotate session")?;
    Ok(row.map(|row| row.get("account_id")))
}

/// Revoke one session; idempotent, revoked sessions stay revoked.
pub(crate) async fn revoke_session(pool: &PgPool, session_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE sessions
        SET revoked_at = NOW()
        WHERE id = $1
          AND revoked_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke session")?;
    Ok(())
}

/// Revoke every active session of an account except `keep`, if given.
///
/// Password changes pass the current session so the caller stays signed in;
/// password resets pass `None` and sweep everything.
pub(crate) async fn revoke_account_sessions(
    pool: &PgPool,
    account_id: Uuid,
    keep: Option<Uuid>,
) -> Result<u64> {
    let query = r"
        UPDATE sessions
        SET revoked_at = NOW()
        WHERE account_id = $1
          AND revoked_at IS NULL
          AND ($2::uuid IS NULL OR id <> $2)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(account_id)
        .bind(keep)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke account sessions")?;
    Ok(result.rows_affected())
}

pub(crate) async fn insert_password_reset(
    pool: &PgPool,
    account_id: Uuid,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO password_reset_tokens (account_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(token_hash)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert password reset token")?;
    Ok(())
}

/// Consume a reset token exactly once; expired or already-consumed tokens
/// return `None`.
pub(crate) async fn consume_password_reset(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<Uuid>> {
    let query = r"
        UPDATE password_reset_tokens
        SET consumed_at = NOW()
        WHERE token_hash = $1
          AND consumed_at IS NULL
          AND expires_at > NOW()
        RETURNING account_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume password reset token")?;
    Ok(row.map(|row| row.get("account_id")))
}

#[cfg(test)]
mod tests {
    use super::AccountRecord;
    use uuid::Uuid;

    #[test]
    fn account_record_holds_values() {
        let record = AccountRecord {
            id: Uuid::nil(),
            username: "drbob".to_string(),
            password_hash: "$argon2id$...".to_string(),
            totp_secret: None,
            mfa_enabled: false,
        };
        assert_eq!(record.id, Uuid::nil());
        assert_eq!(record.username, "drbob");
        assert!(!record.mfa_enabled);
        assert!(record.totp_secret.is_none());
    }
}
