//! Append-only security incident recording.
//!
//! Incidents are diagnostic, never authoritative: every write is best-effort
//! and failures are swallowed after a log line so the triggering request's
//! outcome is unaffected. Each record is also emitted as a structured
//! `target: "audit"` tracing event so incidents remain visible even when the
//! database sink is down.

use sqlx::PgPool;
use tracing::{Instrument, error, warn};

/// Incident severity recorded alongside the category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Writes incidents to the `security_incidents` table, fire-and-forget.
#[derive(Clone, Debug)]
pub struct IncidentLog {
    pool: PgPool,
}

impl IncidentLog {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an incident. Never returns an error; persistence failures are
    /// logged and dropped.
    pub async fn record(&self, severity: Severity, category: &str, description: &str) {
        warn!(
            target: "audit",
            event = "security_incident",
            severity = severity.as_str(),
            category,
            description
        );

        let query = r"
            INSERT INTO security_incidents (severity, category, description)
            VALUES ($1, $2, $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        if let Err(err) = sqlx::query(query)
            .bind(severity.as_str())
            .bind(category)
            .bind(description)
            .execute(&self.pool)
            .instrument(span)
            .await
        {
            error!("Failed to persist security incident: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Severity;

    #[test]
    fn severity_as_str_values() {
        assert_eq!(Severity::Low.as_str(), "low");
        assert_eq!(Severity::Medium.as_str(), "medium");
        assert_eq!(Severity::High.as_str(), "high");
    }
}
