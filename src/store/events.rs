use chrono::{DateTime, Utc};

use super::pool::{Database, DatabaseError};

/// How loud an admin-visible event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

impl EventSeverity {
    fn as_str(&self) -> &'static str {
        match self {
            EventSeverity::Info => "info",
            EventSeverity::Warning => "warning",
            EventSeverity::Error => "error",
        }
    }
}

/// An append-only admin-visible log entry, distinct from `tracing` output:
/// this is the subset surfaced to operators without tailing process logs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdminEvent {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub severity: String,
    pub message: String,
    pub channel_id: Option<i64>,
    pub feed_source_id: Option<i64>,
}

impl Database {
    pub async fn record_event(
        &self,
        severity: EventSeverity,
        message: &str,
        channel_id: Option<i64>,
        feed_source_id: Option<i64>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO events (severity, message, channel_id, feed_source_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(severity.as_str())
        .bind(message)
        .bind(channel_id)
        .bind(feed_source_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_events(&self, limit: i64) -> Result<Vec<AdminEvent>, DatabaseError> {
        sqlx::query_as::<_, AdminEvent>(
            "SELECT * FROM events ORDER BY ts DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)
    }
}
