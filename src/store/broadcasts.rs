use chrono::{DateTime, Utc};

use super::pool::{Database, DatabaseError};

/// Unified queue + delivery log. `broadcasted_time IS NULL`
/// means queued; non-null means delivered.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BroadcastEntry {
    pub feed_id: i64,
    pub channel_id: i64,
    pub broadcasted_time: Option<DateTime<Utc>>,
}

impl Database {
    /// Idempotent: a `(feed_id, channel_id)` pair can only ever occupy one
    /// row, so re-enqueueing an already-queued or already-delivered pair is
    /// a no-op.
    pub async fn enqueue_broadcast(
        &self,
        feed_id: i64,
        channel_id: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO broadcasts (feed_id, channel_id) VALUES ($1, $2) \
             ON CONFLICT (feed_id, channel_id) DO NOTHING",
        )
        .bind(feed_id)
        .bind(channel_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn queue_depth(&self, channel_id: i64) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT count(*) FROM broadcasts WHERE channel_id = $1 AND broadcasted_time IS NULL",
        )
        .bind(channel_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Up to `limit` queued entries for a channel, oldest article first by
    /// publication date with a stable secondary order by article id.
    pub async fn claim_queued(
        &self,
        channel_id: i64,
        limit: i64,
    ) -> Result<Vec<BroadcastEntry>, DatabaseError> {
        sqlx::query_as::<_, BroadcastEntry>(
            r#"
            SELECT b.feed_id, b.channel_id, b.broadcasted_time
            FROM broadcasts b
            JOIN feeds f ON f.id = b.feed_id
            WHERE b.channel_id = $1 AND b.broadcasted_time IS NULL
            ORDER BY f.published DESC, b.feed_id ASC
            LIMIT $2
            "#,
        )
        .bind(channel_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)
    }

    pub async fn mark_delivered(&self, feed_id: i64, channel_id: i64) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE broadcasts SET broadcasted_time = now() \
             WHERE feed_id = $1 AND channel_id = $2",
        )
        .bind(feed_id)
        .bind(channel_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop a queue entry outright without marking it delivered, used for
    /// permanent per-article failures that should not retry.
    pub async fn drop_queued(&self, feed_id: i64, channel_id: i64) -> Result<(), DatabaseError> {
        sqlx::query(
            "DELETE FROM broadcasts WHERE feed_id = $1 AND channel_id = $2 \
             AND broadcasted_time IS NULL",
        )
        .bind(feed_id)
        .bind(channel_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Purge delivered entries older than `retention_days`.
    pub async fn purge_old_broadcasts(&self, retention_days: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM broadcasts WHERE broadcasted_time IS NOT NULL \
             AND broadcasted_time < now() - ($1 || ' days')::interval",
        )
        .bind(retention_days.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Drop queue entries that were never delivered and whose article is
    /// older than `retention_days` — a channel that has been inactive or
    /// deactivated should not accumulate an unbounded backlog of stale,
    /// never-sent entries.
    pub async fn purge_stale_queued(&self, retention_days: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            DELETE FROM broadcasts b
            USING feeds f
            WHERE b.feed_id = f.id
              AND b.broadcasted_time IS NULL
              AND f.published < now() - ($1 || ' days')::interval
            "#,
        )
        .bind(retention_days.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// All delivered entries for a channel within the last `days`, used
    /// by the dispatcher's cross-time duplicate suppression.
    pub async fn delivered_titles_for_channel(
        &self,
        channel_id: i64,
        days: i64,
    ) -> Result<Vec<(i64, String)>, DatabaseError> {
        let rows = sqlx::query_as(
            r#"
            SELECT f.id, f.title
            FROM broadcasts b
            JOIN feeds f ON f.id = b.feed_id
            WHERE b.channel_id = $1
              AND b.broadcasted_time IS NOT NULL
              AND b.broadcasted_time >= now() - ($2 || ' days')::interval
            "#,
        )
        .bind(channel_id)
        .bind(days.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
