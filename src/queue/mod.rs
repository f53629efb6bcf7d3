//! Maintains the BroadcastEntry queue.

use crate::error::CoreError;
use crate::store::Database;

/// Thin wrapper over the store's broadcast-entry operations. Kept as its
/// own component (rather than folded into `Database`) because the
/// Scorer, Dispatcher, and CLI all call it and its idempotence contract
/// is part of the public pipeline surface, not just storage plumbing.
pub struct QueueManager;

impl QueueManager {
    pub fn new() -> Self {
        Self
    }

    /// Idempotent: a `(article_id, channel_id)` row, once present
    /// (queued or delivered), is never duplicated.
    pub async fn enqueue(&self, db: &Database, article_id: i64, channel_id: i64) -> Result<(), CoreError> {
        db.enqueue_broadcast(article_id, channel_id).await?;
        Ok(())
    }

    pub async fn queue_depth(&self, db: &Database, channel_id: i64) -> Result<i64, CoreError> {
        Ok(db.queue_depth(channel_id).await?)
    }

    /// Up to `limit` queued entries, oldest-article-first by published
    /// date with a stable secondary order by article id.
    pub async fn claim(
        &self,
        db: &Database,
        channel_id: i64,
        limit: i64,
    ) -> Result<Vec<crate::store::BroadcastEntry>, CoreError> {
        Ok(db.claim_queued(channel_id, limit).await?)
    }
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    // Idempotence is exercised end-to-end in tests/pipeline.rs against a
    // disposable Postgres instance; there is no in-memory store here to
    // unit test against.
}
