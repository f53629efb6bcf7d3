use super::pool::{Database, DatabaseError};

/// A named cross-process mutual-exclusion lock backed by Postgres advisory
/// locks, so the Update and Broadcast drivers cannot run concurrently
/// with themselves across multiple processes.
///
/// Advisory locks are session-scoped, so returning the underlying
/// connection to the pool would leave the lock held on a connection some
/// other caller later reuses. Dropping an `AdvisoryLock` instead detaches
/// and closes its connection outright, which Postgres treats the same as
/// a dead session and releases the lock for.
pub struct AdvisoryLock {
    conn: Option<sqlx::pool::PoolConnection<sqlx::Postgres>>,
}

fn lock_key(name: &str) -> i64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish() as i64
}

impl Database {
    /// Block until `name` is acquired.
    pub async fn advisory_lock(&self, name: &str) -> Result<AdvisoryLock, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        let key = lock_key(name);
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(key)
            .execute(&mut *conn)
            .await?;
        Ok(AdvisoryLock { conn: Some(conn) })
    }

    /// Non-blocking: returns `Ok(None)` if `name` is already held
    /// elsewhere, rather than an error, so callers can skip this tick
    /// rather than queue behind the prior run.
    pub async fn try_advisory_lock(&self, name: &str) -> Result<Option<AdvisoryLock>, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        let key = lock_key(name);
        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;
        if acquired {
            Ok(Some(AdvisoryLock { conn: Some(conn) }))
        } else {
            Ok(None)
        }
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.detach();
        }
    }
}
