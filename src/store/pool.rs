use sqlx::postgres::{PgPoolOptions, PgSslMode};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::config::DbConfig;

/// Database-specific errors with user-friendly messages.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a conflicting advisory lock.
    #[error("resource is locked by another PaperSorter process")]
    Locked,

    /// Migration failed.
    #[error("database migration failed: {0}")]
    Migration(String),

    /// Generic database error.
    #[error("database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    fn from_sqlx(err: sqlx::Error) -> Self {
        let msg = err.to_string().to_lowercase();
        if msg.contains("lock") {
            return DatabaseError::Locked;
        }
        DatabaseError::Other(err)
    }
}

/// Sole durable state holder. Cloning is cheap — it just clones the pool
/// handle.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: sqlx::PgPool,
}

impl Database {
    /// Open a connection pool and run migrations.
    pub async fn open(config: &DbConfig, pool_size: u32) -> Result<Self, DatabaseError> {
        let options = sqlx::postgres::PgConnectOptions::from_str(&config.connect_url())
            .map_err(DatabaseError::from_sqlx)?
            .ssl_mode(PgSslMode::Prefer);

        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn from_pool(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    /// Run schema migrations inside a single all-or-nothing transaction,
    /// including the pgvector extension and HNSW index.
    async fn migrate(&self) -> Result<(), DatabaseError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_sources (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                last_checked TIMESTAMPTZ,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                credentials TEXT
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id BIGSERIAL PRIMARY KEY,
                external_id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                content TEXT,
                authors TEXT,
                origin TEXT NOT NULL,
                link TEXT NOT NULL,
                published TIMESTAMPTZ NOT NULL,
                added TIMESTAMPTZ NOT NULL DEFAULT now(),
                tldr TEXT
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS feeds_link_idx ON feeds (link)")
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        sqlx::query("CREATE INDEX IF NOT EXISTS feeds_added_desc_idx ON feeds (added DESC)")
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS models (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                is_active BOOLEAN NOT NULL DEFAULT FALSE,
                notes TEXT,
                score_name TEXT NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                score_threshold DOUBLE PRECISION NOT NULL,
                model_id BIGINT NOT NULL REFERENCES models(id),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                broadcast_limit INTEGER NOT NULL DEFAULT 20,
                broadcast_hours INTEGER NOT NULL DEFAULT 16777215,
                timezone TEXT NOT NULL DEFAULT 'UTC'
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                is_admin BOOLEAN NOT NULL DEFAULT FALSE,
                timezone TEXT NOT NULL DEFAULT 'UTC',
                theme TEXT NOT NULL DEFAULT 'dark',
                bookmark_article_id BIGINT REFERENCES feeds(id),
                min_score_threshold DOUBLE PRECISION NOT NULL DEFAULT 0.0,
                primary_channel_id BIGINT REFERENCES channels(id)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                article_id BIGINT PRIMARY KEY REFERENCES feeds(id) ON DELETE CASCADE,
                vector vector NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS embeddings_hnsw_idx ON embeddings \
             USING hnsw (vector vector_cosine_ops)",
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predicted_preferences (
                feed_id BIGINT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                model_id BIGINT NOT NULL REFERENCES models(id) ON DELETE CASCADE,
                score DOUBLE PRECISION NOT NULL,
                PRIMARY KEY (feed_id, model_id)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS predicted_preferences_rank_idx \
             ON predicted_preferences (model_id, score DESC, feed_id)",
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                id BIGSERIAL PRIMARY KEY,
                article_id BIGINT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                user_id BIGINT NOT NULL REFERENCES users(id),
                ts TIMESTAMPTZ NOT NULL DEFAULT now(),
                score SMALLINT NOT NULL CHECK (score IN (0, 1)),
                source TEXT NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS broadcasts (
                feed_id BIGINT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                channel_id BIGINT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
                broadcasted_time TIMESTAMPTZ,
                PRIMARY KEY (feed_id, channel_id)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS broadcasts_time_idx ON broadcasts (broadcasted_time)",
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id BIGSERIAL PRIMARY KEY,
                ts TIMESTAMPTZ NOT NULL DEFAULT now(),
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                channel_id BIGINT REFERENCES channels(id),
                feed_source_id BIGINT REFERENCES feed_sources(id)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        Ok(())
    }
}
