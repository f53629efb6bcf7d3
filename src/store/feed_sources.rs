use chrono::{DateTime, Utc};

use super::pool::{Database, DatabaseError};

/// How a feed source is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSourceKind {
    Rss,
    Atom,
    Api,
}

impl FeedSourceKind {
    fn as_str(&self) -> &'static str {
        match self {
            FeedSourceKind::Rss => "rss",
            FeedSourceKind::Atom => "atom",
            FeedSourceKind::Api => "api",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "atom" => FeedSourceKind::Atom,
            "api" => FeedSourceKind::Api,
            _ => FeedSourceKind::Rss,
        }
    }
}

/// A configured ingestion origin.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedSource {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub kind: String,
    pub last_checked: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub credentials: Option<String>,
}

impl FeedSource {
    pub fn source_kind(&self) -> FeedSourceKind {
        FeedSourceKind::from_str(&self.kind)
    }
}

impl Database {
    pub async fn create_feed_source(
        &self,
        name: &str,
        url: &str,
        kind: FeedSourceKind,
    ) -> Result<FeedSource, DatabaseError> {
        sqlx::query_as::<_, FeedSource>(
            r#"
            INSERT INTO feed_sources (name, url, kind) VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(url)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from)
    }

    pub async fn get_feed_source(&self, id: i64) -> Result<Option<FeedSource>, DatabaseError> {
        sqlx::query_as::<_, FeedSource>("SELECT * FROM feed_sources WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)
    }

    pub async fn list_active_feed_sources(&self) -> Result<Vec<FeedSource>, DatabaseError> {
        sqlx::query_as::<_, FeedSource>(
            "SELECT * FROM feed_sources WHERE is_active ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)
    }

    pub async fn touch_feed_source(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE feed_sources SET last_checked = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn deactivate_feed_source(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE feed_sources SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
