use chrono::{DateTime, Utc};

use super::pool::{Database, DatabaseError};

/// Where a binary preference label came from. Labels are binary
/// thumbs-up/down; there is no 1..5 star scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum LabelSource {
    Explicit,
    Implicit,
}

impl LabelSource {
    fn as_str(&self) -> &'static str {
        match self {
            LabelSource::Explicit => "explicit",
            LabelSource::Implicit => "implicit",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "implicit" => LabelSource::Implicit,
            _ => LabelSource::Explicit,
        }
    }
}

/// A single labeling event. Append-only: the history of a
/// user changing their mind about an article is never overwritten.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Preference {
    pub id: i64,
    pub article_id: i64,
    pub user_id: i64,
    pub ts: DateTime<Utc>,
    pub score: i16,
    pub source: String,
}

impl Database {
    /// Append a label. Training reads should use `labeled_set`, which
    /// resolves each `(article_id, user_id)` pair to its most recent label.
    pub async fn label(
        &self,
        article_id: i64,
        user_id: i64,
        score: i16,
        source: LabelSource,
    ) -> Result<Preference, DatabaseError> {
        sqlx::query_as::<_, Preference>(
            r#"
            INSERT INTO preferences (article_id, user_id, score, source)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(article_id)
        .bind(user_id)
        .bind(score)
        .bind(source.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from)
    }

    /// The current (latest) label per `(article_id, user_id)` pair, used
    /// as training data by the scorer's fit step.
    pub async fn labeled_set(&self) -> Result<Vec<Preference>, DatabaseError> {
        sqlx::query_as::<_, Preference>(
            r#"
            SELECT DISTINCT ON (article_id, user_id) *
            FROM preferences
            ORDER BY article_id, user_id, ts DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)
    }

    pub async fn latest_label(
        &self,
        article_id: i64,
        user_id: i64,
    ) -> Result<Option<Preference>, DatabaseError> {
        sqlx::query_as::<_, Preference>(
            r#"
            SELECT * FROM preferences
            WHERE article_id = $1 AND user_id = $2
            ORDER BY ts DESC
            LIMIT 1
            "#,
        )
        .bind(article_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)
    }
}

impl Preference {
    pub fn label_source(&self) -> LabelSource {
        LabelSource::from_str(&self.source)
    }
}
