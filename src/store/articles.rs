use chrono::{DateTime, Utc};

use super::pool::Database;

/// One canonical record per ingested item.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub external_id: String,
    pub title: String,
    pub content: Option<String>,
    pub authors: Option<String>,
    pub origin: String,
    pub link: String,
    pub published: DateTime<Utc>,
    pub added: DateTime<Utc>,
    pub tldr: Option<String>,
}

/// A candidate article handed from the fetcher/deduper to the store, not
/// yet assigned an id.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub external_id: String,
    pub title: String,
    pub content: Option<String>,
    pub authors: Option<String>,
    pub origin: String,
    pub link: String,
    pub published: DateTime<Utc>,
}

impl Database {
    /// Insert an article keyed by `external_id`. On conflict, no mutation
    /// occurs unless `force` is set — this prevents ingestion from
    /// clobbering metadata enriched by other processes.
    ///
    /// Returns the resulting article id either way.
    pub async fn upsert_article(
        &self,
        article: &NewArticle,
        force: bool,
    ) -> sqlx::Result<i64> {
        let row: (i64,) = if force {
            sqlx::query_as(
                r#"
                INSERT INTO feeds (external_id, title, content, authors, origin, link, published)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (external_id) DO UPDATE SET
                    title = EXCLUDED.title,
                    content = EXCLUDED.content,
                    authors = EXCLUDED.authors,
                    origin = EXCLUDED.origin,
                    link = EXCLUDED.link,
                    published = EXCLUDED.published
                RETURNING id
                "#,
            )
        } else {
            sqlx::query_as(
                r#"
                INSERT INTO feeds (external_id, title, content, authors, origin, link, published)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (external_id) DO UPDATE SET external_id = feeds.external_id
                RETURNING id
                "#,
            )
        }
        .bind(&article.external_id)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.authors)
        .bind(&article.origin)
        .bind(&article.link)
        .bind(article.published)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    pub async fn get_article_by_external_id(
        &self,
        external_id: &str,
    ) -> sqlx::Result<Option<Article>> {
        sqlx::query_as::<_, Article>("SELECT * FROM feeds WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_article_by_link(&self, link: &str) -> sqlx::Result<Option<Article>> {
        sqlx::query_as::<_, Article>("SELECT * FROM feeds WHERE link = $1")
            .bind(link)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_article(&self, id: i64) -> sqlx::Result<Option<Article>> {
        sqlx::query_as::<_, Article>("SELECT * FROM feeds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Recent titles within the fuzzy-dedup window, used by the deduper
    /// and the dispatcher's cross-time suppression.
    pub async fn recent_titles_since(
        &self,
        since: DateTime<Utc>,
    ) -> sqlx::Result<Vec<(i64, String)>> {
        sqlx::query_as("SELECT id, title FROM feeds WHERE added >= $1")
            .bind(since)
            .fetch_all(&self.pool)
            .await
    }

    /// Articles lacking an embedding, oldest-added-first, bounded by
    /// `limit`.
    pub async fn articles_missing_embedding(&self, limit: i64) -> sqlx::Result<Vec<Article>> {
        sqlx::query_as::<_, Article>(
            r#"
            SELECT f.* FROM feeds f
            LEFT JOIN embeddings e ON e.article_id = f.id
            WHERE e.article_id IS NULL
            ORDER BY f.added ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Every article that has an embedding, paginated, regardless of
    /// scoring status — used by force-rescoring, which overwrites
    /// existing score rows instead of skipping already-scored articles.
    pub async fn articles_with_embedding(
        &self,
        offset: i64,
        limit: i64,
    ) -> sqlx::Result<Vec<Article>> {
        sqlx::query_as::<_, Article>(
            r#"
            SELECT f.* FROM feeds f
            JOIN embeddings e ON e.article_id = f.id
            ORDER BY f.id ASC
            OFFSET $1
            LIMIT $2
            "#,
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Articles with an embedding but no score row for `model_id`.
    pub async fn articles_missing_score(
        &self,
        model_id: i64,
        limit: i64,
    ) -> sqlx::Result<Vec<Article>> {
        sqlx::query_as::<_, Article>(
            r#"
            SELECT f.* FROM feeds f
            JOIN embeddings e ON e.article_id = f.id
            LEFT JOIN predicted_preferences p ON p.feed_id = f.id AND p.model_id = $1
            WHERE p.feed_id IS NULL
            ORDER BY f.added ASC
            LIMIT $2
            "#,
        )
        .bind(model_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
