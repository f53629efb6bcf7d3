use pgvector::Vector;

use super::pool::{Database, DatabaseError};
use crate::error::CoreError;

/// A fixed-dimensional float vector associated 1:1 with an Article.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Embedding {
    pub article_id: i64,
    pub vector: Vector,
}

/// An article ranked by cosine distance, returned from similarity search.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SimilarArticle {
    pub article_id: i64,
    pub distance: f64,
}

impl Database {
    /// Persist embeddings for a batch of articles in a single
    /// transaction. Fails with `SchemaMismatch` if any vector's
    /// dimension disagrees with `expected_dim`.
    pub async fn upsert_embeddings(
        &self,
        pairs: &[(i64, Vec<f32>)],
        expected_dim: usize,
    ) -> Result<(), CoreError> {
        for (article_id, v) in pairs {
            if v.len() != expected_dim {
                return Err(CoreError::SchemaMismatch(format!(
                    "article {article_id} returned a {}-dim vector, expected {expected_dim}",
                    v.len()
                )));
            }
        }

        let mut tx = self.pool.begin().await?;
        for (article_id, v) in pairs {
            sqlx::query(
                r#"
                INSERT INTO embeddings (article_id, vector)
                VALUES ($1, $2)
                ON CONFLICT (article_id) DO UPDATE SET vector = EXCLUDED.vector
                "#,
            )
            .bind(article_id)
            .bind(Vector::from(v.clone()))
            .execute(&mut *tx)
            .await?;

            // Re-embedding invalidates every existing score for this
            // article.
            sqlx::query("DELETE FROM predicted_preferences WHERE feed_id = $1")
                .bind(article_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Count of embeddings and of articles still missing one, for the
    /// `embeddings status` CLI command.
    pub async fn embedding_counts(&self) -> Result<(i64, i64), DatabaseError> {
        let (total,): (i64,) = sqlx::query_as("SELECT count(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;
        let (missing,): (i64,) = sqlx::query_as(
            "SELECT count(*) FROM feeds f LEFT JOIN embeddings e ON e.article_id = f.id \
             WHERE e.article_id IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok((total, missing))
    }

    /// Delete every embedding (and, transitively via cascade, every
    /// score). Used by the `embeddings clear`/`embeddings reset` CLI
    /// commands.
    pub async fn clear_embeddings(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM embeddings").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Drop or recreate the HNSW index, used by `embeddings index
    /// on|off` to trade query latency for ingest throughput during bulk
    /// backfills.
    pub async fn set_embeddings_index_enabled(&self, enabled: bool) -> Result<(), DatabaseError> {
        if enabled {
            sqlx::query(
                "CREATE INDEX IF NOT EXISTS embeddings_hnsw_idx ON embeddings \
                 USING hnsw (vector vector_cosine_ops)",
            )
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("DROP INDEX IF EXISTS embeddings_hnsw_idx").execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn get_embedding(&self, article_id: i64) -> Result<Option<Embedding>, DatabaseError> {
        sqlx::query_as::<_, Embedding>("SELECT * FROM embeddings WHERE article_id = $1")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)
    }

    /// Up to `k` articles ordered by cosine distance ascending, optionally
    /// restricted to a score band under `model_id`.
    pub async fn similar_articles(
        &self,
        vector: &[f32],
        k: i64,
        model_id: Option<i64>,
        min_score: Option<f64>,
    ) -> Result<Vec<SimilarArticle>, DatabaseError> {
        let query = Vector::from(vector.to_vec());
        let rows = if let (Some(model_id), Some(min_score)) = (model_id, min_score) {
            sqlx::query_as::<_, SimilarArticle>(
                r#"
                SELECT e.article_id, e.vector <=> $1 AS distance
                FROM embeddings e
                JOIN predicted_preferences p ON p.feed_id = e.article_id
                WHERE p.model_id = $2 AND p.score >= $3
                ORDER BY e.vector <=> $1 ASC
                LIMIT $4
                "#,
            )
            .bind(&query)
            .bind(model_id)
            .bind(min_score)
            .bind(k)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, SimilarArticle>(
                r#"
                SELECT article_id, vector <=> $1 AS distance
                FROM embeddings
                ORDER BY vector <=> $1 ASC
                LIMIT $2
                "#,
            )
            .bind(&query)
            .bind(k)
            .fetch_all(&self.pool)
            .await
        }?;
        Ok(rows)
    }
}
