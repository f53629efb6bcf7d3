use super::pool::{Database, DatabaseError};

/// (article, model) -> score. Primary key is
/// `(article_id, model_id)`; exactly one row per pair, overwritten on
/// rescoring.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PredictedScore {
    pub article_id: i64,
    pub model_id: i64,
    pub score: f64,
}

impl Database {
    pub async fn upsert_scores(&self, scores: &[PredictedScore]) -> Result<(), DatabaseError> {
        if scores.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for s in scores {
            sqlx::query(
                r#"
                INSERT INTO predicted_preferences (feed_id, model_id, score)
                VALUES ($1, $2, $3)
                ON CONFLICT (feed_id, model_id) DO UPDATE SET score = EXCLUDED.score
                "#,
            )
            .bind(s.article_id)
            .bind(s.model_id)
            .bind(s.score)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_score(
        &self,
        article_id: i64,
        model_id: i64,
    ) -> Result<Option<PredictedScore>, DatabaseError> {
        sqlx::query_as::<_, PredictedScore>(
            "SELECT * FROM predicted_preferences WHERE feed_id = $1 AND model_id = $2",
        )
        .bind(article_id)
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)
    }

    /// True once every Article with an Embedding has a score row for
    /// every active Model.
    pub async fn has_full_score_coverage(&self) -> Result<bool, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT count(*) FROM embeddings e
            CROSS JOIN models m
            LEFT JOIN predicted_preferences p ON p.feed_id = e.article_id AND p.model_id = m.id
            WHERE m.is_active AND p.feed_id IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 == 0)
    }
}
