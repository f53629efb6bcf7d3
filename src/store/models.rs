use chrono::{DateTime, Utc};

use super::pool::{Database, DatabaseError};

/// Opaque trained artifact metadata. The binary artifact
/// itself lives on disk at a path derivable from `id`
/// (`scoring::artifact::model_path`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Model {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub score_name: String,
}

impl Database {
    pub async fn create_model(&self, name: &str, score_name: &str) -> Result<Model, DatabaseError> {
        sqlx::query_as::<_, Model>(
            r#"
            INSERT INTO models (name, score_name) VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(score_name)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from)
    }

    pub async fn get_model(&self, id: i64) -> Result<Option<Model>, DatabaseError> {
        sqlx::query_as::<_, Model>("SELECT * FROM models WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)
    }

    pub async fn list_models(&self) -> Result<Vec<Model>, DatabaseError> {
        sqlx::query_as::<_, Model>("SELECT * FROM models ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)
    }

    pub async fn list_active_models(&self) -> Result<Vec<Model>, DatabaseError> {
        sqlx::query_as::<_, Model>("SELECT * FROM models WHERE is_active ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)
    }

    pub async fn set_model_active(&self, id: i64, active: bool) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE models SET is_active = $1 WHERE id = $2")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_model(&self, id: i64) -> Result<(), DatabaseError> {
        // Cascades to predicted_preferences and channels referencing it
        // are blocked by the FK on channels; callers must deactivate or
        // reassign channels first.
        sqlx::query("DELETE FROM models WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
