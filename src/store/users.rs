use super::pool::{Database, DatabaseError};

/// A labeling/consuming identity. Minimal by design — auth
/// and session handling are out of scope.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub timezone: String,
    pub theme: String,
    pub bookmark_article_id: Option<i64>,
    pub min_score_threshold: f64,
    pub primary_channel_id: Option<i64>,
}

impl Database {
    pub async fn create_user(&self, username: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (username) VALUES ($1) RETURNING *",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from)
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)
    }
}
