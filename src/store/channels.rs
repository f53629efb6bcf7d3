use super::pool::{Database, DatabaseError};

/// A 24-bit mask of which wall-clock hours (in the channel's own
/// timezone, represented explicitly rather than relying on
/// process-global time zone state) a channel may deliver during. Bit
/// `h` set means hour `h` (0..=23) is an allowed delivery hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourMask(pub u32);

impl HourMask {
    pub const ALL: HourMask = HourMask(0x00FF_FFFF);

    pub fn is_allowed(&self, hour: u32) -> bool {
        debug_assert!(hour < 24);
        self.0 & (1 << hour) != 0
    }

    pub fn set(&mut self, hour: u32, allowed: bool) {
        debug_assert!(hour < 24);
        if allowed {
            self.0 |= 1 << hour;
        } else {
            self.0 &= !(1 << hour);
        }
    }
}

impl From<i32> for HourMask {
    fn from(value: i32) -> Self {
        HourMask(value as u32 & 0x00FF_FFFF)
    }
}

impl From<HourMask> for i32 {
    fn from(value: HourMask) -> Self {
        value.0 as i32
    }
}

/// A notification sink.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub endpoint: String,
    pub score_threshold: f64,
    pub model_id: i64,
    pub is_active: bool,
    pub broadcast_limit: i32,
    /// Raw 24-bit mask column; use `hour_mask()` for the typed view.
    pub broadcast_hours: i32,
    pub timezone: String,
}

impl Channel {
    pub fn hour_mask(&self) -> HourMask {
        HourMask::from(self.broadcast_hours)
    }
}

impl Database {
    pub async fn create_channel(
        &self,
        name: &str,
        endpoint: &str,
        score_threshold: f64,
        model_id: i64,
        broadcast_limit: i32,
    ) -> Result<Channel, DatabaseError> {
        sqlx::query_as::<_, Channel>(
            r#"
            INSERT INTO channels (name, endpoint, score_threshold, model_id, broadcast_limit)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(endpoint)
        .bind(score_threshold)
        .bind(model_id)
        .bind(broadcast_limit)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from)
    }

    pub async fn get_channel(&self, id: i64) -> Result<Option<Channel>, DatabaseError> {
        sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)
    }

    pub async fn list_active_channels(&self) -> Result<Vec<Channel>, DatabaseError> {
        sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE is_active ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)
    }

    pub async fn list_channels_for_model(&self, model_id: i64) -> Result<Vec<Channel>, DatabaseError> {
        sqlx::query_as::<_, Channel>(
            "SELECT * FROM channels WHERE model_id = $1 AND is_active ORDER BY id",
        )
        .bind(model_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)
    }

    /// Permanent-failure handling deactivates the channel in place
    /// rather than deleting it, so its delivery history is preserved.
    pub async fn deactivate_channel(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE channels SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_mask_roundtrips_through_i32() {
        let mut mask = HourMask(0);
        mask.set(9, true);
        mask.set(23, true);
        let as_i32: i32 = mask.into();
        let back = HourMask::from(as_i32);
        assert!(back.is_allowed(9));
        assert!(back.is_allowed(23));
        assert!(!back.is_allowed(10));
    }

    #[test]
    fn all_mask_allows_every_hour() {
        for h in 0..24 {
            assert!(HourMask::ALL.is_allowed(h));
        }
    }
}
