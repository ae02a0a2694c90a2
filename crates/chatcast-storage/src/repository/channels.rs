//! Channel repository

use chatcast_common::types::ChannelId;
use sqlx::PgPool;

use crate::models::Channel;

/// Channel repository
#[derive(Clone)]
pub struct ChannelRepository {
    pool: PgPool,
}

impl ChannelRepository {
    /// Create a new channel repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a channel by ID
    pub async fn get(&self, id: ChannelId) -> Result<Option<Channel>, sqlx::Error> {
        sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List all channels
    pub async fn list(&self) -> Result<Vec<Channel>, sqlx::Error> {
        sqlx::query_as::<_, Channel>("SELECT * FROM channels ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
    }
}
