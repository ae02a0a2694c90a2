//! Contact group repository

use chatcast_common::types::{ChannelId, GroupId};
use sqlx::PgPool;

use crate::models::ContactGroup;

/// Contact group repository
#[derive(Clone)]
pub struct ContactGroupRepository {
    pool: PgPool,
}

impl ContactGroupRepository {
    /// Create a new contact group repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a group by ID
    pub async fn get(&self, id: GroupId) -> Result<Option<ContactGroup>, sqlx::Error> {
        sqlx::query_as::<_, ContactGroup>("SELECT * FROM contact_groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List groups for a channel
    pub async fn list_by_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<ContactGroup>, sqlx::Error> {
        sqlx::query_as::<_, ContactGroup>(
            "SELECT * FROM contact_groups WHERE channel_id = $1 ORDER BY created_at ASC",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await
    }
}
