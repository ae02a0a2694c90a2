//! Contact repository

use chatcast_common::types::{ChannelId, ContactId, GroupId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Contact, CreateContact};

/// Contact repository
#[derive(Clone)]
pub struct ContactRepository {
    pool: PgPool,
}

impl ContactRepository {
    /// Create a new contact repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new contact
    pub async fn create(&self, input: CreateContact) -> Result<Contact, sqlx::Error> {
        let id = Uuid::new_v4();
        let tags = serde_json::to_value(&input.tags).unwrap_or_default();

        sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (id, channel_id, phone, name, email, tags)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.channel_id)
        .bind(&input.phone)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&tags)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a contact by ID
    pub async fn get(&self, id: ContactId) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Look up a contact by phone within a channel (the dedup key)
    pub async fn find_by_phone(
        &self,
        channel_id: ChannelId,
        phone: &str,
    ) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE channel_id = $1 AND phone = $2",
        )
        .bind(channel_id)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
    }

    /// List the member contacts of a group, in membership insertion order
    pub async fn list_by_group(&self, group_id: GroupId) -> Result<Vec<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            r#"
            SELECT c.* FROM contacts c
            JOIN contact_group_members m ON m.contact_id = c.id
            WHERE m.group_id = $1
            ORDER BY m.created_at ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
    }
}
