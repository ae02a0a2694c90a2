//! Conversation repository

use chatcast_common::types::{ChannelId, ConversationId};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Conversation, CreateConversation};

/// Conversation repository
#[derive(Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

impl ConversationRepository {
    /// Create a new conversation repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new conversation
    pub async fn create(&self, input: CreateConversation) -> Result<Conversation, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (id, channel_id, contact_id, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.channel_id)
        .bind(input.contact_id)
        .bind(&input.phone)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a conversation by ID
    pub async fn get(&self, id: ConversationId) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Look up the conversation for a (channel, phone) pair
    pub async fn find_by_phone(
        &self,
        channel_id: ChannelId,
        phone: &str,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE channel_id = $1 AND phone = $2",
        )
        .bind(channel_id)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
    }

    /// Record the latest message preview for inbox display
    pub async fn touch_last_message(
        &self,
        id: ConversationId,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE conversations SET
                last_message_at = $2,
                last_message_text = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
