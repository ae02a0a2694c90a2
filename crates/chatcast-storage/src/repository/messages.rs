//! Message repository
//!
//! Status transitions carry a `WHERE status = ANY(...)` guard listing the
//! statuses the message may currently hold. The guard gives both
//! monotonicity (a receipt can never move a message backward) and replay
//! idempotency (a duplicate receipt matches zero rows), so callers gate
//! their counter increments on the returned bool.

use chatcast_common::types::{ConversationId, MessageId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateMessage, Message, MessageStatus};

/// Message repository
#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    /// Create a new message repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a message row
    pub async fn create(&self, input: CreateMessage) -> Result<Message, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (
                id, conversation_id, campaign_id, direction, body,
                provider_message_id, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.conversation_id)
        .bind(input.campaign_id)
        .bind(input.direction.to_string())
        .bind(&input.body)
        .bind(&input.provider_message_id)
        .bind(input.status.to_string())
        .fetch_one(&self.pool)
        .await
    }

    /// Get a message by ID
    pub async fn get(&self, id: MessageId) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Look up a message by the gateway's message identifier
    pub async fn find_by_provider_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE provider_message_id = $1",
        )
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Move a message to `status` if it currently holds one of the statuses
    /// allowed to precede it. Returns whether the transition was applied.
    pub async fn advance_status(
        &self,
        id: MessageId,
        status: MessageStatus,
    ) -> Result<bool, sqlx::Error> {
        let prior: Vec<String> = status
            .allowed_prior()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE messages SET
                status = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(&prior)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Move a message from exactly `from` to `to`. Returns whether the row
    /// matched, so the caller learns the prior status atomically with the
    /// transition instead of from an earlier read.
    pub async fn advance_from(
        &self,
        id: MessageId,
        from: MessageStatus,
        to: MessageStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET
                status = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.to_string())
        .bind(to.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Move a message to `failed`, recording the provider's error detail.
    /// Same guard semantics as [`advance_status`].
    pub async fn mark_failed(
        &self,
        id: MessageId,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let prior: Vec<String> = MessageStatus::Failed
            .allowed_prior()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE messages SET
                status = 'failed',
                error_code = $2,
                error_message = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($4)
            "#,
        )
        .bind(id)
        .bind(error_code)
        .bind(error_message)
        .bind(&prior)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// The most recent outbound campaign message in a conversation, used to
    /// attribute an inbound reply to its campaign
    pub async fn last_campaign_outbound(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = $1
              AND direction = 'outbound'
              AND campaign_id IS NOT NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Phones that already received an outbound message from a campaign.
    /// The delivery executor uses this to resume a partially delivered
    /// batch without re-sending.
    pub async fn sent_recipient_phones(
        &self,
        campaign_id: Uuid,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT c.phone FROM messages m
            JOIN conversations c ON c.id = m.conversation_id
            WHERE m.campaign_id = $1 AND m.direction = 'outbound'
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(phone,)| phone).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageDirection;
    use pretty_assertions::assert_eq;

    async fn seed_conversation(pool: &PgPool) -> ConversationId {
        let channel_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO channels (id, name, phone_number_id, access_token, app_secret)
            VALUES ($1, 'test channel', '1065550100', 'token', 'secret')
            "#,
        )
        .bind(channel_id)
        .execute(pool)
        .await
        .unwrap();

        let contact_id = Uuid::new_v4();
        sqlx::query("INSERT INTO contacts (id, channel_id, phone) VALUES ($1, $2, '15550100001')")
            .bind(contact_id)
            .bind(channel_id)
            .execute(pool)
            .await
            .unwrap();

        let conversation_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO conversations (id, channel_id, contact_id, phone)
            VALUES ($1, $2, $3, '15550100001')
            "#,
        )
        .bind(conversation_id)
        .bind(channel_id)
        .bind(contact_id)
        .execute(pool)
        .await
        .unwrap();

        conversation_id
    }

    async fn seed_sent_message(pool: &PgPool) -> (MessageRepository, Message) {
        let conversation_id = seed_conversation(pool).await;
        let repo = MessageRepository::new(pool.clone());
        let message = repo
            .create(CreateMessage {
                conversation_id,
                campaign_id: None,
                direction: MessageDirection::Outbound,
                body: "hello".to_string(),
                provider_message_id: Some("wamid.seed1".to_string()),
                status: MessageStatus::Sent,
            })
            .await
            .unwrap();
        (repo, message)
    }

    #[sqlx::test]
    async fn test_advance_status_applies_replay_once(pool: PgPool) {
        let (repo, message) = seed_sent_message(&pool).await;

        assert!(repo
            .advance_status(message.id, MessageStatus::Delivered)
            .await
            .unwrap());
        // Replayed receipt matches zero rows
        assert!(!repo
            .advance_status(message.id, MessageStatus::Delivered)
            .await
            .unwrap());

        let row = repo.get(message.id).await.unwrap().unwrap();
        assert_eq!(row.status, "delivered");
    }

    #[sqlx::test]
    async fn test_advance_status_never_moves_backward(pool: PgPool) {
        let (repo, message) = seed_sent_message(&pool).await;

        assert!(repo
            .advance_status(message.id, MessageStatus::Read)
            .await
            .unwrap());
        // A late delivered receipt cannot demote a read message
        assert!(!repo
            .advance_status(message.id, MessageStatus::Delivered)
            .await
            .unwrap());

        let row = repo.get(message.id).await.unwrap().unwrap();
        assert_eq!(row.status, "read");
    }

    #[sqlx::test]
    async fn test_advance_from_requires_exact_status(pool: PgPool) {
        let (repo, message) = seed_sent_message(&pool).await;

        assert!(!repo
            .advance_from(message.id, MessageStatus::Delivered, MessageStatus::Read)
            .await
            .unwrap());
        assert!(repo
            .advance_from(message.id, MessageStatus::Sent, MessageStatus::Read)
            .await
            .unwrap());
        assert!(!repo
            .advance_from(message.id, MessageStatus::Sent, MessageStatus::Read)
            .await
            .unwrap());

        let row = repo.get(message.id).await.unwrap().unwrap();
        assert_eq!(row.status, "read");
    }

    #[sqlx::test]
    async fn test_mark_failed_only_from_sent(pool: PgPool) {
        let (repo, message) = seed_sent_message(&pool).await;

        assert!(repo
            .mark_failed(message.id, Some("131026"), Some("Undeliverable"))
            .await
            .unwrap());
        assert!(!repo
            .mark_failed(message.id, Some("131026"), Some("Undeliverable"))
            .await
            .unwrap());

        let row = repo.get(message.id).await.unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.error_code.as_deref(), Some("131026"));
    }

    #[sqlx::test]
    async fn test_sent_recipient_phones_lists_outbound_only(pool: PgPool) {
        let conversation_id = seed_conversation(&pool).await;
        let repo = MessageRepository::new(pool.clone());
        let campaign_id = seed_campaign_row(&pool).await;

        repo.create(CreateMessage {
            conversation_id,
            campaign_id: Some(campaign_id),
            direction: MessageDirection::Outbound,
            body: "hello".to_string(),
            provider_message_id: Some("wamid.out1".to_string()),
            status: MessageStatus::Sent,
        })
        .await
        .unwrap();
        repo.create(CreateMessage {
            conversation_id,
            campaign_id: None,
            direction: MessageDirection::Inbound,
            body: "reply".to_string(),
            provider_message_id: Some("wamid.in1".to_string()),
            status: MessageStatus::Received,
        })
        .await
        .unwrap();

        let phones = repo.sent_recipient_phones(campaign_id).await.unwrap();
        assert_eq!(phones, vec!["15550100001".to_string()]);
    }

    async fn seed_campaign_row(pool: &PgPool) -> Uuid {
        let (channel_id,): (Uuid,) = sqlx::query_as("SELECT id FROM channels LIMIT 1")
            .fetch_one(pool)
            .await
            .unwrap();

        let template_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO templates (id, channel_id, name, language, category, body)
            VALUES ($1, $2, 'welcome', 'en', 'marketing', 'Hi {{1}}')
            "#,
        )
        .bind(template_id)
        .bind(channel_id)
        .execute(pool)
        .await
        .unwrap();

        let campaign_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, channel_id, name, kind, message_kind, template_id,
                template_name, template_language, status, recipient_count
            )
            VALUES ($1, $2, 'spring', 'from_list', 'marketing', $3, 'welcome', 'en', 'active', 1)
            "#,
        )
        .bind(campaign_id)
        .bind(channel_id)
        .bind(template_id)
        .execute(pool)
        .await
        .unwrap();

        campaign_id
    }
}
