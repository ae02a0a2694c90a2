//! Status reconciler.
//!
//! Consumes delivery receipts and inbound messages from the gateway
//! webhook. Receipts may arrive out of order or duplicated; the message
//! repository's guarded transitions make each counter increment apply
//! exactly once, so replaying a payload is a no-op.
//!
//! This component owns the delivered/read/replied counters and shares
//! `failed_count` with the executor. It never touches `sent_count`.

use crate::campaign::CompletionDetector;
use crate::conversations::ConversationUpsert;
use crate::webhook::payload::{InboundMessage, StatusReceipt, WebhookContact, WebhookPayload};
use chatcast_common::types::{MessageId, PhoneNumber};
use chatcast_storage::models::{Channel, CreateMessage, MessageDirection, MessageStatus};
use chatcast_storage::repository::{CampaignRepository, MessageRepository};
use sqlx::PgPool;
use tracing::{debug, warn};

/// Status reconciler
#[derive(Clone)]
pub struct StatusReconciler {
    campaigns: CampaignRepository,
    messages: MessageRepository,
    threads: ConversationUpsert,
    completion: CompletionDetector,
}

impl StatusReconciler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            campaigns: CampaignRepository::new(pool.clone()),
            messages: MessageRepository::new(pool.clone()),
            threads: ConversationUpsert::new(pool.clone()),
            completion: CompletionDetector::new(pool),
        }
    }

    /// Process one verified webhook payload for a channel.
    ///
    /// Signature verification happens at the HTTP boundary before the
    /// body is parsed; by the time a payload reaches here it is trusted.
    pub async fn process(
        &self,
        channel: &Channel,
        payload: &WebhookPayload,
    ) -> Result<(), sqlx::Error> {
        for value in payload.values() {
            for receipt in &value.statuses {
                self.apply_receipt(receipt).await?;
            }
            for inbound in &value.messages {
                self.apply_inbound(channel, inbound, &value.contacts).await?;
            }
        }
        Ok(())
    }

    /// Apply one delivery receipt.
    ///
    /// Unknown provider message ids are ignored without error: the receipt
    /// may race ahead of message persistence or belong to an unrelated
    /// integration, and an error response would make the provider retry
    /// forever.
    async fn apply_receipt(&self, receipt: &StatusReceipt) -> Result<(), sqlx::Error> {
        let Some(message) = self.messages.find_by_provider_id(&receipt.id).await? else {
            debug!(provider_message_id = %receipt.id, "Receipt for unknown message, ignoring");
            return Ok(());
        };

        let Some(status) = receipt_status(&receipt.status) else {
            debug!(status = %receipt.status, "Unrecognized receipt status, ignoring");
            return Ok(());
        };

        match status {
            // The message row is created at `sent`; a sent receipt adds
            // nothing
            MessageStatus::Sent => {}

            MessageStatus::Delivered => {
                let applied = self
                    .messages
                    .advance_status(message.id, MessageStatus::Delivered)
                    .await?;
                if applied {
                    if let Some(campaign_id) = message.campaign_id {
                        self.campaigns.increment_delivered(campaign_id).await?;
                    }
                }
            }

            MessageStatus::Read => {
                // A read receipt can overtake the delivered receipt; when
                // it does, it accounts for both counters so the
                // delivered <= sent and read <= delivered invariants hold.
                // The transition itself reports which status the message
                // left, so a delivered receipt processed concurrently is
                // never counted twice.
                let left = self.advance_to_read(message.id).await?;
                if let (Some(campaign_id), Some(left)) = (message.campaign_id, left) {
                    if left == MessageStatus::Sent {
                        self.campaigns
                            .increment_delivered_and_read(campaign_id)
                            .await?;
                    } else {
                        self.campaigns.increment_read(campaign_id).await?;
                    }
                }
            }

            MessageStatus::Failed => {
                let (code, detail) = failure_detail(receipt);
                let applied = self
                    .messages
                    .mark_failed(message.id, code.as_deref(), detail.as_deref())
                    .await?;
                if applied {
                    if let Some(campaign_id) = message.campaign_id {
                        self.campaigns.increment_failed(campaign_id).await?;
                        // A late failure may be the last outstanding
                        // recipient
                        self.completion.maybe_complete(campaign_id).await?;
                    }
                }
            }

            MessageStatus::Received => {}
        }

        Ok(())
    }

    /// Move a message to `read`, returning the status it actually left.
    ///
    /// `delivered` is tried first so the fallback `sent -> read` jump only
    /// fires when the delivered receipt truly has not landed. The final
    /// attempt covers a delivered receipt slipping in between the first
    /// two statements.
    async fn advance_to_read(&self, id: MessageId) -> Result<Option<MessageStatus>, sqlx::Error> {
        if self
            .messages
            .advance_from(id, MessageStatus::Delivered, MessageStatus::Read)
            .await?
        {
            return Ok(Some(MessageStatus::Delivered));
        }
        if self
            .messages
            .advance_from(id, MessageStatus::Sent, MessageStatus::Read)
            .await?
        {
            return Ok(Some(MessageStatus::Sent));
        }
        if self
            .messages
            .advance_from(id, MessageStatus::Delivered, MessageStatus::Read)
            .await?
        {
            return Ok(Some(MessageStatus::Delivered));
        }
        Ok(None)
    }

    /// Record an inbound reply: append a `received` message row, refresh
    /// the conversation preview, and attribute the reply to the campaign
    /// behind the most recent outbound message in the conversation.
    async fn apply_inbound(
        &self,
        channel: &Channel,
        inbound: &InboundMessage,
        contacts: &[WebhookContact],
    ) -> Result<(), sqlx::Error> {
        // Provider redelivery of the same inbound message is a no-op
        if self.messages.find_by_provider_id(&inbound.id).await?.is_some() {
            debug!(provider_message_id = %inbound.id, "Inbound message already recorded");
            return Ok(());
        }

        let Some(phone) = PhoneNumber::parse(&inbound.from) else {
            warn!(from = %inbound.from, "Inbound message with unusable sender, ignoring");
            return Ok(());
        };

        let name = contacts
            .iter()
            .find(|c| c.wa_id == inbound.from)
            .and_then(|c| c.profile.as_ref())
            .and_then(|p| p.name.as_deref());

        let conversation = self
            .threads
            .ensure(channel.id, &phone, name, None, &[])
            .await?;

        let body = match &inbound.text {
            Some(text) => text.body.clone(),
            None => format!("[{}]", inbound.kind.as_deref().unwrap_or("unsupported")),
        };

        // Attribution goes to the campaign behind the latest outbound
        // message, looked up before the inbound row is appended
        let replied_campaign = self
            .messages
            .last_campaign_outbound(conversation.id)
            .await?
            .and_then(|m| m.campaign_id);

        self.messages
            .create(CreateMessage {
                conversation_id: conversation.id,
                campaign_id: None,
                direction: MessageDirection::Inbound,
                body: body.clone(),
                provider_message_id: Some(inbound.id.clone()),
                status: MessageStatus::Received,
            })
            .await?;

        self.threads
            .touch(&conversation, &body, chrono::Utc::now())
            .await?;

        if let Some(campaign_id) = replied_campaign {
            self.campaigns.increment_replied(campaign_id).await?;
        }

        Ok(())
    }
}

/// Map a provider receipt status string to the message status machine
fn receipt_status(status: &str) -> Option<MessageStatus> {
    match status {
        "sent" => Some(MessageStatus::Sent),
        "delivered" => Some(MessageStatus::Delivered),
        "read" => Some(MessageStatus::Read),
        "failed" => Some(MessageStatus::Failed),
        _ => None,
    }
}

/// Error code and human-readable detail from a failure receipt
fn failure_detail(receipt: &StatusReceipt) -> (Option<String>, Option<String>) {
    let first = receipt.errors.first();
    let code = first.and_then(|e| e.code).map(|c| c.to_string());
    let detail = first.and_then(|e| {
        e.message
            .clone()
            .or_else(|| e.title.clone())
    });
    (code, detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::payload::ReceiptError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_receipt_status_mapping() {
        assert_eq!(receipt_status("delivered"), Some(MessageStatus::Delivered));
        assert_eq!(receipt_status("read"), Some(MessageStatus::Read));
        assert_eq!(receipt_status("failed"), Some(MessageStatus::Failed));
        assert_eq!(receipt_status("sent"), Some(MessageStatus::Sent));
        assert_eq!(receipt_status("warning"), None);
    }

    #[test]
    fn test_failure_detail_prefers_message_over_title() {
        let receipt = StatusReceipt {
            id: "wamid.x".to_string(),
            status: "failed".to_string(),
            timestamp: None,
            recipient_id: None,
            errors: vec![ReceiptError {
                code: Some(131026),
                title: Some("Message undeliverable".to_string()),
                message: Some("Recipient cannot receive this message".to_string()),
            }],
        };

        let (code, detail) = failure_detail(&receipt);
        assert_eq!(code.as_deref(), Some("131026"));
        assert_eq!(
            detail.as_deref(),
            Some("Recipient cannot receive this message")
        );
    }

    #[test]
    fn test_failure_detail_without_errors() {
        let receipt = StatusReceipt {
            id: "wamid.x".to_string(),
            status: "failed".to_string(),
            timestamp: None,
            recipient_id: None,
            errors: vec![],
        };

        let (code, detail) = failure_detail(&receipt);
        assert_eq!(code, None);
        assert_eq!(detail, None);
    }

    use sqlx::PgPool;
    use uuid::Uuid;

    fn receipt_payload(id: &str, status: &str) -> WebhookPayload {
        serde_json::from_value(serde_json::json!({
            "entry": [{
                "changes": [{
                    "value": { "statuses": [{ "id": id, "status": status }] }
                }]
            }]
        }))
        .unwrap()
    }

    async fn seed_outbound_message(pool: &PgPool) -> (Channel, Uuid) {
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
                template_name, template_language, status, recipient_count,
                sent_count
            )
            VALUES ($1, $2, 'spring', 'from_list', 'marketing', $3,
                    'welcome', 'en', 'active', 2, 1)
            "#,
        )
        .bind(campaign_id)
        .bind(channel_id)
        .bind(template_id)
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

        MessageRepository::new(pool.clone())
            .create(CreateMessage {
                conversation_id,
                campaign_id: Some(campaign_id),
                direction: MessageDirection::Outbound,
                body: "Hi Ada".to_string(),
                provider_message_id: Some("wamid.rc1".to_string()),
                status: MessageStatus::Sent,
            })
            .await
            .unwrap();

        let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = $1")
            .bind(channel_id)
            .fetch_one(pool)
            .await
            .unwrap();

        (channel, campaign_id)
    }

    async fn counters(pool: &PgPool, campaign_id: Uuid) -> (i32, i32) {
        let row = CampaignRepository::new(pool.clone())
            .get(campaign_id)
            .await
            .unwrap()
            .unwrap();
        (row.delivered_count, row.read_count)
    }

    #[sqlx::test(migrations = "../chatcast-storage/migrations")]
    async fn test_replayed_receipts_count_once(pool: PgPool) {
        let (channel, campaign_id) = seed_outbound_message(&pool).await;
        let reconciler = StatusReconciler::new(pool.clone());

        reconciler
            .process(&channel, &receipt_payload("wamid.rc1", "delivered"))
            .await
            .unwrap();
        reconciler
            .process(&channel, &receipt_payload("wamid.rc1", "read"))
            .await
            .unwrap();
        assert_eq!(counters(&pool, campaign_id).await, (1, 1));

        // Provider redelivery of both receipts changes nothing
        reconciler
            .process(&channel, &receipt_payload("wamid.rc1", "delivered"))
            .await
            .unwrap();
        reconciler
            .process(&channel, &receipt_payload("wamid.rc1", "read"))
            .await
            .unwrap();
        assert_eq!(counters(&pool, campaign_id).await, (1, 1));
    }

    #[sqlx::test(migrations = "../chatcast-storage/migrations")]
    async fn test_read_overtaking_delivered_counts_both_once(pool: PgPool) {
        let (channel, campaign_id) = seed_outbound_message(&pool).await;
        let reconciler = StatusReconciler::new(pool.clone());

        // The read receipt lands first and accounts for both counters
        reconciler
            .process(&channel, &receipt_payload("wamid.rc1", "read"))
            .await
            .unwrap();
        assert_eq!(counters(&pool, campaign_id).await, (1, 1));

        // The late delivered receipt finds the message already read
        reconciler
            .process(&channel, &receipt_payload("wamid.rc1", "delivered"))
            .await
            .unwrap();
        assert_eq!(counters(&pool, campaign_id).await, (1, 1));
    }
}
