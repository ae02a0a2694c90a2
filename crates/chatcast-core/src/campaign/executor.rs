//! Delivery executor.
//!
//! Drives the per-campaign send loop: bind template parameters, dispatch
//! through the gateway, persist message and conversation state, and apply
//! counter increments. Sends run on a bounded worker pool; campaign status
//! is rechecked between chunks so an administrative stop halts an
//! in-flight batch promptly instead of burning the provider's rate budget.
//!
//! This component is the only writer of `sent_count`; it shares
//! `failed_count` with the reconciler's failure receipts. It never touches
//! the delivered/read/replied counters.

use crate::campaign::{binder, CampaignError, CompletionDetector};
use crate::conversations::ConversationUpsert;
use crate::gateway::{Gateway, GatewayFactory, TemplateSend};
use chatcast_common::config::GatewayConfig;
use chatcast_common::types::{CampaignId, Recipient, VariableMapping};
use chatcast_storage::models::{
    Campaign, CampaignStatus, Channel, CreateMessage, MessageDirection, MessageStatus, Template,
};
use chatcast_storage::repository::{
    CampaignRepository, ChannelRepository, MessageRepository, TemplateRepository,
};
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Shared per-execution state handed to each send task
struct SendContext {
    campaign: Campaign,
    template: Template,
    mapping: VariableMapping,
    gateway: Arc<dyn Gateway>,
}

/// Campaigns with a delivery loop currently running in this process.
/// A second trigger while a loop is running must not start an
/// overlapping loop over the same snapshot.
#[derive(Default)]
struct InFlight(Mutex<HashSet<CampaignId>>);

impl InFlight {
    /// Claim a campaign for execution; `None` while another loop holds it.
    fn claim(self: &Arc<Self>, id: CampaignId) -> Option<InFlightClaim> {
        let mut held = self.0.lock().unwrap_or_else(|e| e.into_inner());
        held.insert(id).then(|| InFlightClaim {
            set: Arc::clone(self),
            id,
        })
    }
}

struct InFlightClaim {
    set: Arc<InFlight>,
    id: CampaignId,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.set
            .0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// Delivery executor
#[derive(Clone)]
pub struct DeliveryExecutor {
    campaigns: CampaignRepository,
    channels: ChannelRepository,
    templates: TemplateRepository,
    messages: MessageRepository,
    threads: ConversationUpsert,
    completion: CompletionDetector,
    gateway: Arc<dyn GatewayFactory>,
    in_flight: Arc<InFlight>,
    concurrency: usize,
    status_check_interval: usize,
}

impl DeliveryExecutor {
    pub fn new(pool: PgPool, gateway: Arc<dyn GatewayFactory>, config: &GatewayConfig) -> Self {
        Self {
            campaigns: CampaignRepository::new(pool.clone()),
            channels: ChannelRepository::new(pool.clone()),
            templates: TemplateRepository::new(pool.clone()),
            messages: MessageRepository::new(pool.clone()),
            threads: ConversationUpsert::new(pool.clone()),
            completion: CompletionDetector::new(pool),
            gateway,
            in_flight: Arc::new(InFlight::default()),
            concurrency: config.send_concurrency.max(1),
            status_check_interval: config.status_check_interval.max(1),
        }
    }

    /// Run the delivery loop for a campaign.
    ///
    /// Safe to invoke redundantly (once on creation, once on an explicit
    /// start, again after re-activation): a missing or non-active campaign
    /// is a logged no-op, a loop already running in this process keeps its
    /// claim, and recipients that already hold an outbound message are
    /// skipped.
    pub async fn execute(&self, campaign_id: CampaignId) -> Result<(), CampaignError> {
        let Some(_claim) = self.in_flight.claim(campaign_id) else {
            debug!(%campaign_id, "Delivery loop already running, skipping");
            return Ok(());
        };

        let Some(campaign) = self.campaigns.get(campaign_id).await? else {
            warn!(%campaign_id, "Execute called for unknown campaign, skipping");
            return Ok(());
        };

        if campaign.status_enum() != Some(CampaignStatus::Active) {
            debug!(
                %campaign_id,
                status = %campaign.status,
                "Campaign is not active, skipping execution"
            );
            return Ok(());
        }

        let snapshot = campaign.recipients_vec();
        if snapshot.is_empty() {
            debug!(%campaign_id, "Campaign has no resolved recipients");
            return Ok(());
        }

        let already_sent: HashSet<String> = self
            .messages
            .sent_recipient_phones(campaign_id)
            .await?
            .into_iter()
            .collect();
        let recipients = pending_recipients(snapshot, &already_sent);
        if recipients.is_empty() {
            debug!(%campaign_id, "Every recipient already has an outbound message");
            self.completion.maybe_complete(campaign_id).await?;
            return Ok(());
        }

        let channel = self
            .channels
            .get(campaign.channel_id)
            .await?
            .ok_or(CampaignError::ChannelNotFound)?;
        let template = self
            .templates
            .get(campaign.template_id)
            .await?
            .ok_or(CampaignError::TemplateNotFound)?;

        info!(
            %campaign_id,
            pending = recipients.len(),
            concurrency = self.concurrency,
            "Starting campaign delivery"
        );

        let ctx = Arc::new(SendContext {
            mapping: campaign.mapping(),
            gateway: self.gateway.for_channel(&channel),
            campaign,
            template,
        });
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        for (chunk_index, chunk) in recipients.chunks(self.status_check_interval).enumerate() {
            if chunk_index > 0 && !self.still_active(campaign_id).await? {
                info!(%campaign_id, "Campaign left active status, halting delivery");
                break;
            }

            let mut handles = Vec::new();
            for recipient in chunk {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| CampaignError::Internal(anyhow::anyhow!(e)))?;
                let executor = self.clone();
                let ctx = Arc::clone(&ctx);
                let recipient = recipient.clone();

                handles.push(tokio::spawn(async move {
                    executor.deliver(&ctx, &recipient).await;
                    drop(permit);
                }));
            }

            for handle in handles {
                if let Err(e) = handle.await {
                    error!(%campaign_id, "Send task failed: {}", e);
                }
            }
        }

        self.completion.maybe_complete(campaign_id).await?;
        Ok(())
    }

    /// One ad-hoc send outside the campaign loop, used by the
    /// externally-triggered path. Returns the provider message id.
    ///
    /// The campaign's recipient count is untouched; only sent/failed
    /// counters move.
    pub async fn send_single(
        &self,
        campaign: &Campaign,
        channel: &Channel,
        template: &Template,
        recipient: &Recipient,
    ) -> Result<String, CampaignError> {
        let ctx = SendContext {
            mapping: campaign.mapping(),
            gateway: self.gateway.for_channel(channel),
            campaign: campaign.clone(),
            template: template.clone(),
        };

        let parameters = binder::bind(&ctx.mapping, &recipient.fields);
        match self.dispatch(&ctx, recipient, &parameters).await {
            Ok(provider_message_id) => {
                self.record_sent(&ctx, recipient, &parameters, &provider_message_id)
                    .await?;
                Ok(provider_message_id)
            }
            Err(e) => {
                self.campaigns.increment_failed(campaign.id).await?;
                Err(CampaignError::Gateway(e))
            }
        }
    }

    async fn still_active(&self, campaign_id: CampaignId) -> Result<bool, sqlx::Error> {
        Ok(self
            .campaigns
            .get(campaign_id)
            .await?
            .and_then(|c| c.status_enum())
            == Some(CampaignStatus::Active))
    }

    /// Deliver to one recipient inside the campaign loop. Failures are
    /// absorbed into the failed counter; one bad recipient never aborts
    /// the batch.
    async fn deliver(&self, ctx: &SendContext, recipient: &Recipient) {
        let parameters = binder::bind(&ctx.mapping, &recipient.fields);

        match self.dispatch(ctx, recipient, &parameters).await {
            Ok(provider_message_id) => {
                if let Err(e) = self
                    .record_sent(ctx, recipient, &parameters, &provider_message_id)
                    .await
                {
                    error!(
                        campaign_id = %ctx.campaign.id,
                        phone = %recipient.phone,
                        "Failed to persist sent message: {}",
                        e
                    );
                }
            }
            Err(e) => {
                warn!(
                    campaign_id = %ctx.campaign.id,
                    phone = %recipient.phone,
                    "Gateway send failed: {}",
                    e
                );
                if let Err(e) = self.campaigns.increment_failed(ctx.campaign.id).await {
                    error!(
                        campaign_id = %ctx.campaign.id,
                        "Failed to increment failed counter: {}",
                        e
                    );
                }
            }
        }
    }

    async fn dispatch(
        &self,
        ctx: &SendContext,
        recipient: &Recipient,
        parameters: &[String],
    ) -> Result<String, crate::gateway::GatewayError> {
        let send = TemplateSend {
            to: recipient.phone.as_str().to_string(),
            template_name: ctx.campaign.template_name.clone(),
            language: ctx.campaign.template_language.clone(),
            parameters: parameters.to_vec(),
        };
        ctx.gateway.send_template(&send).await
    }

    /// Persist the side effects of a successful gateway dispatch:
    /// conversation/contact upsert, the `sent` message row, the inbox
    /// preview, and the sent counter.
    async fn record_sent(
        &self,
        ctx: &SendContext,
        recipient: &Recipient,
        parameters: &[String],
        provider_message_id: &str,
    ) -> Result<(), sqlx::Error> {
        let conversation = self
            .threads
            .ensure(
                ctx.campaign.channel_id,
                &recipient.phone,
                recipient.field("name"),
                recipient.field("email"),
                &[],
            )
            .await?;

        let body = binder::render_body(&ctx.template.body, parameters);

        self.messages
            .create(CreateMessage {
                conversation_id: conversation.id,
                campaign_id: Some(ctx.campaign.id),
                direction: MessageDirection::Outbound,
                body: body.clone(),
                provider_message_id: Some(provider_message_id.to_string()),
                status: MessageStatus::Sent,
            })
            .await?;

        self.threads
            .touch(&conversation, &body, chrono::Utc::now())
            .await?;

        self.campaigns.increment_sent(ctx.campaign.id).await?;
        Ok(())
    }
}

/// Recipients from the frozen snapshot with no outbound message yet, so a
/// re-invoked loop resumes where the previous one stopped
fn pending_recipients(
    recipients: Vec<Recipient>,
    already_sent: &HashSet<String>,
) -> Vec<Recipient> {
    recipients
        .into_iter()
        .filter(|r| !already_sent.contains(r.phone.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use async_trait::async_trait;
    use chatcast_common::types::PhoneNumber;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn recipient(phone: &str) -> Recipient {
        Recipient::new(PhoneNumber::parse(phone).unwrap())
    }

    #[test]
    fn test_pending_recipients_skips_already_messaged() {
        let recipients = vec![recipient("15550100001"), recipient("15550100002")];
        let already_sent: HashSet<String> = ["15550100001".to_string()].into_iter().collect();

        let pending = pending_recipients(recipients, &already_sent);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].phone.as_str(), "15550100002");
    }

    #[test]
    fn test_in_flight_claim_blocks_overlap() {
        let set = Arc::new(InFlight::default());
        let id = Uuid::new_v4();

        let claim = set.claim(id);
        assert!(claim.is_some());
        assert!(set.claim(id).is_none());

        drop(claim);
        assert!(set.claim(id).is_some());
    }

    struct CountingGateway {
        sends: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Gateway for CountingGateway {
        async fn send_template(&self, _send: &TemplateSend) -> Result<String, GatewayError> {
            let n = self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(format!("wamid.exec{}", n))
        }
    }

    struct CountingFactory {
        sends: Arc<AtomicUsize>,
    }

    impl GatewayFactory for CountingFactory {
        fn for_channel(&self, _channel: &Channel) -> Arc<dyn Gateway> {
            Arc::new(CountingGateway {
                sends: self.sends.clone(),
            })
        }
    }

    async fn seed_active_campaign(pool: &PgPool) -> CampaignId {
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
                template_name, template_language, variable_mapping,
                recipients, status, recipient_count
            )
            VALUES ($1, $2, 'spring', 'from_list', 'marketing', $3,
                    'welcome', 'en', $4, $5, 'active', 2)
            "#,
        )
        .bind(campaign_id)
        .bind(channel_id)
        .bind(template_id)
        .bind(serde_json::json!([{ "key": "1", "field": "name" }]))
        .bind(serde_json::json!([
            { "phone": "15550100001", "fields": { "name": "Ada" } },
            { "phone": "15550100002", "fields": { "name": "Grace" } }
        ]))
        .execute(pool)
        .await
        .unwrap();

        campaign_id
    }

    #[sqlx::test(migrations = "../chatcast-storage/migrations")]
    async fn test_reinvoked_execute_never_resends(pool: PgPool) {
        let campaign_id = seed_active_campaign(&pool).await;
        let sends = Arc::new(AtomicUsize::new(0));
        let executor = DeliveryExecutor::new(
            pool.clone(),
            Arc::new(CountingFactory {
                sends: sends.clone(),
            }),
            &GatewayConfig::default(),
        );
        let campaigns = CampaignRepository::new(pool.clone());

        executor.execute(campaign_id).await.unwrap();
        assert_eq!(sends.load(Ordering::SeqCst), 2);

        let row = campaigns.get(campaign_id).await.unwrap().unwrap();
        assert_eq!(row.sent_count, 2);
        assert_eq!(row.status, "completed");

        // Re-activate and trigger again: every recipient already holds an
        // outbound message, so nothing is dispatched
        campaigns
            .update_status(campaign_id, CampaignStatus::Active)
            .await
            .unwrap();
        executor.execute(campaign_id).await.unwrap();

        assert_eq!(sends.load(Ordering::SeqCst), 2);
        let row = campaigns.get(campaign_id).await.unwrap().unwrap();
        assert_eq!(row.sent_count, 2);
        assert_eq!(row.status, "completed");
    }
}
