//! Campaign lifecycle service.
//!
//! Validates and persists campaign definitions, freezes the resolved
//! recipient snapshot, and drives status transitions. Execution itself
//! lives in [`DeliveryExecutor`].

use crate::campaign::resolver::{RecipientResolver, UploadRow};
use crate::campaign::{CampaignError, DeliveryExecutor};
use chatcast_common::types::{CampaignId, ChannelId, GroupId, PhoneNumber, Recipient, TemplateId, VariableMapping};
use chatcast_storage::models::{
    Campaign, CampaignAnalytics, CampaignKind, CampaignStatus, CreateCampaignRecord, MessageKind,
};
use chatcast_storage::repository::{CampaignRepository, ChannelRepository, TemplateRepository};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Allows or denies starting a campaign, the single billing touchpoint
/// in the pipeline.
pub trait BillingGate: Send + Sync {
    fn allow_start(&self, channel_id: ChannelId, recipient_count: usize) -> bool;
}

/// Gate that allows everything; used when no billing enforcement is wired.
pub struct UnmeteredGate;

impl BillingGate for UnmeteredGate {
    fn allow_start(&self, _channel_id: ChannelId, _recipient_count: usize) -> bool {
        true
    }
}

/// Campaign creation input
#[derive(Debug, Clone, Deserialize)]
pub struct NewCampaign {
    pub channel_id: ChannelId,
    pub name: String,
    pub kind: CampaignKind,
    pub message_kind: MessageKind,
    pub template_id: TemplateId,
    #[serde(default)]
    pub variable_mapping: VariableMapping,
    #[serde(default)]
    pub group_ids: Vec<GroupId>,
    #[serde(default)]
    pub upload_rows: Vec<UploadRow>,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Activate and start delivering immediately instead of staying a draft
    #[serde(default)]
    pub activate: bool,
}

/// Campaign lifecycle service
#[derive(Clone)]
pub struct CampaignService {
    campaigns: CampaignRepository,
    channels: ChannelRepository,
    templates: TemplateRepository,
    resolver: RecipientResolver,
    executor: DeliveryExecutor,
    gate: Arc<dyn BillingGate>,
}

impl CampaignService {
    pub fn new(pool: PgPool, executor: DeliveryExecutor, gate: Arc<dyn BillingGate>) -> Self {
        Self {
            campaigns: CampaignRepository::new(pool.clone()),
            channels: ChannelRepository::new(pool.clone()),
            templates: TemplateRepository::new(pool.clone()),
            resolver: RecipientResolver::new(pool),
            executor,
            gate,
        }
    }

    /// Create a campaign: validate the definition, resolve and freeze the
    /// recipient snapshot, persist, and kick off delivery when activating.
    ///
    /// Validation failures surface before anything is persisted; a
    /// campaign never exists in a half-valid state.
    pub async fn create(&self, input: NewCampaign) -> Result<Campaign, CampaignError> {
        if input.name.trim().is_empty() {
            return Err(CampaignError::Validation(
                "Campaign name must not be empty".to_string(),
            ));
        }

        if self.channels.get(input.channel_id).await?.is_none() {
            return Err(CampaignError::ChannelNotFound);
        }

        let template = self
            .templates
            .get(input.template_id)
            .await?
            .ok_or(CampaignError::TemplateNotFound)?;
        if template.channel_id != input.channel_id {
            return Err(CampaignError::Validation(
                "Template belongs to a different channel".to_string(),
            ));
        }

        let recipients = match input.kind {
            CampaignKind::FromList => {
                if input.group_ids.is_empty() {
                    return Err(CampaignError::Validation(
                        "A list campaign needs at least one contact group".to_string(),
                    ));
                }
                self.resolver.resolve_groups(&input.group_ids).await?
            }
            CampaignKind::FromUpload => {
                if input.upload_rows.is_empty() {
                    return Err(CampaignError::Validation(
                        "An upload campaign needs at least one row".to_string(),
                    ));
                }
                self.resolver
                    .resolve_upload(input.channel_id, &input.name, &input.upload_rows)
                    .await?
            }
            // The recipient arrives with each trigger call; the stored
            // list stays empty
            CampaignKind::ExternallyTriggered => Vec::new(),
        };

        let status = initial_status(input.scheduled_at, input.activate, Utc::now());

        if status == CampaignStatus::Active
            && !self.gate.allow_start(input.channel_id, recipients.len())
        {
            return Err(CampaignError::SendingDenied);
        }

        let api_key = matches!(input.kind, CampaignKind::ExternallyTriggered)
            .then(generate_trigger_key);

        let record = CreateCampaignRecord {
            channel_id: input.channel_id,
            name: input.name,
            kind: input.kind,
            message_kind: input.message_kind,
            template_id: template.id,
            template_name: template.name.clone(),
            template_language: template.language.clone(),
            variable_mapping: serde_json::to_value(&input.variable_mapping)
                .map_err(anyhow::Error::from)?,
            group_ids: serde_json::to_value(&input.group_ids).map_err(anyhow::Error::from)?,
            upload_rows: serde_json::to_value(&input.upload_rows).map_err(anyhow::Error::from)?,
            recipients: serde_json::to_value(&recipients).map_err(anyhow::Error::from)?,
            status,
            scheduled_at: input.scheduled_at,
            api_key,
            recipient_count: recipients.len() as i32,
        };

        let campaign = self.campaigns.create(record).await?;

        info!(
            campaign_id = %campaign.id,
            kind = %campaign.kind,
            status = %campaign.status,
            recipients = campaign.recipient_count,
            "Campaign created"
        );

        if status == CampaignStatus::Active {
            self.spawn_execution(campaign.id);
        }

        Ok(campaign)
    }

    /// Get a campaign by id
    pub async fn get(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        self.campaigns.get(id).await?.ok_or(CampaignError::NotFound)
    }

    /// List campaigns, newest first
    pub async fn list(
        &self,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, CampaignError> {
        Ok(self.campaigns.list(status, limit, offset).await?)
    }

    /// Change a campaign's status. Re-activating a paused campaign
    /// re-invokes the executor for the remaining recipients.
    pub async fn set_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Campaign, CampaignError> {
        let campaign = self
            .campaigns
            .update_status(id, status)
            .await?
            .ok_or(CampaignError::NotFound)?;

        if status == CampaignStatus::Active {
            self.spawn_execution(id);
        }

        Ok(campaign)
    }

    /// Manual delivery trigger for an already-active campaign. Idempotent:
    /// already-sent recipients are never re-resolved, and a completed
    /// campaign makes the executor a no-op.
    pub async fn start(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        let campaign = self.get(id).await?;
        if campaign.status_enum() != Some(CampaignStatus::Active) {
            return Err(CampaignError::NotActive);
        }

        self.spawn_execution(id);
        Ok(campaign)
    }

    /// Aggregate delivery counters plus derived rates.
    ///
    /// Signals "not enough data yet" while a denominator is still zero,
    /// rather than reporting a misleading 0% or dividing by zero.
    pub async fn analytics(&self, id: CampaignId) -> Result<CampaignAnalytics, CampaignError> {
        let campaign = self.get(id).await?;

        let (delivery_rate, read_rate) = compute_rates(
            campaign.recipient_count,
            campaign.delivered_count,
            campaign.read_count,
        )
        .ok_or(CampaignError::InsufficientData)?;

        Ok(CampaignAnalytics {
            campaign_id: campaign.id,
            status: campaign.status,
            recipient_count: campaign.recipient_count,
            sent_count: campaign.sent_count,
            delivered_count: campaign.delivered_count,
            read_count: campaign.read_count,
            replied_count: campaign.replied_count,
            failed_count: campaign.failed_count,
            delivery_rate,
            read_rate,
        })
    }

    /// Externally-triggered single send: one recipient supplied by the
    /// caller of the trigger endpoint, dispatched outside the campaign
    /// loop. Returns the provider message id.
    ///
    /// The trigger key is checked before the request body, so an unknown
    /// key reads as unauthorized even when the body is also bad.
    pub async fn send_external(
        &self,
        api_key: &str,
        phone: Option<&str>,
        variables: HashMap<String, String>,
    ) -> Result<String, CampaignError> {
        let campaign = self
            .campaigns
            .get_by_api_key(api_key)
            .await?
            .ok_or(CampaignError::UnknownKey)?;

        if campaign.kind_enum() != Some(CampaignKind::ExternallyTriggered) {
            return Err(CampaignError::UnknownKey);
        }
        if campaign.status_enum() != Some(CampaignStatus::Active) {
            return Err(CampaignError::NotActive);
        }

        let phone = phone.and_then(PhoneNumber::parse).ok_or_else(|| {
            CampaignError::Validation("Missing or invalid phone".to_string())
        })?;

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

        let mut recipient = Recipient::new(phone);
        recipient.fields = variables;

        self.executor
            .send_single(&campaign, &channel, &template, &recipient)
            .await
    }

    fn spawn_execution(&self, id: CampaignId) {
        let executor = self.executor.clone();
        tokio::spawn(async move {
            if let Err(e) = executor.execute(id).await {
                error!(campaign_id = %id, "Campaign execution failed: {}", e);
            }
        });
    }
}

/// Initial status for a new campaign. A future schedule defers activation
/// to the scheduler collaborator regardless of the activate flag.
fn initial_status(
    scheduled_at: Option<DateTime<Utc>>,
    activate: bool,
    now: DateTime<Utc>,
) -> CampaignStatus {
    match scheduled_at {
        Some(at) if at > now => CampaignStatus::Scheduled,
        _ if activate => CampaignStatus::Active,
        _ => CampaignStatus::Draft,
    }
}

/// Derived analytics rates; `None` while a denominator is still zero.
fn compute_rates(recipient_count: i32, delivered_count: i32, read_count: i32) -> Option<(f64, f64)> {
    if recipient_count == 0 || delivered_count == 0 {
        return None;
    }
    let delivery_rate = f64::from(delivered_count) / f64::from(recipient_count) * 100.0;
    let read_rate = f64::from(read_count) / f64::from(delivered_count) * 100.0;
    Some((delivery_rate, read_rate))
}

/// Externally-callable trigger key for an externally-triggered campaign
fn generate_trigger_key() -> String {
    format!("cc_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_initial_status() {
        let now = Utc::now();
        let future = now + chrono::Duration::hours(1);
        let past = now - chrono::Duration::hours(1);

        assert_eq!(
            initial_status(Some(future), true, now),
            CampaignStatus::Scheduled
        );
        assert_eq!(initial_status(Some(past), true, now), CampaignStatus::Active);
        assert_eq!(initial_status(None, true, now), CampaignStatus::Active);
        assert_eq!(initial_status(None, false, now), CampaignStatus::Draft);
    }

    #[test]
    fn test_compute_rates() {
        let (delivery, read) = compute_rates(4, 2, 1).unwrap();
        assert_eq!(delivery, 50.0);
        assert_eq!(read, 50.0);
    }

    #[test]
    fn test_compute_rates_needs_data() {
        assert_eq!(compute_rates(0, 0, 0), None);
        assert_eq!(compute_rates(10, 0, 0), None);
    }

    #[test]
    fn test_trigger_key_shape() {
        let key = generate_trigger_key();
        assert!(key.starts_with("cc_"));
        assert_eq!(key.len(), 3 + 32);
        assert_ne!(key, generate_trigger_key());
    }

    #[test]
    fn test_unmetered_gate_allows() {
        assert!(UnmeteredGate.allow_start(Uuid::new_v4(), 1000));
    }

    use crate::gateway::{Gateway, GatewayError, GatewayFactory, TemplateSend};
    use async_trait::async_trait;
    use chatcast_common::config::GatewayConfig;
    use chatcast_storage::models::Channel;

    struct StubGateway;

    #[async_trait]
    impl Gateway for StubGateway {
        async fn send_template(&self, _send: &TemplateSend) -> Result<String, GatewayError> {
            Ok("wamid.stub".to_string())
        }
    }

    struct StubFactory;

    impl GatewayFactory for StubFactory {
        fn for_channel(&self, _channel: &Channel) -> Arc<dyn Gateway> {
            Arc::new(StubGateway)
        }
    }

    fn service(pool: PgPool) -> CampaignService {
        let executor = DeliveryExecutor::new(
            pool.clone(),
            Arc::new(StubFactory),
            &GatewayConfig::default(),
        );
        CampaignService::new(pool, executor, Arc::new(UnmeteredGate))
    }

    async fn seed_channel_and_template(pool: &PgPool) -> (ChannelId, TemplateId) {
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
            VALUES ($1, $2, 'order_update', 'en', 'utility', 'Order {{1}} shipped')
            "#,
        )
        .bind(template_id)
        .bind(channel_id)
        .execute(pool)
        .await
        .unwrap();

        (channel_id, template_id)
    }

    #[sqlx::test(migrations = "../chatcast-storage/migrations")]
    async fn test_send_external_checks_key_before_body(pool: PgPool) {
        let svc = service(pool);

        // Unknown key plus missing phone reads as unauthorized, not as a
        // body validation failure
        let err = svc
            .send_external("cc_unknown", None, HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::UnknownKey));
    }

    #[sqlx::test(migrations = "../chatcast-storage/migrations")]
    async fn test_send_external_missing_phone_is_validation(pool: PgPool) {
        let (channel_id, template_id) = seed_channel_and_template(&pool).await;
        let svc = service(pool.clone());

        let campaign = svc
            .create(NewCampaign {
                channel_id,
                name: "order updates".to_string(),
                kind: CampaignKind::ExternallyTriggered,
                message_kind: MessageKind::Transactional,
                template_id,
                variable_mapping: VariableMapping::default(),
                group_ids: vec![],
                upload_rows: vec![],
                scheduled_at: None,
                activate: true,
            })
            .await
            .unwrap();
        let key = campaign.api_key.unwrap();

        let err = svc.send_external(&key, None, HashMap::new()).await.unwrap_err();
        assert!(matches!(err, CampaignError::Validation(_)));
    }
}
