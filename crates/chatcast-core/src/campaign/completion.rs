//! Campaign completion detection.

use chatcast_common::types::CampaignId;
use chatcast_storage::models::{Campaign, CampaignKind, CampaignStatus};
use chatcast_storage::repository::CampaignRepository;
use sqlx::PgPool;
use tracing::info;

/// Transitions a campaign to `completed` once every recipient is
/// accounted for.
#[derive(Clone)]
pub struct CompletionDetector {
    campaigns: CampaignRepository,
}

impl CompletionDetector {
    pub fn new(pool: PgPool) -> Self {
        Self {
            campaigns: CampaignRepository::new(pool),
        }
    }

    /// Re-read the campaign's counters and complete it if warranted.
    ///
    /// The transition itself is a single guarded UPDATE, so concurrent or
    /// repeated evaluations complete the campaign exactly once. Returns
    /// whether this call performed the transition.
    pub async fn maybe_complete(&self, campaign_id: CampaignId) -> Result<bool, sqlx::Error> {
        let Some(campaign) = self.campaigns.get(campaign_id).await? else {
            return Ok(false);
        };

        if !should_complete(&campaign) {
            return Ok(false);
        }

        let completed = self.campaigns.try_complete(campaign_id).await?;
        if let Some(campaign) = &completed {
            info!(
                campaign_id = %campaign.id,
                sent = campaign.sent_count,
                failed = campaign.failed_count,
                recipients = campaign.recipient_count,
                "Campaign completed"
            );
        }
        Ok(completed.is_some())
    }
}

/// Whether a campaign's counters warrant completion.
///
/// Externally-triggered campaigns are unbounded and stay active until
/// explicitly stopped; they never complete here.
fn should_complete(campaign: &Campaign) -> bool {
    if campaign.status_enum() != Some(CampaignStatus::Active) {
        return false;
    }
    if campaign.kind_enum() == Some(CampaignKind::ExternallyTriggered) {
        return false;
    }
    campaign.recipient_count > 0
        && campaign.sent_count + campaign.failed_count >= campaign.recipient_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn campaign(kind: &str, status: &str, recipients: i32, sent: i32, failed: i32) -> Campaign {
        Campaign {
            id: uuid::Uuid::new_v4(),
            channel_id: uuid::Uuid::new_v4(),
            name: "test".to_string(),
            kind: kind.to_string(),
            message_kind: "marketing".to_string(),
            template_id: uuid::Uuid::new_v4(),
            template_name: "welcome".to_string(),
            template_language: "en".to_string(),
            variable_mapping: serde_json::json!([]),
            group_ids: serde_json::json!([]),
            upload_rows: serde_json::json!([]),
            recipients: serde_json::json!([]),
            status: status.to_string(),
            scheduled_at: None,
            api_key: None,
            recipient_count: recipients,
            sent_count: sent,
            delivered_count: 0,
            read_count: 0,
            replied_count: 0,
            failed_count: failed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_completes_when_all_accounted_for() {
        assert!(should_complete(&campaign("from_list", "active", 2, 1, 1)));
        assert!(should_complete(&campaign("from_upload", "active", 3, 3, 0)));
    }

    #[test]
    fn test_waits_for_remaining_recipients() {
        assert!(!should_complete(&campaign("from_list", "active", 2, 1, 0)));
    }

    #[test]
    fn test_ignores_non_active_and_empty_campaigns() {
        assert!(!should_complete(&campaign("from_list", "completed", 2, 2, 0)));
        assert!(!should_complete(&campaign("from_list", "paused", 2, 2, 0)));
        assert!(!should_complete(&campaign("from_list", "active", 0, 0, 0)));
    }

    #[test]
    fn test_externally_triggered_never_completes() {
        assert!(!should_complete(&campaign(
            "externally_triggered",
            "active",
            1,
            5,
            0
        )));
    }
}
