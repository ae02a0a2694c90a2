//! Campaign repository
//!
//! Counter updates are single arithmetic UPDATEs so the delivery executor
//! and the status reconciler can increment disjoint counters concurrently
//! without clobbering each other.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Campaign, CampaignStatus, CreateCampaignRecord};

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    pool: PgPool,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new campaign with a frozen recipient snapshot
    pub async fn create(&self, input: CreateCampaignRecord) -> Result<Campaign, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, channel_id, name, kind, message_kind, template_id,
                template_name, template_language, variable_mapping, group_ids,
                upload_rows, recipients, status, scheduled_at, api_key,
                recipient_count, started_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                CASE WHEN $13 = 'active' THEN NOW() ELSE NULL END
            )
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.channel_id)
        .bind(&input.name)
        .bind(input.kind.to_string())
        .bind(input.message_kind.to_string())
        .bind(input.template_id)
        .bind(&input.template_name)
        .bind(&input.template_language)
        .bind(&input.variable_mapping)
        .bind(&input.group_ids)
        .bind(&input.upload_rows)
        .bind(&input.recipients)
        .bind(input.status.to_string())
        .bind(input.scheduled_at)
        .bind(&input.api_key)
        .bind(input.recipient_count)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a campaign by ID
    pub async fn get(&self, id: Uuid) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a campaign by its externally-callable trigger key
    pub async fn get_by_api_key(&self, api_key: &str) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE api_key = $1")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await
    }

    /// List campaigns, optionally filtered by status
    pub async fn list(
        &self,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        if let Some(status) = status {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                WHERE status = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                ORDER BY created_at DESC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Update campaign status, stamping started_at/completed_at as appropriate
    pub async fn update_status(
        &self,
        id: Uuid,
        status: CampaignStatus,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let started_at = if status == CampaignStatus::Active {
            Some(chrono::Utc::now())
        } else {
            None
        };

        let completed_at = if matches!(
            status,
            CampaignStatus::Completed | CampaignStatus::Failed
        ) {
            Some(chrono::Utc::now())
        } else {
            None
        };

        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = $2,
                started_at = COALESCE(started_at, $3),
                completed_at = COALESCE($4, completed_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(started_at)
        .bind(completed_at)
        .fetch_optional(&self.pool)
        .await
    }

    /// Increment sent_count by 1 (delivery executor only)
    pub async fn increment_sent(&self, id: Uuid) -> Result<(), sqlx::Error> {
        self.increment(id, "sent_count = sent_count + 1").await
    }

    /// Increment failed_count by 1 (executor on gateway error, reconciler on
    /// failure receipts)
    pub async fn increment_failed(&self, id: Uuid) -> Result<(), sqlx::Error> {
        self.increment(id, "failed_count = failed_count + 1").await
    }

    /// Increment delivered_count by 1 (status reconciler only)
    pub async fn increment_delivered(&self, id: Uuid) -> Result<(), sqlx::Error> {
        self.increment(id, "delivered_count = delivered_count + 1")
            .await
    }

    /// Increment read_count by 1 (status reconciler only)
    pub async fn increment_read(&self, id: Uuid) -> Result<(), sqlx::Error> {
        self.increment(id, "read_count = read_count + 1").await
    }

    /// Increment delivered_count and read_count together, for a `read`
    /// receipt that arrives while the message is still `sent`
    pub async fn increment_delivered_and_read(&self, id: Uuid) -> Result<(), sqlx::Error> {
        self.increment(
            id,
            "delivered_count = delivered_count + 1, read_count = read_count + 1",
        )
        .await
    }

    /// Increment replied_count by 1 (status reconciler only)
    pub async fn increment_replied(&self, id: Uuid) -> Result<(), sqlx::Error> {
        self.increment(id, "replied_count = replied_count + 1")
            .await
    }

    async fn increment(&self, id: Uuid, set_clause: &str) -> Result<(), sqlx::Error> {
        // set_clause comes from the fixed strings above, never from input
        let sql = format!(
            "UPDATE campaigns SET {}, updated_at = NOW() WHERE id = $1",
            set_clause
        );
        sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Transition an active campaign to completed once every recipient is
    /// accounted for. Evaluated as a single statement so re-running against
    /// an already-completed campaign is a no-op.
    ///
    /// Externally-triggered campaigns are unbounded and never complete here.
    pub async fn try_complete(&self, id: Uuid) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = 'completed',
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND status = 'active'
              AND kind <> 'externally_triggered'
              AND recipient_count > 0
              AND sent_count + failed_count >= recipient_count
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CampaignKind, MessageKind};
    use pretty_assertions::assert_eq;

    async fn seed_campaign(
        pool: &PgPool,
        kind: CampaignKind,
        recipient_count: i32,
    ) -> (CampaignRepository, Campaign) {
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

        let repo = CampaignRepository::new(pool.clone());
        let campaign = repo
            .create(CreateCampaignRecord {
                channel_id,
                name: "spring".to_string(),
                kind,
                message_kind: MessageKind::Marketing,
                template_id,
                template_name: "welcome".to_string(),
                template_language: "en".to_string(),
                variable_mapping: serde_json::json!([]),
                group_ids: serde_json::json!([]),
                upload_rows: serde_json::json!([]),
                recipients: serde_json::json!([]),
                status: CampaignStatus::Active,
                scheduled_at: None,
                api_key: matches!(kind, CampaignKind::ExternallyTriggered)
                    .then(|| "cc_test_trigger_key".to_string()),
                recipient_count,
            })
            .await
            .unwrap();

        (repo, campaign)
    }

    #[sqlx::test]
    async fn test_try_complete_fires_once(pool: PgPool) {
        let (repo, campaign) = seed_campaign(&pool, CampaignKind::FromList, 2).await;

        repo.increment_sent(campaign.id).await.unwrap();
        repo.increment_failed(campaign.id).await.unwrap();

        let completed = repo.try_complete(campaign.id).await.unwrap().unwrap();
        assert_eq!(completed.status, "completed");
        assert!(completed.completed_at.is_some());

        // The guard matches zero rows on a second attempt
        assert!(repo.try_complete(campaign.id).await.unwrap().is_none());
    }

    #[sqlx::test]
    async fn test_try_complete_requires_full_accounting(pool: PgPool) {
        let (repo, campaign) = seed_campaign(&pool, CampaignKind::FromList, 2).await;

        repo.increment_sent(campaign.id).await.unwrap();

        assert!(repo.try_complete(campaign.id).await.unwrap().is_none());
        let row = repo.get(campaign.id).await.unwrap().unwrap();
        assert_eq!(row.status, "active");
    }

    #[sqlx::test]
    async fn test_try_complete_skips_externally_triggered(pool: PgPool) {
        let (repo, campaign) =
            seed_campaign(&pool, CampaignKind::ExternallyTriggered, 0).await;

        repo.increment_sent(campaign.id).await.unwrap();

        assert!(repo.try_complete(campaign.id).await.unwrap().is_none());
        let row = repo.get(campaign.id).await.unwrap().unwrap();
        assert_eq!(row.status, "active");
    }
}
