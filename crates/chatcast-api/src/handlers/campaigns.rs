//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chatcast_core::campaign::NewCampaign;
use chatcast_core::CampaignError;
use chatcast_storage::models::{Campaign, CampaignAnalytics, CampaignStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AppState;
use crate::error::ApiError;

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Campaign list response
#[derive(Debug, Serialize)]
pub struct CampaignListResponse {
    pub data: Vec<CampaignResponse>,
    pub limit: i64,
    pub offset: i64,
}

/// Campaign response
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub name: String,
    pub kind: String,
    pub message_kind: String,
    pub template_name: String,
    pub template_language: String,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Trigger key for externally-triggered campaigns; callers need it to
    /// drive the send endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_endpoint: Option<String>,
    pub recipient_count: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub read_count: i32,
    pub replied_count: i32,
    pub failed_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        let trigger_endpoint = c.trigger_endpoint();
        Self {
            id: c.id,
            channel_id: c.channel_id,
            name: c.name,
            kind: c.kind,
            message_kind: c.message_kind,
            template_name: c.template_name,
            template_language: c.template_language,
            status: c.status,
            scheduled_at: c.scheduled_at,
            api_key: c.api_key,
            trigger_endpoint,
            recipient_count: c.recipient_count,
            sent_count: c.sent_count,
            delivered_count: c.delivered_count,
            read_count: c.read_count,
            replied_count: c.replied_count,
            failed_count: c.failed_count,
            started_at: c.started_at,
            completed_at: c.completed_at,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Request body for changing a campaign's status
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Create a campaign
///
/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewCampaign>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state.campaigns.create(input).await?;
    Ok(Json(campaign.into()))
}

/// List campaigns
///
/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<CampaignListResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<CampaignStatus>()
                .map_err(CampaignError::Validation)
        })
        .transpose()?;

    let limit = query.limit.clamp(1, 200);
    let campaigns = state.campaigns.list(status, limit, query.offset).await?;

    Ok(Json(CampaignListResponse {
        data: campaigns.into_iter().map(Into::into).collect(),
        limit,
        offset: query.offset,
    }))
}

/// Get a campaign
///
/// GET /api/v1/campaigns/:id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state.campaigns.get(id).await?;
    Ok(Json(campaign.into()))
}

/// Change a campaign's status; re-activating re-invokes delivery
///
/// PATCH /api/v1/campaigns/:id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let status = body
        .status
        .parse::<CampaignStatus>()
        .map_err(CampaignError::Validation)?;

    let campaign = state.campaigns.set_status(id, status).await?;
    Ok(Json(campaign.into()))
}

/// Manually trigger delivery for an active campaign
///
/// POST /api/v1/campaigns/:id/start
pub async fn start_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state.campaigns.start(id).await?;
    Ok(Json(campaign.into()))
}

/// Delivery counters and derived rates
///
/// GET /api/v1/campaigns/:id/analytics
pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignAnalytics>, ApiError> {
    let analytics = state.campaigns.analytics(id).await?;
    Ok(Json(analytics))
}
