//! Database models

use chatcast_common::types::{
    CampaignId, ChannelId, ContactId, ConversationId, GroupId, MessageId, Recipient, TemplateId,
    VariableMapping,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Channel model - a configured connection to the messaging gateway
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    /// Provider-side phone number identity
    pub phone_number_id: String,
    pub access_token: String,
    /// Shared secret for webhook signature verification
    pub app_secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Template model - a gateway-approved, parameterized message body
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub channel_id: ChannelId,
    pub name: String,
    pub language: String,
    pub category: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contact model - deduplicated by phone within a channel
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub channel_id: ChannelId,
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub tags: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contact group model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContactGroup {
    pub id: GroupId,
    pub channel_id: ChannelId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Conversation model - one per (channel, phone), the anchor that inbound
/// replies and outbound campaign messages both attach to
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub channel_id: ChannelId,
    pub contact_id: ContactId,
    pub phone: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Message direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Outbound,
    Inbound,
}

impl std::fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageDirection::Outbound => write!(f, "outbound"),
            MessageDirection::Inbound => write!(f, "inbound"),
        }
    }
}

impl std::str::FromStr for MessageDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outbound" => Ok(MessageDirection::Outbound),
            "inbound" => Ok(MessageDirection::Inbound),
            _ => Err(format!("Invalid message direction: {}", s)),
        }
    }
}

/// Message delivery status.
///
/// Outbound messages only move forward along `sent -> delivered -> read`,
/// or jump from `sent` to `failed` and never change again. Inbound messages
/// hold the terminal `received` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
    Received,
}

impl MessageStatus {
    /// Statuses a message may hold immediately before moving to `self`.
    ///
    /// An empty slice means the status is never reached by transition.
    pub fn allowed_prior(self) -> &'static [MessageStatus] {
        match self {
            MessageStatus::Sent => &[],
            MessageStatus::Delivered => &[MessageStatus::Sent],
            MessageStatus::Read => &[MessageStatus::Sent, MessageStatus::Delivered],
            MessageStatus::Failed => &[MessageStatus::Sent],
            MessageStatus::Received => &[],
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Read => write!(f, "read"),
            MessageStatus::Failed => write!(f, "failed"),
            MessageStatus::Received => write!(f, "received"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            "failed" => Ok(MessageStatus::Failed),
            "received" => Ok(MessageStatus::Received),
            _ => Err(format!("Invalid message status: {}", s)),
        }
    }
}

/// Message model - one row per attempted send that reached the gateway,
/// plus inbound replies
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub campaign_id: Option<CampaignId>,
    pub direction: String,
    pub body: String,
    pub provider_message_id: Option<String>,
    pub status: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Get status enum
    pub fn status_enum(&self) -> Option<MessageStatus> {
        self.status.parse().ok()
    }
}

/// Campaign kind - how the recipient set is sourced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    FromList,
    FromUpload,
    ExternallyTriggered,
}

impl std::fmt::Display for CampaignKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignKind::FromList => write!(f, "from_list"),
            CampaignKind::FromUpload => write!(f, "from_upload"),
            CampaignKind::ExternallyTriggered => write!(f, "externally_triggered"),
        }
    }
}

impl std::str::FromStr for CampaignKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "from_list" => Ok(CampaignKind::FromList),
            "from_upload" => Ok(CampaignKind::FromUpload),
            "externally_triggered" => Ok(CampaignKind::ExternallyTriggered),
            _ => Err(format!("Invalid campaign kind: {}", s)),
        }
    }
}

/// Message kind - the gateway's template category for the send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Marketing,
    Transactional,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Marketing => write!(f, "marketing"),
            MessageKind::Transactional => write!(f, "transactional"),
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "marketing" => Ok(MessageKind::Marketing),
            "transactional" => Ok(MessageKind::Transactional),
            _ => Err(format!("Invalid message kind: {}", s)),
        }
    }
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Active,
    Paused,
    Completed,
    Failed,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Active => write!(f, "active"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            "failed" => Ok(CampaignStatus::Failed),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub channel_id: ChannelId,
    pub name: String,
    pub kind: String,
    pub message_kind: String,
    pub template_id: TemplateId,
    pub template_name: String,
    pub template_language: String,
    /// Ordered placeholder-key -> recipient-field mapping
    pub variable_mapping: serde_json::Value,
    /// Group ids for `from_list` campaigns
    pub group_ids: serde_json::Value,
    /// Uploaded row set for `from_upload` campaigns
    pub upload_rows: serde_json::Value,
    /// Recipient list snapshot frozen at creation
    pub recipients: serde_json::Value,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Trigger key, present only for `externally_triggered` campaigns
    pub api_key: Option<String>,
    pub recipient_count: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub read_count: i32,
    pub replied_count: i32,
    pub failed_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// Get kind enum
    pub fn kind_enum(&self) -> Option<CampaignKind> {
        self.kind.parse().ok()
    }

    /// Decode the frozen recipient snapshot
    pub fn recipients_vec(&self) -> Vec<Recipient> {
        serde_json::from_value(self.recipients.clone()).unwrap_or_default()
    }

    /// Decode the variable mapping
    pub fn mapping(&self) -> VariableMapping {
        serde_json::from_value(self.variable_mapping.clone()).unwrap_or_default()
    }

    /// Derived callback endpoint for externally-triggered campaigns
    pub fn trigger_endpoint(&self) -> Option<String> {
        self.api_key
            .as_ref()
            .map(|key| format!("/campaigns/send/{}", key))
    }
}

/// Create campaign input (full record, recipients already resolved)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaignRecord {
    pub channel_id: ChannelId,
    pub name: String,
    pub kind: CampaignKind,
    pub message_kind: MessageKind,
    pub template_id: TemplateId,
    pub template_name: String,
    pub template_language: String,
    pub variable_mapping: serde_json::Value,
    pub group_ids: serde_json::Value,
    pub upload_rows: serde_json::Value,
    pub recipients: serde_json::Value,
    pub status: CampaignStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub api_key: Option<String>,
    pub recipient_count: i32,
}

/// Create contact input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateContact {
    pub channel_id: ChannelId,
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub tags: Vec<String>,
}

/// Create conversation input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversation {
    pub channel_id: ChannelId,
    pub contact_id: ContactId,
    pub phone: String,
}

/// Create message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessage {
    pub conversation_id: ConversationId,
    pub campaign_id: Option<CampaignId>,
    pub direction: MessageDirection,
    pub body: String,
    pub provider_message_id: Option<String>,
    pub status: MessageStatus,
}

/// API key model (management API authentication)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: uuid::Uuid,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Whether the key has passed its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| at < Utc::now())
            .unwrap_or(false)
    }
}

/// Campaign analytics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignAnalytics {
    pub campaign_id: CampaignId,
    pub status: String,
    pub recipient_count: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub read_count: i32,
    pub replied_count: i32,
    pub failed_count: i32,
    /// delivered / recipients * 100
    pub delivery_rate: f64,
    /// read / delivered * 100
    pub read_rate: f64,
}
