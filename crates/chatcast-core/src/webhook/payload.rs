//! Gateway webhook payload types.
//!
//! The provider posts one payload per batch of events; each change value
//! carries either delivery-status receipts for outbound messages or
//! inbound messages authored by recipients. Unknown fields are ignored so
//! provider-side payload additions never break parsing.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub field: Option<String>,
    pub value: Option<ChangeValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeValue {
    pub messaging_product: Option<String>,
    pub metadata: Option<Metadata>,
    /// Delivery-status receipts for outbound messages
    #[serde(default)]
    pub statuses: Vec<StatusReceipt>,
    /// Inbound messages authored by recipients
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub display_phone_number: Option<String>,
    pub phone_number_id: Option<String>,
}

/// One delivery receipt: the provider message id plus its new status
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReceipt {
    pub id: String,
    pub status: String,
    pub timestamp: Option<String>,
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<ReceiptError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptError {
    pub code: Option<i64>,
    pub title: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub id: String,
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<TextBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookContact {
    pub wa_id: String,
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
}

impl WebhookPayload {
    /// All change values across entries, flattened
    pub fn values(&self) -> impl Iterator<Item = &ChangeValue> {
        self.entry
            .iter()
            .flat_map(|e| e.changes.iter())
            .filter_map(|c| c.value.as_ref())
    }
}
