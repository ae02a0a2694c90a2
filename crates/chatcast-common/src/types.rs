//! Common types for ChatCast

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for channels
pub type ChannelId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for contact groups
pub type GroupId = Uuid;

/// Unique identifier for conversations
pub type ConversationId = Uuid;

/// Unique identifier for messages
pub type MessageId = Uuid;

/// Unique identifier for templates
pub type TemplateId = Uuid;

/// Phone number in international format
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse and normalize a phone number.
    ///
    /// Accepts an optional leading `+`, strips spaces, dashes and
    /// parentheses, and requires 7-15 digits (E.164 bounds).
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        let rest = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let digits: String = rest
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if digits.len() < 7 || digits.len() > 15 {
            return None;
        }

        Some(Self(digits))
    }

    /// The normalized digits, without a leading `+`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid phone number".to_string()))
    }
}

/// A single variable binding: a positional template placeholder key
/// mapped to a named recipient field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableBinding {
    /// Placeholder key, corresponds to `{{1}}`, `{{2}}`, ... by position
    pub key: String,
    /// Recipient field name to bind (e.g. "name", "phone", "email")
    pub field: String,
}

/// Ordered association between template placeholders and recipient fields.
///
/// Order is significant: the n-th binding fills placeholder `{{n}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableMapping(pub Vec<VariableBinding>);

impl VariableMapping {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn bindings(&self) -> &[VariableBinding] {
        &self.0
    }
}

/// An ephemeral recipient: a phone number plus the field values used to
/// bind template variables for one send. Materializes into a Contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub phone: PhoneNumber,
    /// Field map used for template binding (name, phone, email, ...)
    #[serde(default)]
    pub fields: HashMap<String, String>,
    /// Contact this recipient resolved to, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<ContactId>,
}

impl Recipient {
    pub fn new(phone: PhoneNumber) -> Self {
        Self {
            phone,
            fields: HashMap::new(),
            contact_id: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}
