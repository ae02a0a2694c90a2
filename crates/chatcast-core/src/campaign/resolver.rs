//! Recipient resolution.
//!
//! Turns a campaign definition into the concrete recipient list. The
//! resolved list is frozen onto the campaign row at creation time; group
//! or list membership changes afterwards do not affect it.

use crate::campaign::CampaignError;
use chatcast_common::types::{ChannelId, GroupId, PhoneNumber, Recipient};
use chatcast_storage::models::{Contact, CreateContact};
use chatcast_storage::repository::{ContactGroupRepository, ContactRepository};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::{debug, warn};

/// One row of an ad-hoc uploaded recipient set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadRow {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Resolves campaign definitions to concrete recipient lists
#[derive(Clone)]
pub struct RecipientResolver {
    contacts: ContactRepository,
    groups: ContactGroupRepository,
}

impl RecipientResolver {
    pub fn new(pool: PgPool) -> Self {
        Self {
            contacts: ContactRepository::new(pool.clone()),
            groups: ContactGroupRepository::new(pool),
        }
    }

    /// Expand stored groups to their member contacts, deduplicated by
    /// contact id, in input order.
    pub async fn resolve_groups(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<Recipient>, CampaignError> {
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();

        for &group_id in group_ids {
            if self.groups.get(group_id).await?.is_none() {
                return Err(CampaignError::Validation(format!(
                    "Unknown contact group: {}",
                    group_id
                )));
            }

            for contact in self.contacts.list_by_group(group_id).await? {
                if !seen.insert(contact.id) {
                    continue;
                }
                match recipient_from_contact(&contact) {
                    Some(recipient) => recipients.push(recipient),
                    None => {
                        warn!(contact_id = %contact.id, phone = %contact.phone,
                            "Skipping contact with unusable phone");
                    }
                }
            }
        }

        Ok(recipients)
    }

    /// Resolve an uploaded row set. Unseen phones get a contact created,
    /// tagged with the campaign name and an import marker. Rows missing a
    /// usable phone are dropped silently; they count neither as sent nor
    /// as failed.
    pub async fn resolve_upload(
        &self,
        channel_id: ChannelId,
        campaign_name: &str,
        rows: &[UploadRow],
    ) -> Result<Vec<Recipient>, CampaignError> {
        let tags = vec![campaign_name.to_string(), "import".to_string()];
        let mut recipients = Vec::new();

        for (phone, row) in valid_rows(rows) {
            let contact = match self.contacts.find_by_phone(channel_id, phone.as_str()).await? {
                Some(contact) => contact,
                None => {
                    self.contacts
                        .create(CreateContact {
                            channel_id,
                            phone: phone.as_str().to_string(),
                            name: row.name.clone(),
                            email: row.email.clone(),
                            tags: tags.clone(),
                        })
                        .await?
                }
            };

            let mut recipient = Recipient::new(phone);
            recipient.contact_id = Some(contact.id);
            recipient
                .fields
                .insert("phone".to_string(), recipient.phone.as_str().to_string());
            if let Some(name) = &row.name {
                recipient.fields.insert("name".to_string(), name.clone());
            }
            if let Some(email) = &row.email {
                recipient.fields.insert("email".to_string(), email.clone());
            }
            recipients.push(recipient);
        }

        debug!(
            total = rows.len(),
            resolved = recipients.len(),
            "Resolved uploaded rows"
        );
        Ok(recipients)
    }
}

/// Filter upload rows to those with a parseable phone, deduplicated by
/// normalized phone, preserving input order.
fn valid_rows(rows: &[UploadRow]) -> Vec<(PhoneNumber, &UploadRow)> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| {
            let phone = PhoneNumber::parse(row.phone.as_deref()?)?;
            seen.insert(phone.clone()).then_some((phone, row))
        })
        .collect()
}

/// Build a recipient from a stored contact's field values
fn recipient_from_contact(contact: &Contact) -> Option<Recipient> {
    let phone = PhoneNumber::parse(&contact.phone)?;
    let mut recipient = Recipient::new(phone);
    recipient.contact_id = Some(contact.id);
    recipient
        .fields
        .insert("phone".to_string(), recipient.phone.as_str().to_string());
    if let Some(name) = &contact.name {
        recipient.fields.insert("name".to_string(), name.clone());
    }
    if let Some(email) = &contact.email {
        recipient.fields.insert("email".to_string(), email.clone());
    }
    Some(recipient)
}
