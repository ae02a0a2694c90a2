//! Contact and conversation upsert.
//!
//! A conversation exists per (channel, phone) and is the anchor that
//! outbound campaign messages and inbound replies both attach to. Both
//! are created lazily on first contact with an unseen phone number and
//! reused afterwards; the phone number is the dedup key.

use chatcast_common::types::{ChannelId, PhoneNumber};
use chatcast_storage::models::{Conversation, CreateContact, CreateConversation};
use chatcast_storage::repository::{ContactRepository, ConversationRepository};
use sqlx::PgPool;
use tracing::debug;

/// Ensures a contact and conversation exist for a phone number
#[derive(Clone)]
pub struct ConversationUpsert {
    contacts: ContactRepository,
    conversations: ConversationRepository,
}

impl ConversationUpsert {
    pub fn new(pool: PgPool) -> Self {
        Self {
            contacts: ContactRepository::new(pool.clone()),
            conversations: ConversationRepository::new(pool),
        }
    }

    /// Return the conversation for a (channel, phone) pair, creating the
    /// contact and conversation if either is absent.
    ///
    /// `name`, `email` and `tags` only apply when a new contact is created;
    /// an existing contact is never overwritten from here.
    pub async fn ensure(
        &self,
        channel_id: ChannelId,
        phone: &PhoneNumber,
        name: Option<&str>,
        email: Option<&str>,
        tags: &[String],
    ) -> Result<Conversation, sqlx::Error> {
        let contact = match self.contacts.find_by_phone(channel_id, phone.as_str()).await? {
            Some(contact) => contact,
            None => {
                debug!(phone = %phone, "Creating contact for unseen phone");
                self.contacts
                    .create(CreateContact {
                        channel_id,
                        phone: phone.as_str().to_string(),
                        name: name.map(str::to_string),
                        email: email.map(str::to_string),
                        tags: tags.to_vec(),
                    })
                    .await?
            }
        };

        match self
            .conversations
            .find_by_phone(channel_id, phone.as_str())
            .await?
        {
            Some(conversation) => Ok(conversation),
            None => {
                self.conversations
                    .create(CreateConversation {
                        channel_id,
                        contact_id: contact.id,
                        phone: phone.as_str().to_string(),
                    })
                    .await
            }
        }
    }

    /// Record the latest message preview on a conversation
    pub async fn touch(
        &self,
        conversation: &Conversation,
        text: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), sqlx::Error> {
        self.conversations
            .touch_last_message(conversation.id, text, at)
            .await
    }
}
