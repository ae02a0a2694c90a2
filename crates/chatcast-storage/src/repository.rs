//! Repository layer for data access

pub mod api_keys;
pub mod campaigns;
pub mod channels;
pub mod contact_groups;
pub mod contacts;
pub mod conversations;
pub mod messages;
pub mod templates;

pub use api_keys::ApiKeyRepository;
pub use campaigns::CampaignRepository;
pub use channels::ChannelRepository;
pub use contact_groups::ContactGroupRepository;
pub use contacts::ContactRepository;
pub use conversations::ConversationRepository;
pub use messages::MessageRepository;
pub use templates::TemplateRepository;
