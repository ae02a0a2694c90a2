//! Campaign lifecycle and delivery.

pub mod binder;
pub mod completion;
pub mod executor;
pub mod resolver;
pub mod service;

pub use completion::CompletionDetector;
pub use executor::DeliveryExecutor;
pub use resolver::{RecipientResolver, UploadRow};
pub use service::{BillingGate, CampaignService, NewCampaign, UnmeteredGate};

use crate::gateway::GatewayError;
use thiserror::Error;

/// Campaign pipeline errors
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Unknown or mismatched trigger key")]
    UnknownKey,

    #[error("Campaign is not active")]
    NotActive,

    #[error("Channel not found")]
    ChannelNotFound,

    #[error("Template not found")]
    TemplateNotFound,

    #[error("Invalid campaign definition: {0}")]
    Validation(String),

    #[error("Not enough delivery data yet")]
    InsufficientData,

    #[error("Sending is not allowed for this account")]
    SendingDenied,

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
