//! Messaging gateway client.
//!
//! The gateway is the external provider API that actually transmits
//! messages. The pipeline only ever sends approved templates, one
//! recipient per call, and receives a provider message identifier back.

pub mod client;

pub use client::{CloudApiClient, CloudApiFactory};

use async_trait::async_trait;
use chatcast_storage::models::Channel;
use std::sync::Arc;
use thiserror::Error;

/// Gateway send errors
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Gateway rejected send ({status}): {message}")]
    Provider {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// One templated outbound send
#[derive(Debug, Clone)]
pub struct TemplateSend {
    /// Recipient phone number, normalized digits
    pub to: String,
    pub template_name: String,
    pub language: String,
    /// Positional body parameters, in placeholder order
    pub parameters: Vec<String>,
}

/// A connection to the messaging gateway for one channel
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Send a single templated message. Returns the provider message id.
    async fn send_template(&self, send: &TemplateSend) -> Result<String, GatewayError>;
}

/// Builds per-channel gateway connections from stored channel credentials
pub trait GatewayFactory: Send + Sync {
    fn for_channel(&self, channel: &Channel) -> Arc<dyn Gateway>;
}
