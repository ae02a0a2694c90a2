//! Campaign delivery pipeline.
//!
//! Resolves a campaign's recipient set, binds per-recipient template
//! variables, dispatches each message through the messaging gateway,
//! persists message and conversation state, and reconciles asynchronous
//! delivery receipts into campaign counters.

pub mod campaign;
pub mod conversations;
pub mod gateway;
pub mod webhook;

pub use campaign::{CampaignError, CampaignService, DeliveryExecutor};
pub use webhook::StatusReconciler;
