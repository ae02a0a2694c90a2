//! Delivery-receipt webhook processing.

pub mod payload;
pub mod reconciler;

pub use payload::WebhookPayload;
pub use reconciler::StatusReconciler;
