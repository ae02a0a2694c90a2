//! Gateway webhook handler.
//!
//! The provider posts delivery receipts and inbound messages here. The
//! payload signature is verified over the raw body bytes before any
//! parsing; an invalid or missing signature is rejected at this boundary
//! and never reaches the reconciler.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use chatcast_common::signature::{verify_signature, SIGNATURE_HEADER};
use chatcast_core::webhook::WebhookPayload;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::auth::AppState;

/// Receive a webhook delivery for one channel
///
/// POST /webhooks/gateway/:channel_id
pub async fn receive(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let channel = match state.channels.get(channel_id).await {
        Ok(Some(channel)) => channel,
        Ok(None) => {
            warn!(%channel_id, "Webhook for unknown channel");
            return StatusCode::NOT_FOUND;
        }
        Err(e) => {
            error!(%channel_id, "Failed to load channel: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        warn!(%channel_id, "Webhook without signature header");
        return StatusCode::UNAUTHORIZED;
    };

    if !verify_signature(&channel.app_secret, &body, signature) {
        warn!(%channel_id, "Webhook signature mismatch");
        return StatusCode::UNAUTHORIZED;
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(%channel_id, "Unparseable webhook payload: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    // Processing failures return 500 so the provider redelivers; the
    // reconciler's guarded transitions make redelivery safe
    match state.reconciler.process(&channel, &payload).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!(%channel_id, "Failed to process webhook: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
