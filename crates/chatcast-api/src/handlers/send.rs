//! Externally-triggered send handler

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::AppState;
use crate::error::ApiError;

/// Request body for an externally-triggered send
#[derive(Debug, Deserialize)]
pub struct ExternalSendRequest {
    pub phone: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Response carrying the provider message id
#[derive(Debug, Serialize)]
pub struct ExternalSendResponse {
    pub message_id: String,
}

/// Single ad-hoc send driven by the campaign's trigger key. The key is
/// the credential; no operator authentication applies here. The service
/// checks the key before the body, so an unknown key is 401 even when
/// the phone is missing.
///
/// POST /campaigns/send/:api_key
pub async fn send_external(
    State(state): State<Arc<AppState>>,
    Path(api_key): Path<String>,
    Json(body): Json<ExternalSendRequest>,
) -> Result<Json<ExternalSendResponse>, ApiError> {
    let message_id = state
        .campaigns
        .send_external(&api_key, body.phone.as_deref(), body.variables)
        .await?;

    Ok(Json(ExternalSendResponse { message_id }))
}
