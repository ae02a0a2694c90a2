//! Operator API authentication.
//!
//! Management endpoints are authenticated with operator API keys. Keys are
//! stored as a SHA-256 hash plus an indexed prefix; lookup goes by prefix
//! and the full key is verified against the hash, so plaintext keys never
//! touch the database.
//!
//! The campaign trigger endpoint and the gateway webhook authenticate
//! differently (trigger key lookup, payload signature) and sit outside
//! this middleware.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use chatcast_core::{CampaignService, StatusReconciler};
use chatcast_storage::db::DatabasePool;
use chatcast_storage::models::ApiKey;
use chatcast_storage::repository::{ApiKeyRepository, ChannelRepository};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabasePool,
    pub campaigns: CampaignService,
    pub reconciler: StatusReconciler,
    pub channels: ChannelRepository,
}

/// Authenticated context extracted from an operator API key
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub api_key_id: Uuid,
    pub key_name: String,
}

/// Extract the API key from a request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(key) = auth_str.strip_prefix("Bearer ") {
                return Some(key);
            }
        }
    }

    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str);
        }
    }

    None
}

/// The indexed lookup prefix of an API key (first 8 characters)
fn extract_key_prefix(api_key: &str) -> Option<&str> {
    if api_key.len() >= 8 {
        Some(&api_key[..8])
    } else {
        None
    }
}

/// Hash an API key for comparison
fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    hash_api_key(api_key) == stored_hash
}

/// Validate an API key against the database
async fn validate_api_key(db_pool: &DatabasePool, api_key: &str) -> Result<ApiKey, StatusCode> {
    let prefix = extract_key_prefix(api_key).ok_or_else(|| {
        warn!("API key too short");
        StatusCode::UNAUTHORIZED
    })?;

    let repo = ApiKeyRepository::new(db_pool.pool().clone());

    let candidates = repo.find_by_prefix(prefix).await.map_err(|e| {
        error!("Database error while looking up API key: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    for candidate in candidates {
        if verify_api_key(api_key, &candidate.key_hash) {
            if candidate.is_expired() {
                warn!("API key {} has expired", candidate.id);
                return Err(StatusCode::UNAUTHORIZED);
            }

            // Stamp last use without holding up the request
            let repo = ApiKeyRepository::new(db_pool.pool().clone());
            let key_id = candidate.id;
            tokio::spawn(async move {
                if let Err(e) = repo.update_last_used(key_id).await {
                    error!("Failed to update API key last_used_at: {}", e);
                }
            });

            debug!("API key {} authenticated", candidate.id);
            return Ok(candidate);
        }
    }

    warn!("No matching API key for prefix: {}", prefix);
    Err(StatusCode::UNAUTHORIZED)
}

/// Authentication middleware for management routes
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.uri().path().starts_with("/health") {
        return Ok(next.run(request).await);
    }

    let api_key = extract_api_key(&request).ok_or_else(|| {
        warn!("Missing API key in request to {}", request.uri().path());
        StatusCode::UNAUTHORIZED
    })?;

    let validated = validate_api_key(&state.db_pool, api_key).await?;

    request.extensions_mut().insert(AuthContext {
        api_key_id: validated.id,
        key_name: validated.name,
    });

    Ok(next.run(request).await)
}
