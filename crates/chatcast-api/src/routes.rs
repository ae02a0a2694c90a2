//! API routes

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{campaigns, health, send, webhooks};

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/detailed", get(health::health_detailed))
        .with_state(state.clone());

    // Campaign management routes
    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/", post(campaigns::create_campaign))
        .route("/:campaign_id", get(campaigns::get_campaign))
        .route("/:campaign_id/status", patch(campaigns::update_status))
        .route("/:campaign_id/start", post(campaigns::start_campaign))
        .route("/:campaign_id/analytics", get(campaigns::get_analytics));

    // Management API with operator authentication
    let api_v1 = Router::new()
        .nest("/campaigns", campaign_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // Public routes: the trigger key and the payload signature are the
    // credentials on these paths
    let public_routes = Router::new()
        .route("/campaigns/send/:api_key", post(send::send_external))
        .route("/webhooks/gateway/:channel_id", post(webhooks::receive))
        .with_state(state);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
}
