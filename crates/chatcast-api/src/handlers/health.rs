//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::AppState;

/// Basic health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Detailed health response with component checks
#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Basic health check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Liveness check (is the process running)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness check (is the service ready to accept requests)
pub async fn readiness(State(state): State<Arc<AppState>>) -> Result<StatusCode, StatusCode> {
    state
        .db_pool
        .health_check()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(StatusCode::OK)
}

/// Detailed health check with dependency latencies
pub async fn health_detailed(State(state): State<Arc<AppState>>) -> Json<DetailedHealthResponse> {
    let start = std::time::Instant::now();
    let db_check = state.db_pool.health_check().await;
    let db_latency = start.elapsed().as_millis() as u64;

    let database = match db_check {
        Ok(_) => ComponentHealth {
            status: "healthy".to_string(),
            latency_ms: Some(db_latency),
            error: None,
        },
        Err(e) => ComponentHealth {
            status: "unhealthy".to_string(),
            latency_ms: None,
            error: Some(e.to_string()),
        },
    };

    let status = if database.status == "healthy" {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(DetailedHealthResponse {
        status: status.to_string(),
        checks: HealthChecks { database },
    })
}
