//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the mcpforge API.

use axum::extract::State;
use axum::response::Json;

use crate::error::ApiError;
use crate::models::{HealthStatus, ServiceInfo};
use crate::server::AppState;

pub mod builds;
pub mod deployments;
pub mod endpoints;
pub mod events;
pub mod generations;
pub mod registrations;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness check that pings the database
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthStatus),
        (status = 500, description = "Database unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthStatus>, ApiError> {
    state.db.ping().await?;
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
        database: "ok".to_string(),
    }))
}
