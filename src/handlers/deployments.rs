//! # Deployment API Handlers
//!
//! Handlers wrapping the deployment orchestrator: run built images as
//! containers, scale, stop and delete deployments.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::deployer::DeployRequest;
use crate::error::ApiError;
use crate::repositories::{DeploymentRepository, Page, PageParams};
use crate::server::AppState;

/// Request body for creating a deployment
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDeploymentRequest {
    /// CPU limit in cores (default: 1.0)
    pub cpu_limit: Option<f64>,
    /// Memory limit in megabytes (default: 256)
    pub memory_limit_mb: Option<i32>,
    /// Desired replica count (default: 1)
    pub replica_count: Option<i32>,
    /// First host port to publish on (allocated if absent)
    pub port: Option<i32>,
    /// Container-side listen port (default: the template's port)
    pub container_port: Option<i32>,
    /// Environment variables injected into the containers
    pub env_vars: Option<JsonValue>,
    /// Health check path (default: /health)
    pub health_check_path: Option<String>,
}

/// Request body for scaling a deployment
#[derive(Debug, Deserialize, ToSchema)]
pub struct ScaleRequest {
    /// Desired replica count (>= 1)
    pub replicas: i32,
}

/// Query parameters for deployment listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListDeploymentsQuery {
    /// Optional status filter
    pub status: Option<String>,
    /// Optional build record filter
    pub build_record_id: Option<Uuid>,
    #[serde(flatten)]
    #[param(inline)]
    pub page: PageParams,
}

/// Deployment information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeploymentInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub build_record_id: Uuid,
    pub container_name: String,
    pub image_ref: String,
    pub cpu_limit: f64,
    pub memory_limit_mb: i32,
    pub replica_count: i32,
    pub port: i32,
    pub container_port: i32,
    pub health_check_path: String,
    pub status: String,
    pub health: String,
    pub last_health_check_at: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<String>,
    pub stopped_at: Option<String>,
    pub created_at: String,
}

impl From<crate::models::deployment::Model> for DeploymentInfo {
    fn from(model: crate::models::deployment::Model) -> Self {
        Self {
            id: model.id,
            build_record_id: model.build_record_id,
            container_name: model.container_name,
            image_ref: model.image_ref,
            cpu_limit: model.cpu_limit,
            memory_limit_mb: model.memory_limit_mb,
            replica_count: model.replica_count,
            port: model.port,
            container_port: model.container_port,
            health_check_path: model.health_check_path,
            status: model.status,
            health: model.health,
            last_health_check_at: model.last_health_check_at.map(|dt| dt.to_rfc3339()),
            error_message: model.error_message,
            started_at: model.started_at.map(|dt| dt.to_rfc3339()),
            stopped_at: model.stopped_at.map(|dt| dt.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Deploys a built image
///
/// Returns 202 with the deployment in `pending`; the rollout proceeds
/// asynchronously through `deploying` to `running` once the first replica
/// reports healthy.
#[utoipa::path(
    post,
    path = "/builds/{id}/deployments",
    params(("id" = Uuid, Path, description = "Build record ID")),
    request_body = CreateDeploymentRequest,
    responses(
        (status = 202, description = "Deployment accepted", body = DeploymentInfo),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Build record not found", body = ApiError),
        (status = 409, description = "Build not in built status", body = ApiError)
    ),
    tag = "deployments"
)]
pub async fn create_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateDeploymentRequest>,
) -> Result<(StatusCode, Json<DeploymentInfo>), ApiError> {
    let deployment = state
        .orchestrator
        .deploy(
            id,
            DeployRequest {
                cpu_limit: request.cpu_limit,
                memory_limit_mb: request.memory_limit_mb,
                replica_count: request.replica_count,
                port: request.port,
                container_port: request.container_port,
                env_vars: request.env_vars,
                health_check_path: request.health_check_path,
            },
        )
        .await?;

    Ok((StatusCode::ACCEPTED, Json(deployment.into())))
}

/// Lists deployments
#[utoipa::path(
    get,
    path = "/deployments",
    params(ListDeploymentsQuery),
    responses(
        (status = 200, description = "Page of deployments", body = Page<DeploymentInfo>)
    ),
    tag = "deployments"
)]
pub async fn list_deployments(
    State(state): State<AppState>,
    Query(query): Query<ListDeploymentsQuery>,
) -> Result<Json<Page<DeploymentInfo>>, ApiError> {
    let repo = DeploymentRepository::new(state.db.clone());
    let page = repo
        .list(query.status, query.build_record_id, &query.page)
        .await?;
    Ok(Json(page.map(DeploymentInfo::from)))
}

/// Fetches one deployment
#[utoipa::path(
    get,
    path = "/deployments/{id}",
    params(("id" = Uuid, Path, description = "Deployment ID")),
    responses(
        (status = 200, description = "Deployment", body = DeploymentInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "deployments"
)]
pub async fn get_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeploymentInfo>, ApiError> {
    let repo = DeploymentRepository::new(state.db.clone());
    Ok(Json(repo.get(id).await?.into()))
}

/// Scales a running deployment
#[utoipa::path(
    post,
    path = "/deployments/{id}/scale",
    params(("id" = Uuid, Path, description = "Deployment ID")),
    request_body = ScaleRequest,
    responses(
        (status = 200, description = "Scaling started", body = DeploymentInfo),
        (status = 400, description = "Invalid replica count", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Deployment not running", body = ApiError)
    ),
    tag = "deployments"
)]
pub async fn scale_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ScaleRequest>,
) -> Result<Json<DeploymentInfo>, ApiError> {
    let deployment = state.orchestrator.scale(id, request.replicas).await?;
    Ok(Json(deployment.into()))
}

/// Gracefully stops a running deployment
#[utoipa::path(
    post,
    path = "/deployments/{id}/stop",
    params(("id" = Uuid, Path, description = "Deployment ID")),
    responses(
        (status = 200, description = "Stop started", body = DeploymentInfo),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Deployment not running", body = ApiError)
    ),
    tag = "deployments"
)]
pub async fn stop_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeploymentInfo>, ApiError> {
    let deployment = state.orchestrator.stop(id).await?;
    Ok(Json(deployment.into()))
}

/// Deletes a stopped or failed deployment
#[utoipa::path(
    delete,
    path = "/deployments/{id}",
    params(("id" = Uuid, Path, description = "Deployment ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Deployment still running", body = ApiError)
    ),
    tag = "deployments"
)]
pub async fn delete_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
