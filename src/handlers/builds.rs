//! # Build API Handlers
//!
//! Handlers wrapping the build service: package a ready generation job
//! into a container image, inspect and cancel builds.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::repositories::BuildRecordRepository;
use crate::server::AppState;

/// Build record information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BuildInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub job_id: Uuid,
    pub image_name: String,
    pub image_tag: String,
    /// Full image reference (name:tag)
    pub image_ref: String,
    pub build_log: String,
    pub status: String,
    pub error_message: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub created_at: String,
}

impl From<crate::models::build_record::Model> for BuildInfo {
    fn from(model: crate::models::build_record::Model) -> Self {
        let image_ref = model.image_ref();
        Self {
            id: model.id,
            job_id: model.job_id,
            image_name: model.image_name,
            image_tag: model.image_tag,
            image_ref,
            build_log: model.build_log,
            status: model.status,
            error_message: model.error_message,
            started_at: model.started_at.map(|dt| dt.to_rfc3339()),
            finished_at: model.finished_at.map(|dt| dt.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Submits a build for a ready generation job
///
/// Builds are 1:1 with jobs; a second submission for the same job is a
/// conflict. The image tag is derived from the artifact tree fingerprint,
/// so identical trees produce identical tags.
#[utoipa::path(
    post,
    path = "/generations/{id}/build",
    params(("id" = Uuid, Path, description = "Generation job ID")),
    responses(
        (status = 202, description = "Build accepted", body = BuildInfo),
        (status = 404, description = "Job not found", body = ApiError),
        (status = 409, description = "Job not ready or already built", body = ApiError),
        (status = 429, description = "Build pool saturated", body = ApiError)
    ),
    tag = "builds"
)]
pub async fn submit_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<BuildInfo>), ApiError> {
    let build = state.build_service.submit(id).await?;
    Ok((StatusCode::ACCEPTED, Json(build.into())))
}

/// Fetches one build record
#[utoipa::path(
    get,
    path = "/builds/{id}",
    params(("id" = Uuid, Path, description = "Build record ID")),
    responses(
        (status = 200, description = "Build record", body = BuildInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "builds"
)]
pub async fn get_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BuildInfo>, ApiError> {
    let repo = BuildRecordRepository::new(state.db.clone());
    Ok(Json(repo.get(id).await?.into()))
}

/// Cancels an in-flight build
#[utoipa::path(
    post,
    path = "/builds/{id}/cancel",
    params(("id" = Uuid, Path, description = "Build record ID")),
    responses(
        (status = 200, description = "Build cancelled", body = BuildInfo),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Build already finished", body = ApiError)
    ),
    tag = "builds"
)]
pub async fn cancel_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BuildInfo>, ApiError> {
    let build = state.build_service.cancel(id).await?;
    Ok(Json(build.into()))
}
