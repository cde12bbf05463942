//! # Generation API Handlers
//!
//! Handlers wrapping the generation engine: submit, inspect and cancel
//! generation jobs.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ApiError, validation_error};
use crate::generator::GenerationRequest;
use crate::repositories::{GenerationJobRepository, Page, PageParams};
use crate::server::AppState;

/// Request body for submitting a generation job
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitGenerationRequest {
    /// Target language (e.g. python, node)
    pub language: String,
    /// Target framework (e.g. fastapi, express)
    pub framework: String,
    /// Feature flags enabled in the rendered server (e.g. logging, docs)
    #[serde(default)]
    pub features: Vec<String>,
    /// Per-job configuration overrides
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Query parameters for generation listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListGenerationsQuery {
    /// Optional status filter (pending, generating, ready, failed)
    pub status: Option<String>,
    #[serde(flatten)]
    #[param(inline)]
    pub page: PageParams,
}

/// Generation job information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GenerationJobInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub registration_id: Uuid,
    pub language: String,
    pub framework: String,
    pub features: serde_json::Value,
    pub status: String,
    pub generation_log: String,
    pub artifact_path: Option<String>,
    pub file_count: i32,
    pub error_message: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub created_at: String,
}

impl From<crate::models::generation_job::Model> for GenerationJobInfo {
    fn from(model: crate::models::generation_job::Model) -> Self {
        Self {
            id: model.id,
            registration_id: model.registration_id,
            language: model.language,
            framework: model.framework,
            features: model.features,
            status: model.status,
            generation_log: model.generation_log,
            artifact_path: model.artifact_path,
            file_count: model.file_count,
            error_message: model.error_message,
            started_at: model.started_at.map(|dt| dt.to_rfc3339()),
            finished_at: model.finished_at.map(|dt| dt.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Submits a generation job for a registration
///
/// Accepted work returns 202 with the job in `pending`; progress is
/// observable through the job resource and the event stream.
#[utoipa::path(
    post,
    path = "/registrations/{id}/generations",
    params(("id" = Uuid, Path, description = "Registration ID")),
    request_body = SubmitGenerationRequest,
    responses(
        (status = 202, description = "Generation accepted", body = GenerationJobInfo),
        (status = 404, description = "Registration or target not found", body = ApiError),
        (status = 409, description = "Target already in flight", body = ApiError),
        (status = 429, description = "Generation pool saturated", body = ApiError)
    ),
    tag = "generations"
)]
pub async fn submit_generation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmitGenerationRequest>,
) -> Result<(StatusCode, Json<GenerationJobInfo>), ApiError> {
    if request.language.trim().is_empty() || request.framework.trim().is_empty() {
        return Err(validation_error(
            "Validation failed",
            serde_json::json!({
                "language": "must not be empty",
                "framework": "must not be empty"
            }),
        ));
    }

    let job = state
        .engine
        .submit(
            id,
            GenerationRequest {
                language: request.language.to_lowercase(),
                framework: request.framework.to_lowercase(),
                features: request.features,
                config: request.config,
            },
        )
        .await?;

    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

/// Lists generation jobs for a registration
#[utoipa::path(
    get,
    path = "/registrations/{id}/generations",
    params(("id" = Uuid, Path, description = "Registration ID"), ListGenerationsQuery),
    responses(
        (status = 200, description = "Page of generation jobs", body = Page<GenerationJobInfo>)
    ),
    tag = "generations"
)]
pub async fn list_generations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListGenerationsQuery>,
) -> Result<Json<Page<GenerationJobInfo>>, ApiError> {
    let repo = GenerationJobRepository::new(state.db.clone());
    let page = repo
        .list_by_registration(id, query.status, &query.page)
        .await?;
    Ok(Json(page.map(GenerationJobInfo::from)))
}

/// Fetches one generation job
#[utoipa::path(
    get,
    path = "/generations/{id}",
    params(("id" = Uuid, Path, description = "Generation job ID")),
    responses(
        (status = 200, description = "Generation job", body = GenerationJobInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "generations"
)]
pub async fn get_generation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GenerationJobInfo>, ApiError> {
    let repo = GenerationJobRepository::new(state.db.clone());
    Ok(Json(repo.get(id).await?.into()))
}

/// Cancels an in-flight generation job
#[utoipa::path(
    post,
    path = "/generations/{id}/cancel",
    params(("id" = Uuid, Path, description = "Generation job ID")),
    responses(
        (status = 200, description = "Job cancelled", body = GenerationJobInfo),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Job already finished", body = ApiError)
    ),
    tag = "generations"
)]
pub async fn cancel_generation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GenerationJobInfo>, ApiError> {
    let job = state.engine.cancel(id).await?;
    Ok(Json(job.into()))
}

/// Deletes a settled generation job and its artifact tree
///
/// Build records owned by the job are removed with it; deployments already
/// created from those builds keep running and keep their history.
#[utoipa::path(
    delete,
    path = "/generations/{id}",
    params(("id" = Uuid, Path, description = "Generation job ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Job still in flight", body = ApiError)
    ),
    tag = "generations"
)]
pub async fn delete_generation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let repo = GenerationJobRepository::new(state.db.clone());
    let job = repo.get(id).await?;

    if job.status == "pending" || job.status == "generating" {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            &format!("Job is in flight (status: {}); cancel it first", job.status),
        ));
    }

    repo.delete(id).await?;

    if let Some(artifact_path) = job.artifact_path
        && let Err(e) = tokio::fs::remove_dir_all(&artifact_path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(job_id = %id, "Failed to remove artifact dir: {}", e);
    }

    Ok(StatusCode::NO_CONTENT)
}
