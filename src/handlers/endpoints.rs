//! # Endpoint API Handlers
//!
//! Access to the normalized endpoint set. Endpoints are created only by
//! normalization runs; individual endpoints can be inspected and pruned.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::repositories::{ApiEndpointRepository, Page, PageParams};
use crate::server::AppState;

/// Query parameters for endpoint listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListEndpointsQuery {
    /// Optional HTTP method filter (lowercase)
    pub method: Option<String>,
    #[serde(flatten)]
    #[param(inline)]
    pub page: PageParams,
}

/// Normalized endpoint information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EndpointInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub registration_id: Uuid,
    pub name: String,
    pub method: String,
    pub path: String,
    pub request_schema: Option<JsonValue>,
    pub response_schema: Option<JsonValue>,
    pub query_params: Option<JsonValue>,
    pub path_params: Option<JsonValue>,
    pub headers: Option<JsonValue>,
    pub requires_auth: bool,
    pub rate_limit: Option<i32>,
    pub timeout_seconds: i32,
    pub cache_ttl_seconds: Option<i32>,
    pub content_type: String,
}

impl From<crate::models::api_endpoint::Model> for EndpointInfo {
    fn from(model: crate::models::api_endpoint::Model) -> Self {
        Self {
            id: model.id,
            registration_id: model.registration_id,
            name: model.name,
            method: model.method,
            path: model.path,
            request_schema: model.request_schema,
            response_schema: model.response_schema,
            query_params: model.query_params,
            path_params: model.path_params,
            headers: model.headers,
            requires_auth: model.requires_auth,
            rate_limit: model.rate_limit,
            timeout_seconds: model.timeout_seconds,
            cache_ttl_seconds: model.cache_ttl_seconds,
            content_type: model.content_type,
        }
    }
}

/// Lists the normalized endpoints of a registration
#[utoipa::path(
    get,
    path = "/registrations/{id}/endpoints",
    params(("id" = Uuid, Path, description = "Registration ID"), ListEndpointsQuery),
    responses(
        (status = 200, description = "Page of endpoints", body = Page<EndpointInfo>),
        (status = 404, description = "Registration not found", body = ApiError)
    ),
    tag = "endpoints"
)]
pub async fn list_endpoints(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListEndpointsQuery>,
) -> Result<Json<Page<EndpointInfo>>, ApiError> {
    // 404 for unknown registrations rather than an empty page.
    crate::repositories::ApiRegistrationRepository::new(state.db.clone())
        .get(id)
        .await?;

    let repo = ApiEndpointRepository::new(state.db.clone());
    let page = repo
        .list_by_registration(id, query.method, &query.page)
        .await?;
    Ok(Json(page.map(EndpointInfo::from)))
}

/// Fetches one normalized endpoint
#[utoipa::path(
    get,
    path = "/endpoints/{id}",
    params(("id" = Uuid, Path, description = "Endpoint ID")),
    responses(
        (status = 200, description = "Endpoint", body = EndpointInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "endpoints"
)]
pub async fn get_endpoint(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EndpointInfo>, ApiError> {
    let repo = ApiEndpointRepository::new(state.db.clone());
    Ok(Json(repo.get(id).await?.into()))
}

/// Removes one endpoint from the normalized set
///
/// A later normalization run recreates the endpoint if the source document
/// still declares the operation.
#[utoipa::path(
    delete,
    path = "/endpoints/{id}",
    params(("id" = Uuid, Path, description = "Endpoint ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "endpoints"
)]
pub async fn delete_endpoint(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let repo = ApiEndpointRepository::new(state.db.clone());
    repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
