//! # Registration API Handlers
//!
//! Handlers for registering upstream APIs, running specification
//! normalization and inspecting registration state.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::crypto::{self, AuthCredentials};
use crate::error::{ApiError, validation_error};
use crate::normalizer;
use crate::repositories::api_registration::NewRegistration;
use crate::repositories::{ApiRegistrationRepository, Page, PageParams};
use crate::server::AppState;

const API_KINDS: &[&str] = &[
    "rest_openapi",
    "rest_generic",
    "graphql",
    "soap",
    "grpc",
    "custom",
];
const AUTH_TYPES: &[&str] = &[
    "none",
    "api_key",
    "bearer",
    "bearer_token",
    "basic",
    "oauth2",
    "custom",
];

/// Request body for registering an upstream API
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRegistrationRequest {
    /// Owner identifier the registration is scoped to
    #[schema(value_type = String)]
    pub owner_id: Uuid,
    /// Human-readable name, unique per owner
    pub name: String,
    /// Upstream base URL (http or https)
    pub base_url: String,
    /// Upstream API kind (rest_openapi, rest_generic, graphql, soap, grpc, custom)
    pub api_kind: String,
    /// Upstream auth scheme (default: none)
    pub auth_type: Option<String>,
    /// Upstream credentials, encrypted at rest
    pub credentials: Option<AuthCredentials>,
}

/// Request body for normalizing a specification document
#[derive(Debug, Deserialize, ToSchema)]
pub struct NormalizeRequest {
    /// The raw specification document (JSON or SDL, per api_kind)
    pub document: String,
}

/// Query parameters for registration listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListRegistrationsQuery {
    /// Optional owner filter
    pub owner_id: Option<Uuid>,
    /// Optional status filter (pending, validating, active, validation_failed)
    pub status: Option<String>,
    #[serde(flatten)]
    #[param(inline)]
    pub page: PageParams,
}

/// Registration information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegistrationInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub owner_id: Uuid,
    pub name: String,
    pub base_url: String,
    pub api_kind: String,
    pub auth_type: String,
    /// Whether an encrypted credential blob is stored
    pub has_credentials: bool,
    pub status: String,
    pub last_validated_at: Option<String>,
    pub validation_error: Option<String>,
    pub created_at: String,
}

impl From<crate::models::api_registration::Model> for RegistrationInfo {
    fn from(model: crate::models::api_registration::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            name: model.name,
            base_url: model.base_url,
            api_kind: model.api_kind,
            auth_type: model.auth_type,
            has_credentials: model.auth_blob.is_some(),
            status: model.status,
            last_validated_at: model.last_validated_at.map(|dt| dt.to_rfc3339()),
            validation_error: model.validation_error,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Response for a normalization run
#[derive(Debug, Serialize, ToSchema)]
pub struct NormalizeResponse {
    pub registration: RegistrationInfo,
    /// Number of endpoints in the normalized set
    pub endpoint_count: usize,
}

fn validate_create(request: &CreateRegistrationRequest) -> Result<(), ApiError> {
    let mut field_errors = serde_json::Map::new();

    if request.name.trim().is_empty() {
        field_errors.insert("name".into(), json!("must not be empty"));
    }
    match url::Url::parse(&request.base_url) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
        _ => {
            field_errors.insert("base_url".into(), json!("must be an http(s) URL"));
        }
    }
    if !API_KINDS.contains(&request.api_kind.as_str()) {
        field_errors.insert(
            "api_kind".into(),
            json!(format!("must be one of: {}", API_KINDS.join(", "))),
        );
    }
    if let Some(ref auth_type) = request.auth_type
        && !AUTH_TYPES.contains(&auth_type.as_str())
    {
        field_errors.insert(
            "auth_type".into(),
            json!(format!("must be one of: {}", AUTH_TYPES.join(", "))),
        );
    }

    if field_errors.is_empty() {
        Ok(())
    } else {
        Err(validation_error(
            "Validation failed",
            serde_json::Value::Object(field_errors),
        ))
    }
}

/// Registers an upstream API
#[utoipa::path(
    post,
    path = "/registrations",
    request_body = CreateRegistrationRequest,
    responses(
        (status = 201, description = "Registration created", body = RegistrationInfo),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 409, description = "Duplicate owner/name pair", body = ApiError)
    ),
    tag = "registrations"
)]
pub async fn create_registration(
    State(state): State<AppState>,
    Json(request): Json<CreateRegistrationRequest>,
) -> Result<(StatusCode, Json<RegistrationInfo>), ApiError> {
    validate_create(&request)?;

    let auth_type = request.auth_type.unwrap_or_else(|| "none".to_string());
    let registration_id = Uuid::new_v4();

    let auth_blob = match request.credentials {
        Some(ref credentials) => {
            let Some(ref key) = state.crypto_key else {
                return Err(ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_FAILED",
                    "Credentials supplied but no crypto key is configured",
                ));
            };
            Some(crypto::encrypt_credentials(
                key,
                registration_id,
                &auth_type,
                credentials,
            )?)
        }
        None => None,
    };

    let repo = ApiRegistrationRepository::new(state.db.clone());
    let registration = repo
        .create_with_id(
            registration_id,
            NewRegistration {
                owner_id: request.owner_id,
                name: request.name,
                base_url: request.base_url,
                api_kind: request.api_kind,
                auth_type,
                auth_blob,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(registration.into())))
}

/// Lists registrations
#[utoipa::path(
    get,
    path = "/registrations",
    params(ListRegistrationsQuery),
    responses(
        (status = 200, description = "Page of registrations", body = Page<RegistrationInfo>)
    ),
    tag = "registrations"
)]
pub async fn list_registrations(
    State(state): State<AppState>,
    Query(query): Query<ListRegistrationsQuery>,
) -> Result<Json<Page<RegistrationInfo>>, ApiError> {
    let repo = ApiRegistrationRepository::new(state.db.clone());
    let page = repo
        .list(query.owner_id, query.status, &query.page)
        .await?;
    Ok(Json(page.map(RegistrationInfo::from)))
}

/// Fetches one registration
#[utoipa::path(
    get,
    path = "/registrations/{id}",
    params(("id" = Uuid, Path, description = "Registration ID")),
    responses(
        (status = 200, description = "Registration", body = RegistrationInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "registrations"
)]
pub async fn get_registration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RegistrationInfo>, ApiError> {
    let repo = ApiRegistrationRepository::new(state.db.clone());
    Ok(Json(repo.get(id).await?.into()))
}

/// Deletes a registration and its normalized endpoints
#[utoipa::path(
    delete,
    path = "/registrations/{id}",
    params(("id" = Uuid, Path, description = "Registration ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "registrations"
)]
pub async fn delete_registration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let repo = ApiRegistrationRepository::new(state.db.clone());
    repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Normalizes a specification document into the endpoint set
///
/// Runs synchronously; the registration moves through `validating` to
/// `active` or `validation_failed` and the previous endpoint set is
/// replaced atomically on success.
#[utoipa::path(
    post,
    path = "/registrations/{id}/normalize",
    params(("id" = Uuid, Path, description = "Registration ID")),
    request_body = NormalizeRequest,
    responses(
        (status = 200, description = "Normalization succeeded", body = NormalizeResponse),
        (status = 400, description = "Invalid specification", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
        (status = 422, description = "Specification exceeds budget", body = ApiError)
    ),
    tag = "registrations"
)]
pub async fn normalize_registration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<NormalizeRequest>,
) -> Result<Json<NormalizeResponse>, ApiError> {
    let (registration, endpoint_count) = normalizer::run_normalization(
        &state.db,
        &state.bus,
        &state.config.normalizer,
        id,
        &request.document,
    )
    .await?;

    Ok(Json(NormalizeResponse {
        registration: registration.into(),
        endpoint_count,
    }))
}
