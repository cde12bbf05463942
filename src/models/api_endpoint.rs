//! ApiEndpoint entity model
//!
//! This module contains the SeaORM entity model for the api_endpoints table,
//! one operation under an api_registration. Endpoints cascade-delete with
//! their registration.

use super::api_registration::Entity as ApiRegistration;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// ApiEndpoint entity representing one upstream operation
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "api_endpoints")]
pub struct Model {
    /// Stable endpoint identifier, deterministic per (registration, method, path)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Registration this endpoint belongs to
    pub registration_id: Uuid,

    /// Operation name (e.g. OpenAPI operationId or derived slug)
    pub name: String,

    /// HTTP method, lowercase (get, post, put, patch, delete, head, options)
    pub method: String,

    /// Path template relative to the registration base URL
    pub path: String,

    /// JSON schema for the request body, if declared
    #[sea_orm(column_type = "JsonBinary")]
    pub request_schema: Option<JsonValue>,

    /// JSON schema for the success response, if declared
    #[sea_orm(column_type = "JsonBinary")]
    pub response_schema: Option<JsonValue>,

    /// Query parameter definitions
    #[sea_orm(column_type = "JsonBinary")]
    pub query_params: Option<JsonValue>,

    /// Path parameter definitions
    #[sea_orm(column_type = "JsonBinary")]
    pub path_params: Option<JsonValue>,

    /// Required request headers
    #[sea_orm(column_type = "JsonBinary")]
    pub headers: Option<JsonValue>,

    /// Whether calls to this endpoint require upstream authentication
    pub requires_auth: bool,

    /// Optional per-endpoint rate limit (requests per minute, positive)
    pub rate_limit: Option<i32>,

    /// Upstream call timeout in seconds (positive)
    pub timeout_seconds: i32,

    /// Optional response cache TTL in seconds (positive)
    pub cache_ttl_seconds: Option<i32>,

    /// Normalized request content type
    pub content_type: String,

    /// Timestamp when the endpoint was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the endpoint was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "ApiRegistration",
        from = "Column::RegistrationId",
        to = "super::api_registration::Column::Id"
    )]
    ApiRegistration,
}

impl Related<ApiRegistration> for Entity {
    fn to() -> RelationDef {
        Relation::ApiRegistration.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
