//! ApiRegistration entity model
//!
//! This module contains the SeaORM entity model for the api_registrations
//! table, a user-owned description of an external HTTP/GraphQL API together
//! with its auth descriptor and validation lifecycle.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// ApiRegistration entity representing a registered upstream API
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "api_registrations")]
pub struct Model {
    /// Unique identifier for the registration (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user identifier; (owner_id, name) is unique
    pub owner_id: Uuid,

    /// Human-readable registration name, unique per owner
    pub name: String,

    /// Base URL of the upstream API (http or https)
    pub base_url: String,

    /// Kind of API (rest_openapi, rest_generic, graphql, soap, grpc, custom)
    pub api_kind: String,

    /// Authentication type (none, api_key, bearer, basic, oauth2, custom)
    pub auth_type: String,

    /// Encrypted credential blob ({algorithm, ciphertext} encoded)
    pub auth_blob: Option<Vec<u8>>,

    /// Lifecycle status (pending, validating, active, validation_failed,
    /// suspended, archived)
    pub status: String,

    /// Timestamp of the last successful or failed validation
    pub last_validated_at: Option<DateTimeWithTimeZone>,

    /// Validation error text from the last failed normalization
    pub validation_error: Option<String>,

    /// Timestamp when the registration was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the registration was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::api_endpoint::Entity")]
    ApiEndpoint,
    #[sea_orm(has_many = "super::generation_job::Entity")]
    GenerationJob,
}

impl Related<super::api_endpoint::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApiEndpoint.def()
    }
}

impl Related<super::generation_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GenerationJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
