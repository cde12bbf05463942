//! GenerationJob entity model
//!
//! This module contains the SeaORM entity model for the generation_jobs
//! table, one attempt to render server source for a registration/target pair.

use super::api_registration::Entity as ApiRegistration;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// GenerationJob entity representing one code generation attempt
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "generation_jobs")]
pub struct Model {
    /// Unique identifier for the generation job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Registration the server is generated from
    pub registration_id: Uuid,

    /// Target language (e.g. python, node)
    pub language: String,

    /// Target framework (e.g. fastapi, express)
    pub framework: String,

    /// Requested feature flags (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub features: JsonValue,

    /// Per-job configuration key/value overrides
    #[sea_orm(column_type = "JsonBinary")]
    pub config: Option<JsonValue>,

    /// Current status of the job (pending, generating, ready, failed)
    pub status: String,

    /// Accumulated generation log lines
    pub generation_log: String,

    /// Filesystem path of the rendered source tree, set once ready
    pub artifact_path: Option<String>,

    /// Number of rendered files in the artifact
    pub file_count: i32,

    /// Error message if the job failed
    pub error_message: Option<String>,

    /// Timestamp when the job started rendering
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job finished (ready or failed)
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the job was last updated
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
    #[sea_orm(has_one = "super::build_record::Entity")]
    BuildRecord,
}

impl Related<ApiRegistration> for Entity {
    fn to() -> RelationDef {
        Relation::ApiRegistration.def()
    }
}

impl Related<super::build_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BuildRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
