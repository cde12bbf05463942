//! BuildRecord entity model
//!
//! This module contains the SeaORM entity model for the build_records table,
//! the packaging result of a successful generation job. A record is tied 1:1
//! to its job and immutable once built.

use super::generation_job::Entity as GenerationJob;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// BuildRecord entity representing one image build
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "build_records")]
pub struct Model {
    /// Unique identifier for the build record (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Generation job this build packages (unique, 1:1)
    pub job_id: Uuid,

    /// Image name (without tag)
    pub image_name: String,

    /// Image tag, derived from the source tree fingerprint
    pub image_tag: String,

    /// Captured build log
    pub build_log: String,

    /// Current status of the build (pending, building, built, failed)
    pub status: String,

    /// Error message if the build failed
    pub error_message: Option<String>,

    /// Timestamp when the build started
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the build finished
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the record was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the record was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "GenerationJob",
        from = "Column::JobId",
        to = "super::generation_job::Column::Id"
    )]
    GenerationJob,
}

impl Related<GenerationJob> for Entity {
    fn to() -> RelationDef {
        Relation::GenerationJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Full image reference in name:tag form
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }
}
