//! # BuildRecord Repository
//!
//! Repository operations for the build_records table. A job has at most one
//! build record; the unique index on job_id enforces this and duplicate
//! submissions surface as a CONFLICT.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::error::{ApiError, not_found};
use crate::models::build_record::{ActiveModel, Column, Entity, Model};

/// Repository for build record database operations
pub struct BuildRecordRepository {
    db: DatabaseConnection,
}

impl BuildRecordRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a build record in `pending` status.
    pub async fn create(
        &self,
        job_id: Uuid,
        image_name: String,
        image_tag: String,
    ) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();

        let record = ActiveModel {
            id: Set(Uuid::new_v4()),
            job_id: Set(job_id),
            image_name: Set(image_name),
            image_tag: Set(image_tag),
            build_log: Set(String::new()),
            status: Set("pending".to_string()),
            error_message: Set(None),
            started_at: Set(None),
            finished_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = record.insert(&self.db).await?;

        tracing::info!(
            build_id = %result.id,
            job_id = %job_id,
            image = %result.image_ref(),
            "Build record created"
        );

        Ok(result)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    /// Find a build record or return NOT_FOUND.
    pub async fn get(&self, id: Uuid) -> Result<Model, ApiError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| not_found("Build record"))
    }

    pub async fn find_by_job(&self, job_id: Uuid) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find()
            .filter(Column::JobId.eq(job_id))
            .one(&self.db)
            .await?)
    }

    /// Move a record into `building` and stamp `started_at`.
    pub async fn mark_building(&self, id: Uuid) -> Result<Model, ApiError> {
        let record = self.get(id).await?;
        let now = Utc::now().fixed_offset();

        let mut active: ActiveModel = record.into();
        active.status = Set("building".to_string());
        active.started_at = Set(Some(now));
        active.updated_at = Set(now);

        Ok(active.update(&self.db).await?)
    }

    /// Mark a record `built`, storing the captured build log.
    pub async fn finish_success(&self, id: Uuid, build_log: String) -> Result<Model, ApiError> {
        let record = self.get(id).await?;
        let now = Utc::now().fixed_offset();

        let mut active: ActiveModel = record.into();
        active.status = Set("built".to_string());
        active.build_log = Set(build_log);
        active.finished_at = Set(Some(now));
        active.updated_at = Set(now);

        Ok(active.update(&self.db).await?)
    }

    /// Mark a record `failed` with the log captured so far.
    pub async fn finish_failure(
        &self,
        id: Uuid,
        build_log: String,
        error_message: String,
    ) -> Result<Model, ApiError> {
        let record = self.get(id).await?;
        let now = Utc::now().fixed_offset();

        let mut active: ActiveModel = record.into();
        active.status = Set("failed".to_string());
        active.build_log = Set(build_log);
        active.error_message = Set(Some(error_message));
        active.finished_at = Set(Some(now));
        active.updated_at = Set(now);

        Ok(active.update(&self.db).await?)
    }
}
