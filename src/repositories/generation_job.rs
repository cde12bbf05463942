//! # GenerationJob Repository
//!
//! Repository operations for the generation_jobs table, including the
//! status bookkeeping the generation engine performs as a job moves
//! through pending, generating and its terminal states.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{ApiError, not_found};
use crate::models::generation_job::{ActiveModel, Column, Entity, Model};

use super::{Page, PageParams};

/// Statuses in which a job occupies a generation slot.
pub const ACTIVE_STATUSES: &[&str] = &["pending", "generating"];

/// Repository for generation job database operations
pub struct GenerationJobRepository {
    db: DatabaseConnection,
}

impl GenerationJobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new job in `pending` status.
    pub async fn create(
        &self,
        registration_id: Uuid,
        language: String,
        framework: String,
        features: JsonValue,
        config: Option<JsonValue>,
    ) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();

        let job = ActiveModel {
            id: Set(Uuid::new_v4()),
            registration_id: Set(registration_id),
            language: Set(language),
            framework: Set(framework),
            features: Set(features),
            config: Set(config),
            status: Set("pending".to_string()),
            generation_log: Set(String::new()),
            artifact_path: Set(None),
            file_count: Set(0),
            error_message: Set(None),
            started_at: Set(None),
            finished_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = job.insert(&self.db).await?;

        tracing::info!(
            job_id = %result.id,
            registration_id = %registration_id,
            language = %result.language,
            framework = %result.framework,
            "Generation job created"
        );

        Ok(result)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    /// Find a job or return NOT_FOUND.
    pub async fn get(&self, id: Uuid) -> Result<Model, ApiError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| not_found("Generation job"))
    }

    /// List jobs for a registration with optional filters.
    pub async fn list_by_registration(
        &self,
        registration_id: Uuid,
        status: Option<String>,
        params: &PageParams,
    ) -> Result<Page<Model>, ApiError> {
        let mut query = Entity::find()
            .filter(Column::RegistrationId.eq(registration_id))
            .order_by_desc(Column::CreatedAt);

        if let Some(status_filter) = status {
            query = query.filter(Column::Status.eq(status_filter));
        }

        let total = query.clone().count(&self.db).await?;
        let items = query
            .offset(params.offset())
            .limit(params.size())
            .all(&self.db)
            .await?;

        Ok(Page::new(items, total, params))
    }

    /// Find a non-terminal job for the same (registration, language,
    /// framework) target, used for the duplicate-submission guard.
    pub async fn find_active_for_target(
        &self,
        registration_id: Uuid,
        language: &str,
        framework: &str,
    ) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find()
            .filter(Column::RegistrationId.eq(registration_id))
            .filter(Column::Language.eq(language))
            .filter(Column::Framework.eq(framework))
            .filter(Column::Status.is_in(ACTIVE_STATUSES.iter().copied()))
            .one(&self.db)
            .await?)
    }

    /// Move a job into `generating` and stamp `started_at`.
    pub async fn mark_generating(&self, id: Uuid) -> Result<Model, ApiError> {
        let job = self.get(id).await?;
        let now = Utc::now().fixed_offset();

        let mut active: ActiveModel = job.into();
        active.status = Set("generating".to_string());
        active.started_at = Set(Some(now));
        active.updated_at = Set(now);

        Ok(active.update(&self.db).await?)
    }

    /// Append lines to the accumulated generation log.
    pub async fn append_log(&self, id: Uuid, lines: &str) -> Result<Model, ApiError> {
        let job = self.get(id).await?;
        let mut log = job.generation_log.clone();
        if !log.is_empty() && !log.ends_with('\n') {
            log.push('\n');
        }
        log.push_str(lines);

        let mut active: ActiveModel = job.into();
        active.generation_log = Set(log);
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(&self.db).await?)
    }

    /// Mark a job `ready` with its artifact details.
    pub async fn finish_success(
        &self,
        id: Uuid,
        artifact_path: String,
        file_count: i32,
    ) -> Result<Model, ApiError> {
        let job = self.get(id).await?;
        let now = Utc::now().fixed_offset();

        let mut active: ActiveModel = job.into();
        active.status = Set("ready".to_string());
        active.artifact_path = Set(Some(artifact_path));
        active.file_count = Set(file_count);
        active.finished_at = Set(Some(now));
        active.updated_at = Set(now);

        Ok(active.update(&self.db).await?)
    }

    /// Delete a job row. Build records cascade; deployments do not.
    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = Entity::delete_by_id(id).exec(&self.db).await?;

        if result.rows_affected == 0 {
            return Err(not_found("Generation job"));
        }

        tracing::info!(job_id = %id, "Generation job deleted");
        Ok(())
    }

    /// Mark a job `failed` with an error message.
    pub async fn finish_failure(&self, id: Uuid, error_message: String) -> Result<Model, ApiError> {
        let job = self.get(id).await?;
        let now = Utc::now().fixed_offset();

        let mut active: ActiveModel = job.into();
        active.status = Set("failed".to_string());
        active.error_message = Set(Some(error_message));
        active.finished_at = Set(Some(now));
        active.updated_at = Set(now);

        Ok(active.update(&self.db).await?)
    }
}
