//! # Deployment Repository
//!
//! Repository operations for the deployments table. The orchestrator drives
//! status and health transitions through these methods; the table is the
//! durable record an SSE subscriber snapshots before subscribing.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{ApiError, not_found};
use crate::models::deployment::{ActiveModel, Column, Entity, Model};

use super::{Page, PageParams};

/// Fields accepted when creating a deployment.
pub struct NewDeployment {
    pub build_record_id: Uuid,
    pub container_name: String,
    pub image_ref: String,
    pub cpu_limit: f64,
    pub memory_limit_mb: i32,
    pub replica_count: i32,
    pub port: i32,
    pub container_port: i32,
    pub env_vars: Option<JsonValue>,
    pub health_check_path: String,
}

/// Repository for deployment database operations
pub struct DeploymentRepository {
    db: DatabaseConnection,
}

impl DeploymentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a deployment in `pending` status with `unknown` health.
    pub async fn create(&self, new: NewDeployment) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();

        let deployment = ActiveModel {
            id: Set(Uuid::new_v4()),
            build_record_id: Set(new.build_record_id),
            container_name: Set(new.container_name),
            image_ref: Set(new.image_ref),
            cpu_limit: Set(new.cpu_limit),
            memory_limit_mb: Set(new.memory_limit_mb),
            replica_count: Set(new.replica_count),
            port: Set(new.port),
            container_port: Set(new.container_port),
            env_vars: Set(new.env_vars),
            health_check_path: Set(new.health_check_path),
            status: Set("pending".to_string()),
            health: Set("unknown".to_string()),
            last_health_check_at: Set(None),
            error_message: Set(None),
            started_at: Set(None),
            stopped_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = deployment.insert(&self.db).await?;

        tracing::info!(
            deployment_id = %result.id,
            build_record_id = %result.build_record_id,
            image_ref = %result.image_ref,
            "Deployment created"
        );

        Ok(result)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    /// Find a deployment or return NOT_FOUND.
    pub async fn get(&self, id: Uuid) -> Result<Model, ApiError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| not_found("Deployment"))
    }

    /// List deployments with optional status and build filters.
    pub async fn list(
        &self,
        status: Option<String>,
        build_record_id: Option<Uuid>,
        params: &PageParams,
    ) -> Result<Page<Model>, ApiError> {
        let mut query = Entity::find().order_by_desc(Column::CreatedAt);

        if let Some(status_filter) = status {
            query = query.filter(Column::Status.eq(status_filter));
        }

        if let Some(build_id) = build_record_id {
            query = query.filter(Column::BuildRecordId.eq(build_id));
        }

        let total = query.clone().count(&self.db).await?;
        let items = query
            .offset(params.offset())
            .limit(params.size())
            .all(&self.db)
            .await?;

        Ok(Page::new(items, total, params))
    }

    /// Deployments the supervisor must resume polling after a restart.
    pub async fn find_running(&self) -> Result<Vec<Model>, ApiError> {
        Ok(Entity::find()
            .filter(Column::Status.is_in(["deploying", "running", "scaling", "updating"]))
            .all(&self.db)
            .await?)
    }

    /// Deployments whose host port ranges are still allocated.
    pub async fn find_port_holders(&self) -> Result<Vec<Model>, ApiError> {
        Ok(Entity::find()
            .filter(Column::Status.is_not_in(["stopped", "failed"]))
            .all(&self.db)
            .await?)
    }

    /// Delete a deployment row (valid only once stopped or failed).
    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(not_found("Deployment"));
        }
        tracing::info!(deployment_id = %id, "Deployment deleted");
        Ok(())
    }

    /// Update the lifecycle status, optionally recording an error message.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: &str,
        error_message: Option<String>,
    ) -> Result<Model, ApiError> {
        let deployment = self.get(id).await?;
        let now = Utc::now().fixed_offset();

        let mut active: ActiveModel = deployment.into();
        active.status = Set(status.to_string());
        if error_message.is_some() {
            active.error_message = Set(error_message);
        }
        match status {
            "running" => active.started_at = Set(Some(now)),
            "stopped" | "failed" => active.stopped_at = Set(Some(now)),
            _ => {}
        }
        active.updated_at = Set(now);

        Ok(active.update(&self.db).await?)
    }

    /// Record a health poll outcome.
    pub async fn update_health(&self, id: Uuid, health: &str) -> Result<Model, ApiError> {
        let deployment = self.get(id).await?;
        let now = Utc::now().fixed_offset();

        let mut active: ActiveModel = deployment.into();
        active.health = Set(health.to_string());
        active.last_health_check_at = Set(Some(now));
        active.updated_at = Set(now);

        Ok(active.update(&self.db).await?)
    }

    /// Persist a new desired replica count during scaling.
    pub async fn update_replica_count(
        &self,
        id: Uuid,
        replica_count: i32,
    ) -> Result<Model, ApiError> {
        let deployment = self.get(id).await?;

        let mut active: ActiveModel = deployment.into();
        active.replica_count = Set(replica_count);
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(&self.db).await?)
    }
}
