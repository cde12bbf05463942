//! Deployment entity model
//!
//! This module contains the SeaORM entity model for the deployments table,
//! a running (or previously running) instance of a built image. Deployments
//! carry no foreign key to build_records: they outlive the job and build
//! that produced them.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Deployment entity representing a container lifecycle
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "deployments")]
pub struct Model {
    /// Unique identifier for the deployment (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Build record whose image this deployment runs (no FK, survives deletion)
    pub build_record_id: Uuid,

    /// Container name prefix used for replicas
    pub container_name: String,

    /// Image reference snapshot (name:tag) taken at deploy time
    pub image_ref: String,

    /// CPU limit in cores
    pub cpu_limit: f64,

    /// Memory limit in megabytes
    pub memory_limit_mb: i32,

    /// Desired replica count (>= 1)
    pub replica_count: i32,

    /// Host port the first replica is published on
    pub port: i32,

    /// Port the generated server listens on inside the container
    pub container_port: i32,

    /// Environment variables injected into the containers
    #[sea_orm(column_type = "JsonBinary")]
    pub env_vars: Option<JsonValue>,

    /// Path polled for liveness (declared by the generated template)
    pub health_check_path: String,

    /// Lifecycle status (pending, deploying, running, scaling, updating,
    /// stopping, stopped, failed)
    pub status: String,

    /// Health verdict (unknown, starting, healthy, unhealthy, degraded,
    /// shutting_down)
    pub health: String,

    /// Timestamp of the most recent health poll
    pub last_health_check_at: Option<DateTimeWithTimeZone>,

    /// Error message if the deployment failed
    pub error_message: Option<String>,

    /// Timestamp when the deployment reached running
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the deployment stopped
    pub stopped_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the deployment was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the deployment was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
