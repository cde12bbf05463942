//! # Deployment Orchestrator
//!
//! Manages the container lifecycle of built images: start, health-check,
//! scale, stop, delete. State machine per deployment:
//!
//! ```text
//! pending -> deploying -> running -> stopping -> stopped
//!                          |  ^
//!                  scaling/updating (back to running, failed on error)
//! ```
//!
//! Any state may move to `failed` on an unrecoverable error. Mutating
//! operations hold an exclusive per-deployment lock; health polling holds a
//! shared one, so a concurrent scale and stop can never interleave.

pub mod health;
pub mod runtime;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::DeployConfig;
use crate::error::{ApiError, validation_error};
use crate::events::{BusEvent, EventBus, ResourceKind};
use crate::models::deployment::Model as DeploymentModel;
use crate::repositories::deployment::NewDeployment;
use crate::repositories::{BuildRecordRepository, DeploymentRepository};

use runtime::{ContainerRuntime, ContainerSpec};

/// Probe cadence while waiting for a new deployment to become healthy.
const STARTUP_PROBE_INTERVAL: Duration = Duration::from_secs(2);

const DEFAULT_HEALTH_PATH: &str = "/health";
const DEFAULT_CONTAINER_PORT: i32 = 8000;

/// Caller-supplied deployment options.
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub cpu_limit: Option<f64>,
    pub memory_limit_mb: Option<i32>,
    pub replica_count: Option<i32>,
    pub port: Option<i32>,
    pub container_port: Option<i32>,
    pub env_vars: Option<JsonValue>,
    pub health_check_path: Option<String>,
}

struct DeploymentHandle {
    lock: Arc<RwLock<()>>,
    poll_cancel: Option<CancellationToken>,
}

/// The deployment orchestrator. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct DeploymentOrchestrator {
    db: DatabaseConnection,
    bus: EventBus,
    runtime: Arc<dyn ContainerRuntime>,
    config: DeployConfig,
    http: reqwest::Client,
    handles: Arc<Mutex<HashMap<Uuid, DeploymentHandle>>>,
}

impl DeploymentOrchestrator {
    pub fn new(
        db: DatabaseConnection,
        bus: EventBus,
        runtime: Arc<dyn ContainerRuntime>,
        config: DeployConfig,
    ) -> Self {
        Self {
            db,
            bus,
            runtime,
            config,
            http: reqwest::Client::new(),
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a deployment for a built image and spawn the rollout task.
    pub async fn deploy(
        &self,
        build_record_id: Uuid,
        request: DeployRequest,
    ) -> Result<DeploymentModel, ApiError> {
        let builds = BuildRecordRepository::new(self.db.clone());
        let record = builds.get(build_record_id).await?;

        if record.status != "built" {
            return Err(ApiError::new(
                axum::http::StatusCode::CONFLICT,
                "CONFLICT",
                &format!("Build record is not built (status: {})", record.status),
            ));
        }

        let replica_count = request.replica_count.unwrap_or(1);
        if replica_count < 1 {
            return Err(validation_error(
                "Validation failed",
                serde_json::json!({"replica_count": "must be >= 1"}),
            ));
        }

        let deployments = DeploymentRepository::new(self.db.clone());
        let port = match request.port {
            Some(port) => port,
            None => self.allocate_port(&deployments).await?,
        };

        let deployment_id_hint = Uuid::new_v4();
        let new = NewDeployment {
            build_record_id,
            container_name: format!("mcp-{}", &deployment_id_hint.to_string()[..8]),
            image_ref: record.image_ref(),
            cpu_limit: request.cpu_limit.unwrap_or(1.0),
            memory_limit_mb: request.memory_limit_mb.unwrap_or(256),
            replica_count,
            port,
            container_port: request.container_port.unwrap_or(DEFAULT_CONTAINER_PORT),
            env_vars: request.env_vars,
            health_check_path: request
                .health_check_path
                .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string()),
        };
        let deployment = deployments.create(new).await?;
        metrics::counter!("mcpforge_deployments_submitted").increment(1);

        let orchestrator = self.clone();
        let deployment_for_task = deployment.clone();
        tokio::spawn(async move {
            orchestrator.run_deploy(deployment_for_task).await;
        });

        Ok(deployment)
    }

    /// Change the replica count of a running deployment.
    ///
    /// Valid only from `running`; `replicas < 1` is rejected and the
    /// deployment is left untouched.
    pub async fn scale(&self, id: Uuid, replicas: i32) -> Result<DeploymentModel, ApiError> {
        if replicas < 1 {
            return Err(validation_error(
                "Validation failed",
                serde_json::json!({"replicas": "must be >= 1"}),
            ));
        }

        let deployments = DeploymentRepository::new(self.db.clone());
        let lock = self.handle_lock(id).await;

        // Check and transition under the exclusive lock so two concurrent
        // mutations cannot both observe `running`.
        let (deployment, updated) = {
            let _exclusive = lock.write().await;
            let deployment = deployments.get(id).await?;
            if deployment.status != "running" {
                return Err(ApiError::new(
                    axum::http::StatusCode::CONFLICT,
                    "CONFLICT",
                    &format!("Deployment is not running (status: {})", deployment.status),
                ));
            }
            let updated = deployments.update_status(id, "scaling", None).await?;
            (deployment, updated)
        };
        self.bus
            .publish(BusEvent::status(ResourceKind::Deployment, id, "scaling"));

        let orchestrator = self.clone();
        let deployment_for_task = deployment.clone();
        tokio::spawn(async move {
            orchestrator.run_scale(deployment_for_task, replicas).await;
        });

        Ok(updated)
    }

    /// Gracefully stop a running deployment.
    pub async fn stop(&self, id: Uuid) -> Result<DeploymentModel, ApiError> {
        let deployments = DeploymentRepository::new(self.db.clone());
        let lock = self.handle_lock(id).await;

        let (deployment, updated) = {
            let _exclusive = lock.write().await;
            let deployment = deployments.get(id).await?;
            if deployment.status != "running" {
                return Err(ApiError::new(
                    axum::http::StatusCode::CONFLICT,
                    "CONFLICT",
                    &format!("Deployment cannot be stopped (status: {})", deployment.status),
                ));
            }

            self.cancel_poll(id).await;

            let updated = deployments.update_status(id, "stopping", None).await?;
            deployments.update_health(id, "shutting_down").await?;
            (deployment, updated)
        };
        self.bus.publish(BusEvent::status_with_health(
            ResourceKind::Deployment,
            id,
            "stopping",
            "shutting_down",
        ));

        let orchestrator = self.clone();
        let deployment_for_task = deployment.clone();
        tokio::spawn(async move {
            orchestrator.run_stop(deployment_for_task).await;
        });

        Ok(updated)
    }

    /// Delete a stopped or failed deployment and its containers.
    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let deployments = DeploymentRepository::new(self.db.clone());
        let lock = self.handle_lock(id).await;
        let _exclusive = lock.write().await;

        let deployment = deployments.get(id).await?;
        if deployment.status != "stopped" && deployment.status != "failed" {
            return Err(ApiError::new(
                axum::http::StatusCode::CONFLICT,
                "CONFLICT",
                &format!("Deployment must be stopped first (status: {})", deployment.status),
            ));
        }

        self.cancel_poll(id).await;

        // Remove any leftover containers best-effort.
        for replica in 0..deployment.replica_count.max(1) {
            let name = replica_name(&deployment.container_name, replica);
            if let Err(e) = self.runtime.remove(&name).await {
                tracing::debug!(deployment_id = %id, container = %name, "Remove skipped: {}", e);
            }
        }

        deployments.delete(id).await?;
        self.handles.lock().await.remove(&id);
        Ok(())
    }

    /// Resume supervision after a process restart.
    ///
    /// Running deployments get their poll task back; deployments caught
    /// mid-operation are settled as failed.
    pub async fn resume(&self) -> Result<(), ApiError> {
        let deployments = DeploymentRepository::new(self.db.clone());
        for deployment in deployments.find_running().await? {
            if deployment.status == "running" {
                self.start_poll(&deployment).await;
                tracing::info!(deployment_id = %deployment.id, "Resumed health polling");
            } else {
                deployments
                    .update_status(
                        deployment.id,
                        "failed",
                        Some("DEPLOY_FAILED: orchestrator restarted mid-operation".to_string()),
                    )
                    .await?;
                self.bus.publish(BusEvent::status_with_message(
                    ResourceKind::Deployment,
                    deployment.id,
                    "failed",
                    "orchestrator restarted mid-operation",
                ));
            }
        }
        Ok(())
    }

    async fn allocate_port(&self, deployments: &DeploymentRepository) -> Result<i32, ApiError> {
        let holders = deployments.find_port_holders().await?;
        let base = self.config.base_port as i32;
        let next = holders
            .iter()
            .map(|d| d.port + d.replica_count.max(1))
            .max()
            .unwrap_or(base);
        Ok(next.max(base))
    }

    async fn run_deploy(&self, deployment: DeploymentModel) {
        let deployments = DeploymentRepository::new(self.db.clone());
        let id = deployment.id;
        let lock = self.handle_lock(id).await;
        let _exclusive = lock.write().await;

        if let Err(e) = deployments.update_status(id, "deploying", None).await {
            tracing::error!(deployment_id = %id, "Failed to mark deploying: {:?}", e);
            return;
        }
        self.bus
            .publish(BusEvent::status(ResourceKind::Deployment, id, "deploying"));

        // Start every replica; roll back all of them on any failure.
        for replica in 0..deployment.replica_count {
            let spec = self.replica_spec(&deployment, replica);
            if let Err(e) = self.runtime.start(&spec).await {
                self.remove_replicas(&deployment, replica).await;
                self.fail(id, format!("DEPLOY_FAILED: {}", e)).await;
                return;
            }
            self.bus.publish(BusEvent::log(
                ResourceKind::Deployment,
                id,
                format!("started replica {}", spec.name),
            ));
        }

        // Wait for the first replica to report healthy.
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.startup_deadline_seconds);
        let port = deployment.port as u16;
        loop {
            if health::probe(&self.http, port, &deployment.health_check_path).await {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                self.remove_replicas(&deployment, deployment.replica_count)
                    .await;
                self.fail(
                    id,
                    format!(
                        "HEALTH_CHECK_TIMEOUT: not healthy within {}s",
                        self.config.startup_deadline_seconds
                    ),
                )
                .await;
                return;
            }
            tokio::time::sleep(STARTUP_PROBE_INTERVAL).await;
        }

        let running = deployments.update_status(id, "running", None).await;
        let healthy = deployments.update_health(id, "healthy").await;
        if let (Ok(_), Ok(_)) = (running, healthy) {
            self.bus.publish(BusEvent::status_with_health(
                ResourceKind::Deployment,
                id,
                "running",
                "healthy",
            ));
            tracing::info!(deployment_id = %id, "Deployment running");
            drop(_exclusive);
            self.start_poll(&deployment).await;
        } else {
            tracing::error!(deployment_id = %id, "Failed to record running state");
        }
    }

    async fn run_scale(&self, deployment: DeploymentModel, target: i32) {
        let deployments = DeploymentRepository::new(self.db.clone());
        let id = deployment.id;
        let lock = self.handle_lock(id).await;
        let _exclusive = lock.write().await;

        let current = deployment.replica_count;

        if target > current {
            for replica in current..target {
                let spec = self.replica_spec(&deployment, replica);
                if let Err(e) = self.runtime.start(&spec).await {
                    self.fail(id, format!("DEPLOY_FAILED: scale up: {}", e)).await;
                    return;
                }
            }
        } else {
            for replica in target..current {
                let name = replica_name(&deployment.container_name, replica);
                if let Err(e) = self
                    .runtime
                    .stop(&name, Duration::from_secs(self.config.drain_window_seconds))
                    .await
                {
                    self.fail(id, format!("DEPLOY_FAILED: scale down: {}", e)).await;
                    return;
                }
                self.runtime.remove(&name).await.ok();
            }
        }

        let count = deployments.update_replica_count(id, target).await;
        let status = deployments.update_status(id, "running", None).await;
        if count.is_ok() && status.is_ok() {
            self.bus
                .publish(BusEvent::status(ResourceKind::Deployment, id, "running"));
            tracing::info!(deployment_id = %id, replicas = target, "Deployment scaled");
        }
    }

    async fn run_stop(&self, deployment: DeploymentModel) {
        let deployments = DeploymentRepository::new(self.db.clone());
        let id = deployment.id;
        let lock = self.handle_lock(id).await;
        let _exclusive = lock.write().await;

        let drain = Duration::from_secs(self.config.drain_window_seconds);
        for replica in 0..deployment.replica_count {
            let name = replica_name(&deployment.container_name, replica);
            if let Err(e) = self.runtime.stop(&name, drain).await {
                tracing::warn!(deployment_id = %id, container = %name, "Stop failed: {}", e);
            }
            self.runtime.remove(&name).await.ok();
        }

        let status = deployments.update_status(id, "stopped", None).await;
        let health = deployments.update_health(id, "unknown").await;
        if status.is_ok() && health.is_ok() {
            self.bus
                .publish(BusEvent::status(ResourceKind::Deployment, id, "stopped"));
            tracing::info!(deployment_id = %id, "Deployment stopped");
        }
    }

    async fn fail(&self, id: Uuid, message: String) {
        let deployments = DeploymentRepository::new(self.db.clone());
        if let Err(e) = deployments
            .update_status(id, "failed", Some(message.clone()))
            .await
        {
            tracing::error!(deployment_id = %id, "Failed to record failure: {:?}", e);
        }
        self.bus.publish(BusEvent::status_with_message(
            ResourceKind::Deployment,
            id,
            "failed",
            message.clone(),
        ));
        tracing::warn!(deployment_id = %id, "Deployment failed: {}", message);
    }

    async fn remove_replicas(&self, deployment: &DeploymentModel, count: i32) {
        for replica in 0..count {
            let name = replica_name(&deployment.container_name, replica);
            self.runtime.remove(&name).await.ok();
        }
    }

    fn replica_spec(&self, deployment: &DeploymentModel, replica: i32) -> ContainerSpec {
        ContainerSpec {
            name: replica_name(&deployment.container_name, replica),
            image_ref: deployment.image_ref.clone(),
            host_port: (deployment.port + replica) as u16,
            container_port: deployment.container_port as u16,
            cpu_limit: deployment.cpu_limit,
            memory_limit_mb: deployment.memory_limit_mb.max(0) as u32,
            env: env_pairs(deployment.env_vars.as_ref()),
        }
    }

    async fn handle_lock(&self, id: Uuid) -> Arc<RwLock<()>> {
        let mut handles = self.handles.lock().await;
        handles
            .entry(id)
            .or_insert_with(|| DeploymentHandle {
                lock: Arc::new(RwLock::new(())),
                poll_cancel: None,
            })
            .lock
            .clone()
    }

    async fn start_poll(&self, deployment: &DeploymentModel) {
        let cancel = CancellationToken::new();
        let lock = self.handle_lock(deployment.id).await;

        {
            let mut handles = self.handles.lock().await;
            if let Some(handle) = handles.get_mut(&deployment.id) {
                if let Some(previous) = handle.poll_cancel.take() {
                    previous.cancel();
                }
                handle.poll_cancel = Some(cancel.clone());
            }
        }

        tokio::spawn(health::poll_loop(
            self.db.clone(),
            self.bus.clone(),
            self.http.clone(),
            self.config.clone(),
            deployment.id,
            deployment.port as u16,
            deployment.health_check_path.clone(),
            lock,
            cancel,
        ));
    }

    async fn cancel_poll(&self, id: Uuid) {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get_mut(&id)
            && let Some(cancel) = handle.poll_cancel.take()
        {
            cancel.cancel();
        }
    }
}

fn replica_name(container_name: &str, replica: i32) -> String {
    format!("{}-{}", container_name, replica)
}

fn env_pairs(env_vars: Option<&JsonValue>) -> Vec<(String, String)> {
    let Some(JsonValue::Object(map)) = env_vars else {
        return Vec::new();
    };
    map.iter()
        .map(|(key, value)| {
            let rendered = match value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}
