//! # Code Generation Engine
//!
//! Renders a registration's canonical endpoint model into a complete MCP
//! bridge server source tree for a `(language, framework)` target.
//!
//! Submission is synchronous validation plus an asynchronous render: the
//! caller gets the job row immediately and observes completion through
//! status queries or the event bus. At most one job per target is in
//! flight; duplicates are rejected with `GENERATION_IN_PROGRESS` rather
//! than queued. Rendering is all-or-nothing: a failed or cancelled job
//! leaves no artifact behind.

pub mod context;
pub mod registry;
pub mod targets;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::GeneratorConfig;
use crate::crypto::{self, CryptoKey};
use crate::error::{ApiError, ErrorType};
use crate::events::{BusEvent, EventBus, ResourceKind};
use crate::models::generation_job::Model as JobModel;
use crate::repositories::{
    ApiEndpointRepository, ApiRegistrationRepository, GenerationJobRepository,
};
use crate::workers::StagePool;

use context::{AuthBinding, RenderContext};
use registry::{RegistryError, TemplateRegistry, TemplateSet};

/// Target selection and options for one generation submission.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub language: String,
    pub framework: String,
    pub features: Vec<String>,
    pub config: BTreeMap<String, String>,
}

type TargetKey = (Uuid, String, String);

struct InFlightJob {
    job_id: Uuid,
    cancel: CancellationToken,
}

/// The generation engine. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct GenerationEngine {
    db: DatabaseConnection,
    bus: EventBus,
    registry: Arc<TemplateRegistry>,
    pool: StagePool,
    config: GeneratorConfig,
    crypto_key: Option<Arc<CryptoKey>>,
    in_flight: Arc<Mutex<HashMap<TargetKey, InFlightJob>>>,
}

impl GenerationEngine {
    pub fn new(
        db: DatabaseConnection,
        bus: EventBus,
        registry: TemplateRegistry,
        config: GeneratorConfig,
        crypto_key: Option<CryptoKey>,
    ) -> Self {
        let pool = StagePool::new("generation", config.pool_size, config.retry_after_seconds);
        Self {
            db,
            bus,
            registry: Arc::new(registry),
            pool,
            config,
            crypto_key: crypto_key.map(Arc::new),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Validate and accept a generation request, spawning the render task.
    ///
    /// Synchronous failures: unknown registration, inactive registration,
    /// unknown target (`TEMPLATE_NOT_FOUND`), duplicate in-flight target
    /// (`GENERATION_IN_PROGRESS`), saturated pool (`BUSY`).
    pub async fn submit(
        &self,
        registration_id: Uuid,
        request: GenerationRequest,
    ) -> Result<JobModel, ApiError> {
        let registrations = ApiRegistrationRepository::new(self.db.clone());
        let registration = registrations.get(registration_id).await?;

        if registration.status != "active" {
            return Err(ApiError::new(
                axum::http::StatusCode::CONFLICT,
                "CONFLICT",
                &format!(
                    "Registration must be active to generate (status: {})",
                    registration.status
                ),
            ));
        }

        let template = self
            .registry
            .get(&request.language, &request.framework)
            .map_err(registry_error)?;

        let key = (
            registration_id,
            request.language.clone(),
            request.framework.clone(),
        );

        // The guard is held across the duplicate check and job insertion so
        // two concurrent submissions cannot both pass the check.
        let mut in_flight = self.in_flight.lock().await;

        if in_flight.contains_key(&key) {
            return Err(ErrorType::GenerationInProgress.into());
        }

        let jobs = GenerationJobRepository::new(self.db.clone());
        if jobs
            .find_active_for_target(registration_id, &request.language, &request.framework)
            .await?
            .is_some()
        {
            return Err(ErrorType::GenerationInProgress.into());
        }

        let slot = self.pool.try_acquire()?;

        let features = JsonValue::Array(
            request
                .features
                .iter()
                .map(|f| JsonValue::String(f.clone()))
                .collect(),
        );
        let config_json = if request.config.is_empty() {
            None
        } else {
            Some(serde_json::to_value(&request.config).map_err(|e| anyhow::anyhow!(e))?)
        };

        let job = jobs
            .create(
                registration_id,
                request.language.clone(),
                request.framework.clone(),
                features,
                config_json,
            )
            .await?;

        let cancel = CancellationToken::new();
        in_flight.insert(
            key.clone(),
            InFlightJob {
                job_id: job.id,
                cancel: cancel.clone(),
            },
        );
        drop(in_flight);

        metrics::counter!("mcpforge_generation_jobs_submitted").increment(1);

        let engine = self.clone();
        let job_for_task = job.clone();
        tokio::spawn(async move {
            let _slot = slot;
            engine
                .execute(job_for_task, template, request, cancel)
                .await;
            engine.in_flight.lock().await.remove(&key);
        });

        Ok(job)
    }

    /// Request cooperative cancellation of an in-flight job.
    pub async fn cancel(&self, job_id: Uuid) -> Result<JobModel, ApiError> {
        let jobs = GenerationJobRepository::new(self.db.clone());
        let job = jobs.get(job_id).await?;

        if job.status != "pending" && job.status != "generating" {
            return Err(ApiError::new(
                axum::http::StatusCode::CONFLICT,
                "CONFLICT",
                &format!("Job is not in flight (status: {})", job.status),
            ));
        }

        let in_flight = self.in_flight.lock().await;
        let token = in_flight
            .values()
            .find(|entry| entry.job_id == job_id)
            .map(|entry| entry.cancel.clone());
        drop(in_flight);

        match token {
            Some(token) => {
                token.cancel();
                tracing::info!(job_id = %job_id, "Generation cancellation requested");
                jobs.get(job_id).await
            }
            // No live worker (e.g. process restarted mid-job): settle the
            // row directly.
            None => {
                let job = jobs.finish_failure(job_id, "Cancelled".to_string()).await?;
                self.bus.publish(BusEvent::status_with_message(
                    ResourceKind::Generation,
                    job_id,
                    "failed",
                    "Cancelled",
                ));
                Ok(job)
            }
        }
    }

    async fn execute(
        &self,
        job: JobModel,
        template: Arc<dyn TemplateSet>,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) {
        let job_id = job.id;
        let artifact_dir = PathBuf::from(&self.config.artifact_root).join(job_id.to_string());

        match self
            .render_to_disk(&job, template, request, &cancel, &artifact_dir)
            .await
        {
            Ok(file_count) => {
                let jobs = GenerationJobRepository::new(self.db.clone());
                match jobs
                    .finish_success(job_id, artifact_dir.display().to_string(), file_count)
                    .await
                {
                    Ok(_) => {
                        self.bus.publish(BusEvent::status(
                            ResourceKind::Generation,
                            job_id,
                            "ready",
                        ));
                        tracing::info!(job_id = %job_id, file_count, "Generation job ready");
                    }
                    Err(e) => {
                        tracing::error!(job_id = %job_id, "Failed to record job success: {:?}", e);
                    }
                }
            }
            Err(message) => {
                // Failed and cancelled jobs never leave a partial tree.
                if let Err(e) = tokio::fs::remove_dir_all(&artifact_dir).await
                    && e.kind() != std::io::ErrorKind::NotFound
                {
                    tracing::warn!(job_id = %job_id, "Failed to clean up artifact dir: {}", e);
                }

                let jobs = GenerationJobRepository::new(self.db.clone());
                if let Err(e) = jobs.finish_failure(job_id, message.clone()).await {
                    tracing::error!(job_id = %job_id, "Failed to record job failure: {:?}", e);
                }
                self.bus.publish(BusEvent::status_with_message(
                    ResourceKind::Generation,
                    job_id,
                    "failed",
                    message.clone(),
                ));
                tracing::warn!(job_id = %job_id, "Generation job failed: {}", message);
            }
        }
    }

    async fn render_to_disk(
        &self,
        job: &JobModel,
        template: Arc<dyn TemplateSet>,
        request: GenerationRequest,
        cancel: &CancellationToken,
        artifact_dir: &Path,
    ) -> Result<i32, String> {
        let jobs = GenerationJobRepository::new(self.db.clone());
        let registrations = ApiRegistrationRepository::new(self.db.clone());
        let endpoints_repo = ApiEndpointRepository::new(self.db.clone());

        jobs.mark_generating(job.id)
            .await
            .map_err(|e| format!("failed to update job status: {}", e.message))?;
        self.bus
            .publish(BusEvent::status(ResourceKind::Generation, job.id, "generating"));
        self.log(job.id, format!("rendering target {}/{}", request.language, request.framework))
            .await;

        let registration = registrations
            .get(job.registration_id)
            .await
            .map_err(|e| e.message.to_string())?;
        let endpoints = endpoints_repo
            .all_for_registration(job.registration_id)
            .await
            .map_err(|e| e.message.to_string())?;

        let credentials = match (&registration.auth_blob, &self.crypto_key) {
            (Some(blob), Some(key)) => Some(
                crypto::decrypt_credentials(key, registration.id, &registration.auth_type, blob)
                    .map_err(|e| format!("credential decryption failed: {}", e))?,
            ),
            (Some(_), None) => {
                return Err("credential blob present but no crypto key configured".to_string());
            }
            (None, _) => None,
        };

        let auth = AuthBinding::from_registration(&registration, credentials.as_ref())
            .map_err(|e| e.to_string())?;

        let context = RenderContext {
            registration,
            endpoints,
            language: request.language,
            framework: request.framework,
            features: request.features,
            config: request.config,
            auth,
        };

        if cancel.is_cancelled() {
            return Err("Cancelled".to_string());
        }

        let files = template.render(&context).map_err(|e| e.to_string())?;
        if files.is_empty() {
            return Err("template produced an empty file set".to_string());
        }

        tokio::fs::create_dir_all(artifact_dir)
            .await
            .map_err(|e| format!("failed to create artifact dir: {}", e))?;

        let mut written = 0i32;
        for file in files.into_files() {
            // Cooperative cancellation between file writes.
            if cancel.is_cancelled() {
                return Err("Cancelled".to_string());
            }

            let target = artifact_dir.join(&file.path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
            }
            tokio::fs::write(&target, file.contents.as_bytes())
                .await
                .map_err(|e| format!("failed to write {}: {}", file.path, e))?;

            written += 1;
            self.log(job.id, format!("rendered {}", file.path)).await;
        }

        Ok(written)
    }

    async fn log(&self, job_id: Uuid, line: String) {
        let jobs = GenerationJobRepository::new(self.db.clone());
        if let Err(e) = jobs.append_log(job_id, &line).await {
            tracing::warn!(job_id = %job_id, "Failed to append generation log: {:?}", e);
        }
        self.bus
            .publish(BusEvent::log(ResourceKind::Generation, job_id, line));
    }
}

fn registry_error(error: RegistryError) -> ApiError {
    match error {
        RegistryError::TargetNotFound { language, framework } => {
            let error_type = ErrorType::TemplateNotFound;
            ApiError::new(
                error_type.status_code(),
                error_type.error_code(),
                &format!(
                    "No template set registered for target '{}/{}'",
                    language, framework
                ),
            )
        }
    }
}
