//! # Build Service
//!
//! Packages a ready generation job's source tree into an immutable image
//! artifact. The image tag is derived from a fingerprint of the source
//! tree, so building the same tree twice yields the same image identity.
//! Builds run under a configurable timeout; on expiry the build process is
//! killed rather than left orphaned.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::BuildConfig;
use crate::error::ApiError;
use crate::events::{BusEvent, EventBus, ResourceKind};
use crate::models::build_record::Model as BuildModel;
use crate::repositories::{ApiRegistrationRepository, BuildRecordRepository, GenerationJobRepository};
use crate::workers::StagePool;

/// Number of fingerprint hex characters used as the image tag.
const TAG_LEN: usize = 12;

/// Errors produced while running a build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("build exceeded timeout of {seconds}s")]
    Timeout { seconds: u64 },
    #[error("build failed: {message}")]
    Failed { message: String, log: String },
    #[error("build was cancelled")]
    Cancelled { log: String },
    #[error("build io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured output of a successful build.
pub struct BuildOutput {
    pub log: String,
}

/// Builds an image from a rendered source tree.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(
        &self,
        source_dir: &Path,
        image_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<BuildOutput, BuildError>;
}

/// Shells out to a docker/podman compatible `build` command.
pub struct ProcessImageBuilder {
    command: String,
    timeout: Duration,
}

impl ProcessImageBuilder {
    pub fn new(command: String, timeout_seconds: u64) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

#[async_trait]
impl ImageBuilder for ProcessImageBuilder {
    async fn build(
        &self,
        source_dir: &Path,
        image_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<BuildOutput, BuildError> {
        let mut child = Command::new(&self.command)
            .arg("build")
            .arg("-t")
            .arg(image_ref)
            .arg(source_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        // Both pipes are drained concurrently; reading them in sequence
        // would block the child once the unread pipe's buffer fills.
        let capture = async {
            let mut out_log = String::new();
            let mut err_log = String::new();
            tokio::join!(
                async {
                    if let Some(out) = stdout.as_mut() {
                        out.read_to_string(&mut out_log).await.ok();
                    }
                },
                async {
                    if let Some(err) = stderr.as_mut() {
                        err.read_to_string(&mut err_log).await.ok();
                    }
                }
            );
            if !out_log.is_empty() && !out_log.ends_with('\n') && !err_log.is_empty() {
                out_log.push('\n');
            }
            out_log.push_str(&err_log);
            out_log
        };

        tokio::select! {
            result = async {
                let log = capture.await;
                let status = child.wait().await?;
                Ok::<_, std::io::Error>((status, log))
            } => {
                let (status, log) = result?;
                if status.success() {
                    Ok(BuildOutput { log })
                } else {
                    Err(BuildError::Failed {
                        message: format!("build command exited with {}", status),
                        log,
                    })
                }
            }
            _ = tokio::time::sleep(self.timeout) => {
                child.start_kill().ok();
                Err(BuildError::Timeout { seconds: self.timeout.as_secs() })
            }
            _ = cancel.cancelled() => {
                child.start_kill().ok();
                Err(BuildError::Cancelled { log: String::new() })
            }
        }
    }
}

/// Content fingerprint of a source tree: sha-256 over sorted relative
/// paths and file contents.
pub fn fingerprint_tree(root: &Path) -> std::io::Result<String> {
    let mut paths: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();

    let mut hasher = Sha256::new();
    for path in paths {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(std::fs::read(&path)?);
        hasher.update([0u8]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Image tag derived from a tree fingerprint.
pub fn image_tag(fingerprint: &str) -> String {
    fingerprint.chars().take(TAG_LEN).collect()
}

/// The build service. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct BuildService {
    db: DatabaseConnection,
    bus: EventBus,
    builder: Arc<dyn ImageBuilder>,
    pool: StagePool,
    config: BuildConfig,
    in_flight: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl BuildService {
    pub fn new(
        db: DatabaseConnection,
        bus: EventBus,
        builder: Arc<dyn ImageBuilder>,
        config: BuildConfig,
    ) -> Self {
        let pool = StagePool::new("build", config.pool_size, config.retry_after_seconds);
        Self {
            db,
            bus,
            builder,
            pool,
            config,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Accept a build for a ready generation job and spawn the build task.
    ///
    /// Synchronous failures: unknown or non-ready job, an existing build
    /// record for the job (CONFLICT, builds are 1:1), saturated pool (BUSY).
    pub async fn submit(&self, job_id: Uuid) -> Result<BuildModel, ApiError> {
        let jobs = GenerationJobRepository::new(self.db.clone());
        let job = jobs.get(job_id).await?;

        if job.status != "ready" {
            return Err(ApiError::new(
                axum::http::StatusCode::CONFLICT,
                "CONFLICT",
                &format!("Generation job is not ready (status: {})", job.status),
            ));
        }
        let Some(artifact_path) = job.artifact_path.clone() else {
            return Err(ApiError::new(
                axum::http::StatusCode::CONFLICT,
                "CONFLICT",
                "Generation job has no artifact",
            ));
        };

        let builds = BuildRecordRepository::new(self.db.clone());
        if builds.find_by_job(job_id).await?.is_some() {
            return Err(ApiError::new(
                axum::http::StatusCode::CONFLICT,
                "CONFLICT",
                "A build record already exists for this job",
            ));
        }

        let slot = self.pool.try_acquire()?;

        let registrations = ApiRegistrationRepository::new(self.db.clone());
        let registration = registrations.get(job.registration_id).await?;

        // Hashing the tree is blocking filesystem work; keep it off the
        // async submit path.
        let source_dir = std::path::PathBuf::from(&artifact_path);
        let fingerprint_dir = source_dir.clone();
        let fingerprint = tokio::task::spawn_blocking(move || fingerprint_tree(&fingerprint_dir))
            .await
            .map_err(|e| anyhow::anyhow!("fingerprint task panicked: {}", e))?
            .map_err(|e| anyhow::anyhow!("failed to fingerprint artifact: {}", e))?;

        let image_name = format!(
            "{}/{}",
            self.config.image_prefix,
            slug(&registration.name)
        );
        let record = builds
            .create(job_id, image_name, image_tag(&fingerprint))
            .await?;

        metrics::counter!("mcpforge_builds_submitted").increment(1);

        let cancel = CancellationToken::new();
        self.in_flight
            .lock()
            .await
            .insert(record.id, cancel.clone());

        let service = self.clone();
        let record_for_task = record.clone();
        tokio::spawn(async move {
            let _slot = slot;
            service.execute(record_for_task, source_dir, cancel).await;
        });

        Ok(record)
    }

    /// Request cooperative cancellation of an in-flight build.
    pub async fn cancel(&self, build_id: Uuid) -> Result<BuildModel, ApiError> {
        let builds = BuildRecordRepository::new(self.db.clone());
        let record = builds.get(build_id).await?;

        if record.status != "pending" && record.status != "building" {
            return Err(ApiError::new(
                axum::http::StatusCode::CONFLICT,
                "CONFLICT",
                &format!("Build is not in flight (status: {})", record.status),
            ));
        }

        if let Some(token) = self.in_flight.lock().await.get(&build_id) {
            token.cancel();
            tracing::info!(build_id = %build_id, "Build cancellation requested");
            builds.get(build_id).await
        } else {
            let record = builds
                .finish_failure(build_id, String::new(), "Cancelled".to_string())
                .await?;
            self.bus.publish(BusEvent::status_with_message(
                ResourceKind::Build,
                build_id,
                "failed",
                "Cancelled",
            ));
            Ok(record)
        }
    }

    async fn execute(
        &self,
        record: BuildModel,
        source_dir: std::path::PathBuf,
        cancel: CancellationToken,
    ) {
        let builds = BuildRecordRepository::new(self.db.clone());
        let build_id = record.id;
        let image_ref = record.image_ref();

        if let Err(e) = builds.mark_building(build_id).await {
            tracing::error!(build_id = %build_id, "Failed to mark build building: {:?}", e);
            self.in_flight.lock().await.remove(&build_id);
            return;
        }
        self.bus
            .publish(BusEvent::status(ResourceKind::Build, build_id, "building"));
        self.bus.publish(BusEvent::log(
            ResourceKind::Build,
            build_id,
            format!("building {}", image_ref),
        ));

        let outcome = self.builder.build(&source_dir, &image_ref, &cancel).await;

        let result = match outcome {
            Ok(output) => {
                let updated = builds.finish_success(build_id, output.log).await;
                self.bus
                    .publish(BusEvent::status(ResourceKind::Build, build_id, "built"));
                tracing::info!(build_id = %build_id, image = %image_ref, "Build succeeded");
                updated
            }
            Err(BuildError::Timeout { seconds }) => {
                let message = format!("BUILD_TIMEOUT: build exceeded {}s", seconds);
                let updated = builds
                    .finish_failure(build_id, String::new(), message.clone())
                    .await;
                self.bus.publish(BusEvent::status_with_message(
                    ResourceKind::Build,
                    build_id,
                    "failed",
                    message,
                ));
                updated
            }
            Err(BuildError::Cancelled { log }) => {
                let updated = builds
                    .finish_failure(build_id, log, "Cancelled".to_string())
                    .await;
                self.bus.publish(BusEvent::status_with_message(
                    ResourceKind::Build,
                    build_id,
                    "failed",
                    "Cancelled",
                ));
                updated
            }
            Err(BuildError::Failed { message, log }) => {
                let message = format!("BUILD_FAILED: {}", message);
                let updated = builds
                    .finish_failure(build_id, log, message.clone())
                    .await;
                self.bus.publish(BusEvent::status_with_message(
                    ResourceKind::Build,
                    build_id,
                    "failed",
                    message,
                ));
                updated
            }
            Err(BuildError::Io(e)) => {
                let message = format!("BUILD_FAILED: {}", e);
                let updated = builds
                    .finish_failure(build_id, String::new(), message.clone())
                    .await;
                self.bus.publish(BusEvent::status_with_message(
                    ResourceKind::Build,
                    build_id,
                    "failed",
                    message,
                ));
                updated
            }
        };

        if let Err(e) = result {
            tracing::error!(build_id = %build_id, "Failed to record build outcome: {:?}", e);
        }

        self.in_flight.lock().await.remove(&build_id);
    }
}

fn slug(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    slug.trim_matches('-').replace("--", "-")
}
