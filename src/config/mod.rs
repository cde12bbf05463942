//! Configuration loading for mcpforge.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `MCPFORGE_`, producing a typed [`AppConfig`] with per-subsystem sections
//! for the normalizer, generation engine, build service and deployment
//! orchestrator.

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration derived from `MCPFORGE_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    /// AES-256 key for credential blobs, base64 in the environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<Vec<u8>>,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub event_bus: EventBusConfig,
}

/// Specification normalizer limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct NormalizerConfig {
    /// Maximum accepted source document size in bytes (default: 2 MiB)
    #[serde(default = "default_normalizer_max_spec_bytes")]
    pub max_spec_bytes: usize,

    /// Maximum number of GraphQL query/mutation fields accepted (default: 500)
    #[serde(default = "default_normalizer_max_graphql_fields")]
    pub max_graphql_fields: usize,
}

/// Code generation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct GeneratorConfig {
    /// Directory where rendered source trees are written
    #[serde(default = "default_generator_artifact_root")]
    pub artifact_root: String,

    /// Maximum number of concurrently executing generation jobs (default: 4)
    #[serde(default = "default_generator_pool_size")]
    pub pool_size: usize,

    /// Retry hint returned with BUSY responses, in seconds (default: 5)
    #[serde(default = "default_stage_retry_after_seconds")]
    pub retry_after_seconds: u64,
}

/// Build service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BuildConfig {
    /// Container build command (docker/podman compatible)
    #[serde(default = "default_build_command")]
    pub builder_command: String,

    /// Prefix for generated image names
    #[serde(default = "default_image_prefix")]
    pub image_prefix: String,

    /// Build timeout in seconds; the build process is killed on expiry
    #[serde(default = "default_build_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Maximum number of concurrently executing builds (default: 2)
    #[serde(default = "default_build_pool_size")]
    pub pool_size: usize,

    /// Retry hint returned with BUSY responses, in seconds (default: 10)
    #[serde(default = "default_build_retry_after_seconds")]
    pub retry_after_seconds: u64,
}

/// Deployment orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DeployConfig {
    /// Container runtime command (docker/podman compatible)
    #[serde(default = "default_runtime_command")]
    pub runtime_command: String,

    /// Health poll interval per running deployment, in seconds (default: 30)
    #[serde(default = "default_health_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Deadline for a new deployment to become healthy, in seconds
    #[serde(default = "default_startup_deadline_seconds")]
    pub startup_deadline_seconds: u64,

    /// Graceful drain window before force-kill on stop, in seconds
    #[serde(default = "default_drain_window_seconds")]
    pub drain_window_seconds: u64,

    /// Consecutive failed polls before health is downgraded to unhealthy
    #[serde(default = "default_health_failure_threshold")]
    pub failure_threshold: u32,

    /// First host port handed out when deployments do not request one
    #[serde(default = "default_deploy_base_port")]
    pub base_port: u16,
}

/// Status/event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EventBusConfig {
    /// Broadcast channel capacity; slow subscribers past this lag lose events
    #[serde(default = "default_event_bus_capacity")]
    pub capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            crypto_key: None,
            normalizer: NormalizerConfig::default(),
            generator: GeneratorConfig::default(),
            build: BuildConfig::default(),
            deploy: DeployConfig::default(),
            event_bus: EventBusConfig::default(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_spec_bytes: default_normalizer_max_spec_bytes(),
            max_graphql_fields: default_normalizer_max_graphql_fields(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            artifact_root: default_generator_artifact_root(),
            pool_size: default_generator_pool_size(),
            retry_after_seconds: default_stage_retry_after_seconds(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            builder_command: default_build_command(),
            image_prefix: default_image_prefix(),
            timeout_seconds: default_build_timeout_seconds(),
            pool_size: default_build_pool_size(),
            retry_after_seconds: default_build_retry_after_seconds(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            runtime_command: default_runtime_command(),
            poll_interval_seconds: default_health_poll_interval_seconds(),
            startup_deadline_seconds: default_startup_deadline_seconds(),
            drain_window_seconds: default_drain_window_seconds(),
            failure_threshold: default_health_failure_threshold(),
            base_port: default_deploy_base_port(),
        }
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_bus_capacity(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.crypto_key.is_some() {
            config.crypto_key = Some(b"[REDACTED]".to_vec());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if settings are out
    /// of bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref key) = self.crypto_key
            && key.len() != 32
        {
            return Err(ConfigError::InvalidCryptoKeyLength { length: key.len() });
        }

        if self.generator.pool_size == 0 || self.generator.pool_size > 64 {
            return Err(ConfigError::InvalidPoolSize {
                stage: "generator",
                value: self.generator.pool_size,
            });
        }

        if self.build.pool_size == 0 || self.build.pool_size > 64 {
            return Err(ConfigError::InvalidPoolSize {
                stage: "build",
                value: self.build.pool_size,
            });
        }

        if self.build.timeout_seconds == 0 {
            return Err(ConfigError::InvalidBuildTimeout {
                value: self.build.timeout_seconds,
            });
        }

        if self.deploy.poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidHealthPollInterval {
                value: self.deploy.poll_interval_seconds,
            });
        }

        if self.deploy.failure_threshold == 0 {
            return Err(ConfigError::InvalidHealthFailureThreshold {
                value: self.deploy.failure_threshold,
            });
        }

        if self.normalizer.max_spec_bytes == 0 {
            return Err(ConfigError::InvalidMaxSpecBytes {
                value: self.normalizer.max_spec_bytes,
            });
        }

        if self.event_bus.capacity == 0 {
            return Err(ConfigError::InvalidEventBusCapacity {
                value: self.event_bus.capacity,
            });
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_normalizer_max_spec_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_normalizer_max_graphql_fields() -> usize {
    500
}

fn default_generator_artifact_root() -> String {
    "./artifacts".to_string()
}

fn default_generator_pool_size() -> usize {
    4
}

fn default_stage_retry_after_seconds() -> u64 {
    5
}

fn default_build_command() -> String {
    "docker".to_string()
}

fn default_image_prefix() -> String {
    "mcpforge".to_string()
}

fn default_build_timeout_seconds() -> u64 {
    600
}

fn default_build_pool_size() -> usize {
    2
}

fn default_build_retry_after_seconds() -> u64 {
    10
}

fn default_runtime_command() -> String {
    "docker".to_string()
}

fn default_health_poll_interval_seconds() -> u64 {
    30
}

fn default_startup_deadline_seconds() -> u64 {
    120
}

fn default_drain_window_seconds() -> u64 {
    30
}

fn default_health_failure_threshold() -> u32 {
    3
}

fn default_deploy_base_port() -> u16 {
    9000
}

fn default_event_bus_capacity() -> usize {
    1024
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("crypto key is invalid base64: {error}")]
    InvalidCryptoKeyBase64 { error: String },
    #[error("crypto key must decode to exactly 32 bytes, got {length} bytes")]
    InvalidCryptoKeyLength { length: usize },
    #[error("{stage} pool size must be between 1 and 64, got {value}")]
    InvalidPoolSize { stage: &'static str, value: usize },
    #[error("build timeout must be positive, got {value}")]
    InvalidBuildTimeout { value: u64 },
    #[error("health poll interval must be positive, got {value}")]
    InvalidHealthPollInterval { value: u64 },
    #[error("health failure threshold must be positive, got {value}")]
    InvalidHealthFailureThreshold { value: u32 },
    #[error("maximum spec size must be positive, got {value}")]
    InvalidMaxSpecBytes { value: usize },
    #[error("event bus capacity must be positive, got {value}")]
    InvalidEventBusCapacity { value: usize },
}

/// Loads configuration using layered `.env` files and `MCPFORGE_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration from layered env files and the process environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("MCPFORGE_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let crypto_key = if let Some(key_str) = layered.remove("CRYPTO_KEY") {
            use base64::{Engine as _, engine::general_purpose};
            let decoded = general_purpose::STANDARD.decode(&key_str).map_err(|e| {
                ConfigError::InvalidCryptoKeyBase64 {
                    error: e.to_string(),
                }
            })?;
            Some(decoded)
        } else {
            None
        };

        let normalizer = NormalizerConfig {
            max_spec_bytes: layered
                .remove("NORMALIZER_MAX_SPEC_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_normalizer_max_spec_bytes),
            max_graphql_fields: layered
                .remove("NORMALIZER_MAX_GRAPHQL_FIELDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_normalizer_max_graphql_fields),
        };

        let generator = GeneratorConfig {
            artifact_root: layered
                .remove("GENERATOR_ARTIFACT_ROOT")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_generator_artifact_root),
            pool_size: layered
                .remove("GENERATOR_POOL_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_generator_pool_size),
            retry_after_seconds: layered
                .remove("GENERATOR_RETRY_AFTER_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_stage_retry_after_seconds),
        };

        let build = BuildConfig {
            builder_command: layered
                .remove("BUILD_COMMAND")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_build_command),
            image_prefix: layered
                .remove("BUILD_IMAGE_PREFIX")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_image_prefix),
            timeout_seconds: layered
                .remove("BUILD_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_build_timeout_seconds),
            pool_size: layered
                .remove("BUILD_POOL_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_build_pool_size),
            retry_after_seconds: layered
                .remove("BUILD_RETRY_AFTER_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_build_retry_after_seconds),
        };

        let deploy = DeployConfig {
            runtime_command: layered
                .remove("DEPLOY_RUNTIME_COMMAND")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_runtime_command),
            poll_interval_seconds: layered
                .remove("DEPLOY_POLL_INTERVAL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_health_poll_interval_seconds),
            startup_deadline_seconds: layered
                .remove("DEPLOY_STARTUP_DEADLINE_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_startup_deadline_seconds),
            drain_window_seconds: layered
                .remove("DEPLOY_DRAIN_WINDOW_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_drain_window_seconds),
            failure_threshold: layered
                .remove("DEPLOY_FAILURE_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_health_failure_threshold),
            base_port: layered
                .remove("DEPLOY_BASE_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_deploy_base_port),
        };

        let event_bus = EventBusConfig {
            capacity: layered
                .remove("EVENT_BUS_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_event_bus_capacity),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            crypto_key,
            normalizer,
            generator,
            build,
            deploy,
            event_bus,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("MCPFORGE_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("MCPFORGE_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
