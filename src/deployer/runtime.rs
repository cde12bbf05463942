//! Container runtime abstraction.
//!
//! The orchestrator drives containers through this trait; the process
//! implementation shells out to a docker/podman compatible CLI.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// Errors produced while driving the container runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime command failed: {stderr}")]
    CommandFailed { stderr: String },
    #[error("runtime io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything needed to start one replica container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image_ref: String,
    pub host_port: u16,
    pub container_port: u16,
    pub cpu_limit: f64,
    pub memory_limit_mb: u32,
    pub env: Vec<(String, String)>,
}

/// Starts, stops and removes containers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn start(&self, spec: &ContainerSpec) -> Result<(), RuntimeError>;

    /// Graceful stop with a bounded drain window before force-kill.
    async fn stop(&self, name: &str, drain_window: Duration) -> Result<(), RuntimeError>;

    async fn remove(&self, name: &str) -> Result<(), RuntimeError>;
}

/// Shells out to a docker/podman compatible CLI.
pub struct ProcessContainerRuntime {
    command: String,
}

impl ProcessContainerRuntime {
    pub fn new(command: String) -> Self {
        Self { command }
    }

    async fn run(&self, args: &[String]) -> Result<(), RuntimeError> {
        let output = Command::new(&self.command)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RuntimeError::CommandFailed {
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl ContainerRuntime for ProcessContainerRuntime {
    async fn start(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "-p".to_string(),
            format!("{}:{}", spec.host_port, spec.container_port),
            "--cpus".to_string(),
            format!("{}", spec.cpu_limit),
            "--memory".to_string(),
            format!("{}m", spec.memory_limit_mb),
        ];
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(spec.image_ref.clone());

        self.run(&args).await
    }

    async fn stop(&self, name: &str, drain_window: Duration) -> Result<(), RuntimeError> {
        // `stop -t` sends SIGTERM and force-kills after the window.
        self.run(&[
            "stop".to_string(),
            "-t".to_string(),
            drain_window.as_secs().to_string(),
            name.to_string(),
        ])
        .await
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.run(&["rm".to_string(), "-f".to_string(), name.to_string()])
            .await
    }
}
