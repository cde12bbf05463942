//! Per-deployment health polling.
//!
//! Every running deployment gets one cancellable poll task, tracked in the
//! orchestrator's supervisor map and cancelled on stop or delete. Three
//! consecutive failed probes downgrade health to `unhealthy` and emit an
//! event; the deployment is never auto-stopped, remediation is left to the
//! operator.

use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::DeployConfig;
use crate::events::{BusEvent, EventBus, ResourceKind};
use crate::repositories::DeploymentRepository;

/// Probe timeout per health request.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probes a deployment's health path once.
pub async fn probe(http: &reqwest::Client, port: u16, path: &str) -> bool {
    let url = format!("http://127.0.0.1:{}{}", port, path);
    match http.get(&url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

/// Poll loop for one deployment. Runs until cancelled.
///
/// Takes the deployment's shared lock per tick so probes never interleave
/// with an exclusive mutation (scale/stop) in progress.
pub async fn poll_loop(
    db: DatabaseConnection,
    bus: EventBus,
    http: reqwest::Client,
    config: DeployConfig,
    deployment_id: Uuid,
    port: u16,
    health_path: String,
    lock: std::sync::Arc<RwLock<()>>,
    cancel: CancellationToken,
) {
    let deployments = DeploymentRepository::new(db);
    let mut interval = tokio::time::interval(Duration::from_secs(config.poll_interval_seconds));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut consecutive_failures: u32 = 0;
    let mut last_verdict = String::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(deployment_id = %deployment_id, "Health poll task cancelled");
                return;
            }
            _ = interval.tick() => {}
        }

        let _shared = lock.read().await;

        let healthy = probe(&http, port, &health_path).await;
        let verdict = if healthy {
            consecutive_failures = 0;
            "healthy"
        } else {
            consecutive_failures += 1;
            if consecutive_failures >= config.failure_threshold {
                "unhealthy"
            } else {
                "degraded"
            }
        };

        match deployments.update_health(deployment_id, verdict).await {
            Ok(deployment) => {
                if verdict != last_verdict {
                    bus.publish(BusEvent::status_with_health(
                        ResourceKind::Deployment,
                        deployment_id,
                        deployment.status,
                        verdict,
                    ));
                    if verdict == "unhealthy" {
                        metrics::counter!("mcpforge_deployments_unhealthy").increment(1);
                        tracing::warn!(
                            deployment_id = %deployment_id,
                            consecutive_failures,
                            "Deployment downgraded to unhealthy"
                        );
                    }
                    last_verdict = verdict.to_string();
                }
            }
            Err(e) => {
                // Row gone (deployment deleted): stop polling.
                tracing::debug!(
                    deployment_id = %deployment_id,
                    "Stopping health poll: {}",
                    e.message
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_success_and_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let port = server.address().port();

        assert!(probe(&http, port, "/health").await);
        assert!(!probe(&http, port, "/missing").await);
    }

    #[tokio::test]
    async fn test_probe_unreachable_port_fails() {
        let http = reqwest::Client::new();
        let port = portpicker::pick_unused_port().expect("free port");
        assert!(!probe(&http, port, "/health").await);
    }
}
