//! Integration tests for the deployment orchestrator state machine.
//!
//! Containers are faked with a no-op runtime; health probes hit real HTTP
//! ports (wiremock for healthy paths, an unused port for failing ones).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcpforge::config::DeployConfig;
use mcpforge::deployer::runtime::{ContainerRuntime, ContainerSpec, RuntimeError};
use mcpforge::deployer::{DeployRequest, DeploymentOrchestrator};
use mcpforge::events::{BusEvent, EventBus, ResourceKind};
use mcpforge::repositories::{BuildRecordRepository, DeploymentRepository};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::setup_test_db;

/// Runtime stub that always succeeds without touching any container engine.
struct NoopRuntime;

#[async_trait]
impl ContainerRuntime for NoopRuntime {
    async fn start(&self, _spec: &ContainerSpec) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn stop(&self, _name: &str, _drain_window: Duration) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn remove(&self, _name: &str) -> Result<(), RuntimeError> {
        Ok(())
    }
}

struct Harness {
    db: sea_orm::DatabaseConnection,
    bus: EventBus,
    orchestrator: DeploymentOrchestrator,
}

async fn setup(startup_deadline_seconds: u64) -> Harness {
    let db = setup_test_db().await.unwrap();
    let bus = EventBus::new(64);
    let config = DeployConfig {
        startup_deadline_seconds,
        poll_interval_seconds: 1,
        ..DeployConfig::default()
    };
    let orchestrator =
        DeploymentOrchestrator::new(db.clone(), bus.clone(), Arc::new(NoopRuntime), config);
    Harness {
        db,
        bus,
        orchestrator,
    }
}

/// Inserts a `built` build record to deploy from.
async fn seed_built_record(db: &sea_orm::DatabaseConnection) -> Uuid {
    let builds = BuildRecordRepository::new(db.clone());
    let record = builds
        .create(Uuid::new_v4(), "mcpforge/test-api".to_string(), "abc123def456".to_string())
        .await
        .unwrap();
    builds.mark_building(record.id).await.unwrap();
    builds
        .finish_success(record.id, "ok".to_string())
        .await
        .unwrap();
    record.id
}

async fn await_deployment_status(
    db: &sea_orm::DatabaseConnection,
    id: Uuid,
    wanted: &[&str],
) -> mcpforge::models::deployment::Model {
    let deployments = DeploymentRepository::new(db.clone());
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let deployment = deployments.get(id).await.unwrap();
        if wanted.contains(&deployment.status.as_str()) {
            return deployment;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {:?}, last status {}",
            wanted,
            deployment.status
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn deployment_passes_through_deploying_to_running() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let harness = setup(30).await;
    let build_id = seed_built_record(&harness.db).await;
    let mut events = harness.bus.subscribe();

    let deployment = harness
        .orchestrator
        .deploy(
            build_id,
            DeployRequest {
                port: Some(server.address().port() as i32),
                env_vars: Some(json!({"LOG_LEVEL": "info"})),
                ..DeployRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(deployment.status, "pending");

    let running = await_deployment_status(&harness.db, deployment.id, &["running", "failed"]).await;
    assert_eq!(running.status, "running");
    assert_eq!(running.health, "healthy");
    assert!(running.started_at.is_some());

    // `running` is only reachable through `deploying`.
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("running event published")
            .expect("bus open");
        if let BusEvent::StatusUpdate {
            resource_kind: ResourceKind::Deployment,
            status,
            ..
        } = event
        {
            let done = status == "running";
            seen.push(status);
            if done {
                break;
            }
        }
    }
    let deploying = seen.iter().position(|s| s == "deploying");
    let running_at = seen.iter().position(|s| s == "running");
    assert!(deploying.is_some(), "events: {:?}", seen);
    assert!(deploying < running_at, "events: {:?}", seen);

    harness.orchestrator.stop(deployment.id).await.unwrap();
    await_deployment_status(&harness.db, deployment.id, &["stopped"]).await;
}

#[tokio::test]
async fn unhealthy_startup_fails_with_health_check_timeout() {
    let harness = setup(1).await;
    let build_id = seed_built_record(&harness.db).await;

    // Nothing listens on this port, so every startup probe fails.
    let free_port = portpicker::pick_unused_port().expect("free port") as i32;

    let deployment = harness
        .orchestrator
        .deploy(
            build_id,
            DeployRequest {
                port: Some(free_port),
                ..DeployRequest::default()
            },
        )
        .await
        .unwrap();

    let failed = await_deployment_status(&harness.db, deployment.id, &["failed"]).await;
    assert!(
        failed
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("HEALTH_CHECK_TIMEOUT"),
        "error: {:?}",
        failed.error_message
    );
    assert!(failed.stopped_at.is_some());
}

#[tokio::test]
async fn stop_is_rejected_before_running() {
    let harness = setup(30).await;

    let deployments = DeploymentRepository::new(harness.db.clone());
    let deployment = deployments
        .create(mcpforge::repositories::deployment::NewDeployment {
            build_record_id: Uuid::new_v4(),
            container_name: "mcp-pending1".to_string(),
            image_ref: "mcpforge/test-api:abc123def456".to_string(),
            cpu_limit: 1.0,
            memory_limit_mb: 256,
            replica_count: 1,
            port: 9100,
            container_port: 8000,
            env_vars: None,
            health_check_path: "/health".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(deployment.status, "pending");

    let error = harness.orchestrator.stop(deployment.id).await.unwrap_err();
    assert_eq!(error.code, Box::from("CONFLICT"));

    let unchanged = deployments.get(deployment.id).await.unwrap();
    assert_eq!(unchanged.status, "pending");
}

#[tokio::test]
async fn scale_zero_rejected_and_deployment_stays_running() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let harness = setup(30).await;
    let build_id = seed_built_record(&harness.db).await;

    let deployment = harness
        .orchestrator
        .deploy(
            build_id,
            DeployRequest {
                port: Some(server.address().port() as i32),
                ..DeployRequest::default()
            },
        )
        .await
        .unwrap();
    let running = await_deployment_status(&harness.db, deployment.id, &["running", "failed"]).await;
    assert_eq!(running.status, "running");

    let error = harness
        .orchestrator
        .scale(deployment.id, 0)
        .await
        .unwrap_err();
    assert_eq!(error.code, Box::from("VALIDATION_FAILED"));

    let deployments = DeploymentRepository::new(harness.db.clone());
    let unchanged = deployments.get(deployment.id).await.unwrap();
    assert_eq!(unchanged.status, "running");
    assert_eq!(unchanged.replica_count, 1);

    harness.orchestrator.stop(deployment.id).await.unwrap();
    await_deployment_status(&harness.db, deployment.id, &["stopped"]).await;
}

#[tokio::test]
async fn concurrent_stop_and_scale_admit_exactly_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let harness = setup(30).await;
    let build_id = seed_built_record(&harness.db).await;

    let deployment = harness
        .orchestrator
        .deploy(
            build_id,
            DeployRequest {
                port: Some(server.address().port() as i32),
                ..DeployRequest::default()
            },
        )
        .await
        .unwrap();
    let running = await_deployment_status(&harness.db, deployment.id, &["running", "failed"]).await;
    assert_eq!(running.status, "running");

    // Both see `running` in the database, but the status check and the
    // transition are serialized per deployment, so one of the two must
    // lose and get a conflict.
    let (stop_result, scale_result) = tokio::join!(
        harness.orchestrator.stop(deployment.id),
        harness.orchestrator.scale(deployment.id, 2),
    );
    assert!(
        stop_result.is_ok() != scale_result.is_ok(),
        "stop: {:?}, scale: {:?}",
        stop_result.as_ref().map(|d| &d.status),
        scale_result.as_ref().map(|d| &d.status)
    );
    let scale_won = scale_result.is_ok();
    let loser = if scale_won {
        stop_result.unwrap_err()
    } else {
        scale_result.unwrap_err()
    };
    assert_eq!(loser.code, Box::from("CONFLICT"));

    if scale_won {
        let scaled =
            await_deployment_status(&harness.db, deployment.id, &["running", "failed"]).await;
        assert_eq!(scaled.status, "running");
        assert_eq!(scaled.replica_count, 2);
        harness.orchestrator.stop(deployment.id).await.unwrap();
    }
    await_deployment_status(&harness.db, deployment.id, &["stopped"]).await;
}

#[tokio::test]
async fn delete_requires_stopped_or_failed() {
    let harness = setup(1).await;
    let build_id = seed_built_record(&harness.db).await;

    let free_port = portpicker::pick_unused_port().expect("free port") as i32;
    let deployment = harness
        .orchestrator
        .deploy(
            build_id,
            DeployRequest {
                port: Some(free_port),
                ..DeployRequest::default()
            },
        )
        .await
        .unwrap();

    await_deployment_status(&harness.db, deployment.id, &["failed"]).await;

    harness.orchestrator.delete(deployment.id).await.unwrap();

    let deployments = DeploymentRepository::new(harness.db.clone());
    assert!(deployments.find_by_id(deployment.id).await.unwrap().is_none());
}

#[tokio::test]
async fn deploy_rejects_unbuilt_record() {
    let harness = setup(30).await;

    let builds = BuildRecordRepository::new(harness.db.clone());
    let record = builds
        .create(Uuid::new_v4(), "mcpforge/wip".to_string(), "tag123456789".to_string())
        .await
        .unwrap();

    let error = harness
        .orchestrator
        .deploy(record.id, DeployRequest::default())
        .await
        .unwrap_err();
    assert_eq!(error.code, Box::from("CONFLICT"));
}
