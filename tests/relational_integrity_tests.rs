//! Integration tests for the cascade rules declared by the migrations.
//!
//! These run with SQLite foreign key enforcement on: deleting a
//! registration must take its endpoints, jobs and build records with it,
//! while deployments deliberately carry no foreign key and outlive the
//! pipeline rows that produced them.

use serde_json::json;
use uuid::Uuid;

use mcpforge::repositories::api_endpoint::NormalizedEndpoint;
use mcpforge::repositories::api_registration::NewRegistration;
use mcpforge::repositories::deployment::NewDeployment;
use mcpforge::repositories::{
    ApiEndpointRepository, ApiRegistrationRepository, BuildRecordRepository, DeploymentRepository,
    GenerationJobRepository,
};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::setup_test_db_with_fk;

async fn seed_registration(db: &sea_orm::DatabaseConnection) -> Uuid {
    let registrations = ApiRegistrationRepository::new(db.clone());
    let registration = registrations
        .create(NewRegistration {
            owner_id: Uuid::new_v4(),
            name: "weather-api".to_string(),
            base_url: "https://api.example.com".to_string(),
            api_kind: "rest_generic".to_string(),
            auth_type: "none".to_string(),
            auth_blob: None,
        })
        .await
        .unwrap();
    registration.id
}

fn sample_endpoint(name: &str, path: &str) -> NormalizedEndpoint {
    NormalizedEndpoint {
        id: Uuid::new_v4(),
        name: name.to_string(),
        method: "GET".to_string(),
        path: path.to_string(),
        request_schema: None,
        response_schema: None,
        query_params: None,
        path_params: None,
        headers: None,
        requires_auth: false,
        rate_limit: None,
        timeout_seconds: 30,
        cache_ttl_seconds: None,
        content_type: "application/json".to_string(),
    }
}

#[tokio::test]
async fn orphan_endpoint_insert_is_rejected() {
    let db = setup_test_db_with_fk().await.unwrap();
    let endpoints = ApiEndpointRepository::new(db.clone());

    // No such registration, so the insert must fail at the database.
    let result = endpoints
        .replace_for_registration(Uuid::new_v4(), vec![sample_endpoint("getUser", "/users")])
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn registration_delete_cascades_through_pipeline_rows() {
    let db = setup_test_db_with_fk().await.unwrap();
    let registration_id = seed_registration(&db).await;

    let endpoints = ApiEndpointRepository::new(db.clone());
    let endpoint = sample_endpoint("getForecast", "/forecast");
    let endpoint_id = endpoint.id;
    endpoints
        .replace_for_registration(registration_id, vec![endpoint])
        .await
        .unwrap();

    let jobs = GenerationJobRepository::new(db.clone());
    let job = jobs
        .create(
            registration_id,
            "python".to_string(),
            "fastapi".to_string(),
            json!([]),
            None,
        )
        .await
        .unwrap();

    let builds = BuildRecordRepository::new(db.clone());
    let record = builds
        .create(job.id, "mcpforge/weather-api".to_string(), "abc123def456".to_string())
        .await
        .unwrap();

    let registrations = ApiRegistrationRepository::new(db.clone());
    registrations.delete(registration_id).await.unwrap();

    assert!(endpoints.find_by_id(endpoint_id).await.unwrap().is_none());
    assert!(jobs.find_by_id(job.id).await.unwrap().is_none());
    assert!(builds.find_by_id(record.id).await.unwrap().is_none());
}

#[tokio::test]
async fn job_delete_cascades_build_record_but_spares_deployment() {
    let db = setup_test_db_with_fk().await.unwrap();
    let registration_id = seed_registration(&db).await;

    let jobs = GenerationJobRepository::new(db.clone());
    let job = jobs
        .create(
            registration_id,
            "python".to_string(),
            "fastapi".to_string(),
            json!([]),
            None,
        )
        .await
        .unwrap();

    let builds = BuildRecordRepository::new(db.clone());
    let record = builds
        .create(job.id, "mcpforge/weather-api".to_string(), "abc123def456".to_string())
        .await
        .unwrap();

    let deployments = DeploymentRepository::new(db.clone());
    let deployment = deployments
        .create(NewDeployment {
            build_record_id: record.id,
            container_name: "mcp-cascade1".to_string(),
            image_ref: "mcpforge/weather-api:abc123def456".to_string(),
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

    jobs.delete(job.id).await.unwrap();

    assert!(builds.find_by_id(record.id).await.unwrap().is_none());

    // Deployments reference builds by value only, so the record stays and
    // keeps its image reference for auditing.
    let survivor = deployments.get(deployment.id).await.unwrap();
    assert_eq!(survivor.image_ref, "mcpforge/weather-api:abc123def456");
}
