//! Integration tests for the generation and build pipeline.

use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use mcpforge::repositories::GenerationJobRepository;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{create_registration, normalize_single_endpoint, request_json, setup_test_app};

/// Polls a resource through the API until its status matches, or panics.
async fn await_status(app: &axum::Router, uri: &str, wanted: &[&str]) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let (status, body) = request_json(app, Method::GET, uri, None).await.unwrap();
        assert_eq!(status, StatusCode::OK, "poll failed: {}", body);
        let current = body["status"].as_str().unwrap().to_string();
        if wanted.contains(&current.as_str()) {
            return body;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {:?} on {}, last status {}",
            wanted,
            uri,
            current
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn generation_requires_active_registration() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    // Still pending: no normalization has run.
    let id = create_registration(&app, "inactive", "rest_generic", "none")
        .await
        .unwrap();

    let (status, body) = request_json(
        &app,
        Method::POST,
        &format!("/registrations/{}/generations", id),
        Some(json!({"language": "python", "framework": "fastapi"})),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn unknown_target_is_template_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "targets", "rest_generic", "none")
        .await
        .unwrap();
    normalize_single_endpoint(&app, id).await.unwrap();

    let (status, body) = request_json(
        &app,
        Method::POST,
        &format!("/registrations/{}/generations", id),
        Some(json!({"language": "cobol", "framework": "cics"})),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TEMPLATE_NOT_FOUND");
}

#[tokio::test]
async fn bearer_registration_renders_auth_injection() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "users-api", "rest_generic", "bearer_token")
        .await
        .unwrap();
    normalize_single_endpoint(&app, id).await.unwrap();

    let (status, job) = request_json(
        &app,
        Method::POST,
        &format!("/registrations/{}/generations", id),
        Some(json!({"language": "python", "framework": "fastapi"})),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(job["status"], "pending");

    let job_id = job["id"].as_str().unwrap();
    let ready = await_status(&app, &format!("/generations/{}", job_id), &["ready", "failed"]).await;
    assert_eq!(ready["status"], "ready", "log: {}", ready["generation_log"]);
    assert!(ready["file_count"].as_i64().unwrap() > 0);

    // A ready job always has a non-empty rendered tree.
    let artifact_path = ready["artifact_path"].as_str().unwrap();
    let entries: Vec<_> = std::fs::read_dir(artifact_path).unwrap().collect();
    assert!(!entries.is_empty());

    let server_source =
        std::fs::read_to_string(std::path::Path::new(artifact_path).join("server.py")).unwrap();
    assert!(server_source.contains("Authorization"));
    assert!(server_source.contains("Bearer"));
    assert!(server_source.contains("/health"));
}

#[tokio::test]
async fn duplicate_target_is_generation_in_progress() {
    let dir = tempfile::tempdir().unwrap();
    let (state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "busy-target", "rest_generic", "none")
        .await
        .unwrap();
    normalize_single_endpoint(&app, id).await.unwrap();

    // Seed an in-flight job directly so the window cannot close under us.
    let jobs = GenerationJobRepository::new(state.db.clone());
    jobs.create(
        id,
        "python".to_string(),
        "fastapi".to_string(),
        json!([]),
        None,
    )
    .await
    .unwrap();

    let (status, body) = request_json(
        &app,
        Method::POST,
        &format!("/registrations/{}/generations", id),
        Some(json!({"language": "python", "framework": "fastapi"})),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "GENERATION_IN_PROGRESS");
}

#[tokio::test]
async fn cancel_settles_orphaned_job_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let (state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "cancellable", "rest_generic", "none")
        .await
        .unwrap();

    let jobs = GenerationJobRepository::new(state.db.clone());
    let job = jobs
        .create(
            id,
            "python".to_string(),
            "fastapi".to_string(),
            json!([]),
            None,
        )
        .await
        .unwrap();

    let (status, body) = request_json(
        &app,
        Method::POST,
        &format!("/generations/{}/cancel", job.id),
        None,
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error_message"], "Cancelled");
}

#[tokio::test]
async fn delete_removes_settled_job_and_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "disposable", "rest_generic", "none")
        .await
        .unwrap();
    normalize_single_endpoint(&app, id).await.unwrap();

    let (_, job) = request_json(
        &app,
        Method::POST,
        &format!("/registrations/{}/generations", id),
        Some(json!({"language": "python", "framework": "fastapi"})),
    )
    .await
    .unwrap();
    let job_id = job["id"].as_str().unwrap().to_string();
    let ready = await_status(&app, &format!("/generations/{}", job_id), &["ready", "failed"]).await;
    assert_eq!(ready["status"], "ready");
    let artifact_path = ready["artifact_path"].as_str().unwrap().to_string();

    let (status, _) = request_json(
        &app,
        Method::DELETE,
        &format!("/generations/{}", job_id),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = request_json(&app, Method::GET, &format!("/generations/{}", job_id), None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!std::path::Path::new(&artifact_path).exists());
}

#[tokio::test]
async fn delete_rejects_in_flight_job() {
    let dir = tempfile::tempdir().unwrap();
    let (state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "sticky", "rest_generic", "none")
        .await
        .unwrap();

    let jobs = GenerationJobRepository::new(state.db.clone());
    let job = jobs
        .create(
            id,
            "python".to_string(),
            "fastapi".to_string(),
            json!([]),
            None,
        )
        .await
        .unwrap();

    let (status, body) = request_json(
        &app,
        Method::DELETE,
        &format!("/generations/{}", job.id),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn build_pipeline_from_ready_job() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "buildable", "rest_generic", "none")
        .await
        .unwrap();
    normalize_single_endpoint(&app, id).await.unwrap();

    let (_, job) = request_json(
        &app,
        Method::POST,
        &format!("/registrations/{}/generations", id),
        Some(json!({"language": "node", "framework": "express"})),
    )
    .await
    .unwrap();
    let job_id = job["id"].as_str().unwrap().to_string();
    let ready = await_status(&app, &format!("/generations/{}", job_id), &["ready", "failed"]).await;
    assert_eq!(ready["status"], "ready");

    // The build command is `true`, so the build succeeds without docker.
    let (status, build) = request_json(
        &app,
        Method::POST,
        &format!("/generations/{}/build", job_id),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);

    let build_id = build["id"].as_str().unwrap().to_string();
    let built = await_status(&app, &format!("/builds/{}", build_id), &["built", "failed"]).await;
    assert_eq!(built["status"], "built");

    // The tag is the tree fingerprint prefix.
    assert_eq!(built["image_tag"].as_str().unwrap().len(), 12);
    assert!(
        built["image_ref"]
            .as_str()
            .unwrap()
            .starts_with("mcpforge/")
    );

    // Builds are 1:1 per job.
    let (status, body) = request_json(
        &app,
        Method::POST,
        &format!("/generations/{}/build", job_id),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn build_rejects_non_ready_job() {
    let dir = tempfile::tempdir().unwrap();
    let (state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let jobs = GenerationJobRepository::new(state.db.clone());
    let job = jobs
        .create(
            Uuid::new_v4(),
            "python".to_string(),
            "fastapi".to_string(),
            json!([]),
            None,
        )
        .await
        .unwrap();

    let (status, body) = request_json(
        &app,
        Method::POST,
        &format!("/generations/{}/build", job.id),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn event_stream_rejects_unknown_resource_type() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let (status, body) = request_json(
        &app,
        Method::GET,
        &format!("/events/pipeline/{}", Uuid::new_v4()),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}
