//! Integration tests for registration and normalization endpoints.

use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{create_registration, request_json, setup_test_app};

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let (status, body) = request_json(&app, Method::GET, "/health", None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn create_and_fetch_registration() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let owner_id = Uuid::new_v4();
    let (status, body) = request_json(
        &app,
        Method::POST,
        "/registrations",
        Some(json!({
            "owner_id": owner_id,
            "name": "petstore",
            "base_url": "https://petstore.example.com",
            "api_kind": "rest_openapi"
        })),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "petstore");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["auth_type"], "none");
    assert_eq!(body["has_credentials"], false);

    let id = body["id"].as_str().unwrap();
    let (status, fetched) = request_json(
        &app,
        Method::GET,
        &format!("/registrations/{}", id),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], body["id"]);
}

#[tokio::test]
async fn create_rejects_invalid_fields() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let (status, body) = request_json(
        &app,
        Method::POST,
        "/registrations",
        Some(json!({
            "owner_id": Uuid::new_v4(),
            "name": "",
            "base_url": "ftp://nope.example.com",
            "api_kind": "wsdl"
        })),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["details"]["name"].is_string());
    assert!(body["details"]["base_url"].is_string());
    assert!(body["details"]["api_kind"].is_string());
}

#[tokio::test]
async fn duplicate_owner_name_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let owner_id = Uuid::new_v4();
    let payload = json!({
        "owner_id": owner_id,
        "name": "petstore",
        "base_url": "https://petstore.example.com",
        "api_kind": "rest_generic"
    });

    let (status, _) = request_json(&app, Method::POST, "/registrations", Some(payload.clone()))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = request_json(&app, Method::POST, "/registrations", Some(payload))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn credentials_are_stored_encrypted() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let (status, body) = request_json(
        &app,
        Method::POST,
        "/registrations",
        Some(json!({
            "owner_id": Uuid::new_v4(),
            "name": "secured",
            "base_url": "https://secure.example.com",
            "api_kind": "rest_generic",
            "auth_type": "bearer",
            "credentials": {"token": "s3cret"}
        })),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["has_credentials"], true);
    // The plaintext never appears in the response.
    assert!(!body.to_string().contains("s3cret"));
}

#[tokio::test]
async fn delete_registration_then_404() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "ephemeral", "rest_generic", "none")
        .await
        .unwrap();

    let (status, _) = request_json(
        &app,
        Method::DELETE,
        &format!("/registrations/{}", id),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = request_json(
        &app,
        Method::GET,
        &format!("/registrations/{}", id),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn normalization_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "users-api", "rest_generic", "api_key")
        .await
        .unwrap();

    let document = json!([
        {"method": "GET", "path": "/users/{id}", "name": "getUser"},
        {"method": "POST", "path": "/users", "name": "createUser"}
    ])
    .to_string();

    let normalize = |app: axum::Router, document: String| async move {
        request_json(
            &app,
            Method::POST,
            &format!("/registrations/{}/normalize", id),
            Some(json!({"document": document})),
        )
        .await
        .unwrap()
    };

    let (status, body) = normalize(app.clone(), document.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoint_count"], 2);
    assert_eq!(body["registration"]["status"], "active");

    let endpoint_ids = |body: &serde_json::Value| {
        let mut ids: Vec<String> = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["id"].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        ids
    };

    let (_, first) = request_json(
        &app,
        Method::GET,
        &format!("/registrations/{}/endpoints", id),
        None,
    )
    .await
    .unwrap();
    let first_ids = endpoint_ids(&first);
    assert_eq!(first_ids.len(), 2);

    // Re-normalizing the same document keeps the same identities.
    let (status, _) = normalize(app.clone(), document).await;
    assert_eq!(status, StatusCode::OK);

    let (_, second) = request_json(
        &app,
        Method::GET,
        &format!("/registrations/{}/endpoints", id),
        None,
    )
    .await
    .unwrap();
    assert_eq!(endpoint_ids(&second), first_ids);
}

#[tokio::test]
async fn invalid_document_marks_validation_failed() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "broken", "rest_generic", "none")
        .await
        .unwrap();

    let (status, body) = request_json(
        &app,
        Method::POST,
        &format!("/registrations/{}/normalize", id),
        Some(json!({"document": "not json at all"})),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SPEC_INVALID");

    let (_, registration) = request_json(
        &app,
        Method::GET,
        &format!("/registrations/{}", id),
        None,
    )
    .await
    .unwrap();
    assert_eq!(registration["status"], "validation_failed");
    assert!(registration["validation_error"].is_string());
}

#[tokio::test]
async fn duplicate_operations_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "dupes", "rest_generic", "none")
        .await
        .unwrap();

    let (status, body) = request_json(
        &app,
        Method::POST,
        &format!("/registrations/{}/normalize", id),
        Some(json!({
            "document": json!([
                {"method": "GET", "path": "/things"},
                {"method": "get", "path": "/things"}
            ])
            .to_string()
        })),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SPEC_INVALID");
}

#[tokio::test]
async fn endpoint_can_be_deleted_individually() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "prunable", "rest_generic", "none")
        .await
        .unwrap();

    let (status, _) = request_json(
        &app,
        Method::POST,
        &format!("/registrations/{}/normalize", id),
        Some(json!({
            "document": json!([
                {"method": "GET", "path": "/keep"},
                {"method": "GET", "path": "/drop"}
            ])
            .to_string()
        })),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = request_json(
        &app,
        Method::GET,
        &format!("/registrations/{}/endpoints", id),
        None,
    )
    .await
    .unwrap();
    let doomed = listing["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["path"] == "/drop")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, _) = request_json(&app, Method::DELETE, &format!("/endpoints/{}", doomed), None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = request_json(&app, Method::GET, &format!("/endpoints/{}", doomed), None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (_, remaining) = request_json(
        &app,
        Method::GET,
        &format!("/registrations/{}/endpoints", id),
        None,
    )
    .await
    .unwrap();
    assert_eq!(remaining["total"], 1);
}

#[tokio::test]
async fn endpoint_listing_supports_method_filter() {
    let dir = tempfile::tempdir().unwrap();
    let (_state, app) = setup_test_app(dir.path().to_str().unwrap()).await.unwrap();

    let id = create_registration(&app, "filterable", "rest_generic", "none")
        .await
        .unwrap();

    let (status, _) = request_json(
        &app,
        Method::POST,
        &format!("/registrations/{}/normalize", id),
        Some(json!({
            "document": json!([
                {"method": "GET", "path": "/a"},
                {"method": "GET", "path": "/b"},
                {"method": "POST", "path": "/a"}
            ])
            .to_string()
        })),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request_json(
        &app,
        Method::GET,
        &format!("/registrations/{}/endpoints?method=get", id),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["page"], 1);
}
