//! Test utilities for integration tests.
//!
//! Provides an in-memory SQLite database with migrations applied and a
//! fully wired application (state + router) for exercising handlers with
//! `tower::ServiceExt::oneshot`.

use anyhow::Result;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use serde_json::Value;
use tower::ServiceExt;

use mcpforge::config::AppConfig;
use mcpforge::server::{AppState, create_app, create_test_app_state};

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// The pool is pinned to one connection: each pooled connection to
/// `sqlite::memory:` would otherwise open its own empty database, and
/// pipeline tasks run on spawned tasks sharing the pool.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    // SQLite does not enforce our Postgres foreign key semantics; disable FK
    // checks so fixture rows can be inserted without full relation graphs.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Like [`setup_test_db`], but with SQLite foreign key enforcement left on,
/// for tests that exercise the cascade behavior the migrations declare.
#[allow(dead_code)]
pub async fn setup_test_db_with_fk() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = ON".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Builds a wired application against a fresh in-memory database.
///
/// The artifact root points at a caller-owned temp directory and the build
/// command is `true`, so generation and build complete without external
/// tooling.
#[allow(dead_code)]
pub async fn setup_test_app(artifact_root: &str) -> Result<(AppState, Router)> {
    let mut config = AppConfig::default();
    config.generator.artifact_root = artifact_root.to_string();
    config.build.builder_command = "true".to_string();
    config.crypto_key = Some(vec![7u8; 32]);

    let db = setup_test_db().await?;
    let state = create_test_app_state(config, db);
    let app = create_app(state.clone());
    Ok((state, app))
}

/// Sends one request and returns the status plus parsed JSON body.
#[allow(dead_code)]
pub async fn request_json(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok((status, json))
}

/// Registers an API and returns its id.
#[allow(dead_code)]
pub async fn create_registration(
    app: &Router,
    name: &str,
    api_kind: &str,
    auth_type: &str,
) -> Result<uuid::Uuid> {
    let (status, body) = request_json(
        app,
        Method::POST,
        "/registrations",
        Some(serde_json::json!({
            "owner_id": uuid::Uuid::new_v4(),
            "name": name,
            "base_url": "https://api.example.com",
            "api_kind": api_kind,
            "auth_type": auth_type
        })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::CREATED, "create failed: {}", body);
    Ok(body["id"].as_str().unwrap().parse()?)
}

/// Normalizes a registration with a one-endpoint manual document.
#[allow(dead_code)]
pub async fn normalize_single_endpoint(app: &Router, registration_id: uuid::Uuid) -> Result<()> {
    let (status, body) = request_json(
        app,
        Method::POST,
        &format!("/registrations/{}/normalize", registration_id),
        Some(serde_json::json!({
            "document": serde_json::json!([
                {"method": "GET", "path": "/users/{id}", "name": "getUser"}
            ])
            .to_string()
        })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::OK, "normalize failed: {}", body);
    Ok(())
}
