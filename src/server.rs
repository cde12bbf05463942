//! # Server Configuration
//!
//! This module contains the server setup and configuration for the
//! mcpforge API: shared state construction, routing, OpenAPI documentation
//! and the serve loop.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::builder::{BuildService, ProcessImageBuilder};
use crate::config::AppConfig;
use crate::crypto::{CryptoError, CryptoKey};
use crate::deployer::DeploymentOrchestrator;
use crate::deployer::runtime::ProcessContainerRuntime;
use crate::events::EventBus;
use crate::generator::GenerationEngine;
use crate::generator::registry::TemplateRegistry;
use crate::handlers;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub bus: EventBus,
    pub crypto_key: Option<Arc<CryptoKey>>,
    pub engine: GenerationEngine,
    pub build_service: BuildService,
    pub orchestrator: DeploymentOrchestrator,
}

/// Builds the application state, wiring every pipeline stage to the shared
/// database connection and event bus.
pub fn build_state(config: AppConfig, db: DatabaseConnection) -> Result<AppState, CryptoError> {
    let bus = EventBus::new(config.event_bus.capacity);

    let crypto_key = config
        .crypto_key
        .as_ref()
        .map(|bytes| CryptoKey::new(bytes.clone()).map(Arc::new))
        .transpose()?;
    let engine_key = config
        .crypto_key
        .as_ref()
        .map(|bytes| CryptoKey::new(bytes.clone()))
        .transpose()?;

    let engine = GenerationEngine::new(
        db.clone(),
        bus.clone(),
        TemplateRegistry::with_builtin_targets(),
        config.generator.clone(),
        engine_key,
    );

    let builder = Arc::new(ProcessImageBuilder::new(
        config.build.builder_command.clone(),
        config.build.timeout_seconds,
    ));
    let build_service = BuildService::new(db.clone(), bus.clone(), builder, config.build.clone());

    let runtime = Arc::new(ProcessContainerRuntime::new(
        config.deploy.runtime_command.clone(),
    ));
    let orchestrator =
        DeploymentOrchestrator::new(db.clone(), bus.clone(), runtime, config.deploy.clone());

    Ok(AppState {
        db,
        config: Arc::new(config),
        bus,
        crypto_key,
        engine,
        build_service,
        orchestrator,
    })
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/registrations",
            post(handlers::registrations::create_registration)
                .get(handlers::registrations::list_registrations),
        )
        .route(
            "/registrations/{id}",
            get(handlers::registrations::get_registration)
                .delete(handlers::registrations::delete_registration),
        )
        .route(
            "/registrations/{id}/normalize",
            post(handlers::registrations::normalize_registration),
        )
        .route(
            "/registrations/{id}/endpoints",
            get(handlers::endpoints::list_endpoints),
        )
        .route(
            "/endpoints/{id}",
            get(handlers::endpoints::get_endpoint).delete(handlers::endpoints::delete_endpoint),
        )
        .route(
            "/registrations/{id}/generations",
            post(handlers::generations::submit_generation)
                .get(handlers::generations::list_generations),
        )
        .route(
            "/generations/{id}",
            get(handlers::generations::get_generation)
                .delete(handlers::generations::delete_generation),
        )
        .route(
            "/generations/{id}/cancel",
            post(handlers::generations::cancel_generation),
        )
        .route("/generations/{id}/build", post(handlers::builds::submit_build))
        .route("/builds/{id}", get(handlers::builds::get_build))
        .route("/builds/{id}/cancel", post(handlers::builds::cancel_build))
        .route(
            "/builds/{id}/deployments",
            post(handlers::deployments::create_deployment),
        )
        .route(
            "/deployments",
            get(handlers::deployments::list_deployments),
        )
        .route(
            "/deployments/{id}",
            get(handlers::deployments::get_deployment)
                .delete(handlers::deployments::delete_deployment),
        )
        .route(
            "/deployments/{id}/scale",
            post(handlers::deployments::scale_deployment),
        )
        .route(
            "/deployments/{id}/stop",
            post(handlers::deployments::stop_deployment),
        )
        .route(
            "/events/{resource_type}/{resource_id}",
            get(handlers::events::stream_events),
        )
        .layer(axum::middleware::from_fn(
            crate::telemetry::request_context,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    use migration::{Migrator, MigratorTrait};
    Migrator::up(&db, None).await?;

    let state = build_state(config, db)?;

    // Re-attach health polling to deployments that survived a restart.
    state.orchestrator.resume().await?;

    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

/// Creates application state backed by the given connection, for tests.
pub fn create_test_app_state(config: AppConfig, db: DatabaseConnection) -> AppState {
    build_state(config, db).expect("test state construction")
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::registrations::create_registration,
        crate::handlers::registrations::list_registrations,
        crate::handlers::registrations::get_registration,
        crate::handlers::registrations::delete_registration,
        crate::handlers::registrations::normalize_registration,
        crate::handlers::endpoints::list_endpoints,
        crate::handlers::endpoints::get_endpoint,
        crate::handlers::endpoints::delete_endpoint,
        crate::handlers::generations::submit_generation,
        crate::handlers::generations::list_generations,
        crate::handlers::generations::get_generation,
        crate::handlers::generations::cancel_generation,
        crate::handlers::generations::delete_generation,
        crate::handlers::builds::submit_build,
        crate::handlers::builds::get_build,
        crate::handlers::builds::cancel_build,
        crate::handlers::deployments::create_deployment,
        crate::handlers::deployments::list_deployments,
        crate::handlers::deployments::get_deployment,
        crate::handlers::deployments::scale_deployment,
        crate::handlers::deployments::stop_deployment,
        crate::handlers::deployments::delete_deployment,
        crate::handlers::events::stream_events,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::HealthStatus,
            crate::error::ApiError,
            crate::handlers::registrations::CreateRegistrationRequest,
            crate::handlers::registrations::NormalizeRequest,
            crate::handlers::registrations::RegistrationInfo,
            crate::handlers::registrations::NormalizeResponse,
            crate::handlers::endpoints::EndpointInfo,
            crate::handlers::generations::SubmitGenerationRequest,
            crate::handlers::generations::GenerationJobInfo,
            crate::handlers::builds::BuildInfo,
            crate::handlers::deployments::CreateDeploymentRequest,
            crate::handlers::deployments::ScaleRequest,
            crate::handlers::deployments::DeploymentInfo,
            crate::crypto::AuthCredentials,
        )
    ),
    info(
        title = "mcpforge API",
        description = "API for turning upstream API specifications into deployed MCP servers",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
