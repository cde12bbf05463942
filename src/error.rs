//! # Error Handling
//!
//! This module provides unified error handling for the mcpforge API,
//! implementing a consistent problem+json response format with trace ID
//! propagation. Synchronous validation failures surface here directly;
//! pipeline stage failures are recorded on their owning records and only
//! reach this type through status queries.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Error, Serialize, ToSchema)]
#[error("{code}: {message}")]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the active tracing span (falls back to
    /// a generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Standard error types with predefined status codes.
///
/// Codes follow the pipeline taxonomy: validation and uniqueness errors are
/// returned synchronously at submission time; stage-execution codes appear in
/// status queries and bus events once work has been accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorType {
    #[error("Specification document is invalid")]
    SpecInvalid,
    #[error("A generation job for this target is already in flight")]
    GenerationInProgress,
    #[error("No template set registered for this language/framework")]
    TemplateNotFound,
    #[error("Template rendering failed")]
    RenderError,
    #[error("Specification exceeds generation budget")]
    SpecIncompatible,
    #[error("Build exceeded the configured timeout")]
    BuildTimeout,
    #[error("Build failed")]
    BuildFailed,
    #[error("Deployment did not become healthy before the startup deadline")]
    HealthCheckTimeout,
    #[error("Deployment failed")]
    DeployFailed,
    #[error("Stage worker pool is saturated")]
    Busy,
    #[error("Operation was cancelled")]
    Cancelled,
    #[error("Not Found")]
    NotFound,
    #[error("Conflict")]
    Conflict,
    #[error("Bad Request")]
    BadRequest,
    #[error("Internal Server Error")]
    InternalServerError,
    #[error("Service Unavailable")]
    ServiceUnavailable,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::SpecInvalid | ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::SpecIncompatible => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorType::GenerationInProgress | ErrorType::Conflict => StatusCode::CONFLICT,
            ErrorType::TemplateNotFound | ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::Busy => StatusCode::TOO_MANY_REQUESTS,
            ErrorType::Cancelled => StatusCode::CONFLICT,
            ErrorType::RenderError
            | ErrorType::BuildTimeout
            | ErrorType::BuildFailed
            | ErrorType::HealthCheckTimeout
            | ErrorType::DeployFailed
            | ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error code string for this error type (SCREAMING_SNAKE_CASE)
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::SpecInvalid => "SPEC_INVALID",
            ErrorType::GenerationInProgress => "GENERATION_IN_PROGRESS",
            ErrorType::TemplateNotFound => "TEMPLATE_NOT_FOUND",
            ErrorType::RenderError => "RENDER_ERROR",
            ErrorType::SpecIncompatible => "SPEC_INCOMPATIBLE",
            ErrorType::BuildTimeout => "BUILD_TIMEOUT",
            ErrorType::BuildFailed => "BUILD_FAILED",
            ErrorType::HealthCheckTimeout => "HEALTH_CHECK_TIMEOUT",
            ErrorType::DeployFailed => "DEPLOY_FAILED",
            ErrorType::Busy => "BUSY",
            ErrorType::Cancelled => "CANCELLED",
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::Conflict => "CONFLICT",
            ErrorType::BadRequest => "VALIDATION_FAILED",
            ErrorType::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        if code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str) {
            return true;
        }
    }

    false
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        Self::new(
            error_type.status_code(),
            error_type.error_code(),
            &error_type.to_string(),
        )
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<crate::crypto::CryptoError> for ApiError {
    fn from(error: crate::crypto::CryptoError) -> Self {
        tracing::error!("Crypto error: {}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Credential handling failed",
        )
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

/// Create a not-found error for a named resource
pub fn not_found(resource: &str) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        &format!("{} not found", resource),
    )
}

/// Create a backpressure error with a retry hint
pub fn busy(stage: &str, retry_after: u64) -> ApiError {
    ApiError::new(
        StatusCode::TOO_MANY_REQUESTS,
        "BUSY",
        &format!("{} worker pool is saturated, retry later", stage),
    )
    .with_retry_after(retry_after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "SPEC_INVALID", "bad document");

        assert_eq!(error.code, Box::from("SPEC_INVALID"));
        assert_eq!(error.message, Box::from("bad document"));
        assert_eq!(error.details, None);
        assert_eq!(error.retry_after, None);
        assert!(error.trace_id.is_some());
    }

    #[test]
    fn test_api_error_displays_code_and_message() {
        let error = ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists");
        assert_eq!(error.to_string(), "CONFLICT: resource already exists");

        // `?` conversion into boxed errors relies on the Error impl.
        let boxed: Box<dyn std::error::Error> = Box::new(error);
        assert!(boxed.to_string().starts_with("CONFLICT"));
    }

    #[test]
    fn test_taxonomy_status_mapping() {
        let cases = [
            (ErrorType::SpecInvalid, StatusCode::BAD_REQUEST, "SPEC_INVALID"),
            (
                ErrorType::GenerationInProgress,
                StatusCode::CONFLICT,
                "GENERATION_IN_PROGRESS",
            ),
            (
                ErrorType::TemplateNotFound,
                StatusCode::NOT_FOUND,
                "TEMPLATE_NOT_FOUND",
            ),
            (
                ErrorType::SpecIncompatible,
                StatusCode::UNPROCESSABLE_ENTITY,
                "SPEC_INCOMPATIBLE",
            ),
            (ErrorType::Busy, StatusCode::TOO_MANY_REQUESTS, "BUSY"),
            (ErrorType::Cancelled, StatusCode::CONFLICT, "CANCELLED"),
            (ErrorType::NotFound, StatusCode::NOT_FOUND, "NOT_FOUND"),
            (ErrorType::Conflict, StatusCode::CONFLICT, "CONFLICT"),
        ];

        for (error_type, status, code) in cases {
            let api_error: ApiError = error_type.into();
            assert_eq!(api_error.status, status, "status for {:?}", error_type);
            assert_eq!(api_error.code, Box::from(code), "code for {:?}", error_type);
        }
    }

    #[test]
    fn test_busy_carries_retry_after_header() {
        let error = busy("generation", 5);
        assert_eq!(error.retry_after, Some(5));

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "5");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_validation_error_with_details() {
        let field_errors = json!({
            "base_url": "must be an http(s) URL"
        });

        let error = validation_error("Validation failed", field_errors.clone());

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.details, Some(Box::new(field_errors)));
    }

    #[test]
    fn test_database_error_mapping() {
        let db_error = sea_orm::DbErr::RecordNotFound("deployment".to_string());
        let api_error: ApiError = db_error.into();

        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert_eq!(api_error.code, Box::from("NOT_FOUND"));
        assert!(api_error.message.contains("deployment"));
    }

    #[test]
    fn test_from_anyhow() {
        let api_error: ApiError = anyhow::anyhow!("boom").into();

        assert_eq!(api_error.code, Box::from("INTERNAL_SERVER_ERROR"));
        assert_eq!(api_error.message, Box::from("An internal error occurred"));
    }

    #[test]
    fn test_status_code_preservation() {
        let error: ApiError = ErrorType::GenerationInProgress.into();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
