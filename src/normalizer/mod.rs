//! # Specification Normalizer
//!
//! Parses heterogeneous API descriptions (OpenAPI documents, GraphQL SDL,
//! manual endpoint lists) into the canonical endpoint model. Normalization
//! is synchronous: validation failures are returned to the caller directly,
//! and the registration's lifecycle status records the outcome either way.
//!
//! Endpoint identities are deterministic (UUIDv5 of the registration id,
//! method and path), so re-normalizing the same document yields the same
//! endpoint set with the same ids.

mod graphql;
mod manual;
mod openapi;

use sea_orm::DatabaseConnection;
use thiserror::Error;
use uuid::Uuid;

use crate::config::NormalizerConfig;
use crate::error::{ApiError, ErrorType};
use crate::events::{BusEvent, EventBus, ResourceKind};
use crate::models::api_registration::Model as RegistrationModel;
use crate::repositories::api_endpoint::NormalizedEndpoint;
use crate::repositories::{ApiEndpointRepository, ApiRegistrationRepository};

pub const SUPPORTED_METHODS: &[&str] =
    &["get", "post", "put", "patch", "delete", "head", "options"];

pub const DEFAULT_TIMEOUT_SECONDS: i32 = 30;
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Errors produced while normalizing a source document.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("document exceeds maximum size of {max_bytes} bytes ({actual} bytes)")]
    TooLarge { max_bytes: usize, actual: usize },
    #[error("document could not be parsed: {0}")]
    Parse(String),
    #[error("duplicate operation: {method} {path}")]
    DuplicateOperation { method: String, path: String },
    #[error("invalid endpoint definition: {0}")]
    InvalidEndpoint(String),
    #[error("schema declares {actual} fields, exceeding the budget of {max_fields}")]
    TooManyFields { max_fields: usize, actual: usize },
    #[error("unsupported api kind: {0}")]
    UnsupportedKind(String),
}

impl NormalizeError {
    /// The taxonomy code this error surfaces as.
    pub fn error_type(&self) -> ErrorType {
        match self {
            NormalizeError::TooManyFields { .. } => ErrorType::SpecIncompatible,
            _ => ErrorType::SpecInvalid,
        }
    }
}

impl From<NormalizeError> for ApiError {
    fn from(error: NormalizeError) -> Self {
        let error_type = error.error_type();
        ApiError::new(
            error_type.status_code(),
            error_type.error_code(),
            &error.to_string(),
        )
    }
}

/// Deterministic endpoint identity for a (registration, method, path) triple.
pub fn endpoint_id(registration_id: Uuid, method: &str, path: &str) -> Uuid {
    let name = format!("{} {}", method, path);
    Uuid::new_v5(&registration_id, name.as_bytes())
}

/// Stateless normalizer configured with document budgets.
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Parse and validate a source document against its registration.
    ///
    /// Pure: no database access, no status side effects.
    pub fn normalize(
        &self,
        registration: &RegistrationModel,
        document: &str,
    ) -> Result<Vec<NormalizedEndpoint>, NormalizeError> {
        if document.len() > self.config.max_spec_bytes {
            return Err(NormalizeError::TooLarge {
                max_bytes: self.config.max_spec_bytes,
                actual: document.len(),
            });
        }

        let endpoints = match registration.api_kind.as_str() {
            "rest_openapi" => openapi::parse(registration, document)?,
            "graphql" => graphql::parse(registration, document, self.config.max_graphql_fields)?,
            "rest_generic" | "custom" => manual::parse(registration, document)?,
            other => return Err(NormalizeError::UnsupportedKind(other.to_string())),
        };

        check_duplicates(&endpoints)?;

        Ok(endpoints)
    }
}

fn check_duplicates(endpoints: &[NormalizedEndpoint]) -> Result<(), NormalizeError> {
    let mut seen = std::collections::HashSet::new();
    for endpoint in endpoints {
        if !seen.insert((endpoint.method.as_str(), endpoint.path.as_str())) {
            return Err(NormalizeError::DuplicateOperation {
                method: endpoint.method.clone(),
                path: endpoint.path.clone(),
            });
        }
    }
    Ok(())
}

/// Whether calls to an operation need upstream credentials.
///
/// A registration without an auth type never requires auth; otherwise an
/// operation opts out only by explicitly declaring an empty security set.
pub(crate) fn infer_requires_auth(
    registration: &RegistrationModel,
    explicit_opt_out: bool,
) -> bool {
    registration.auth_type != "none" && !explicit_opt_out
}

/// Run normalization against a registration, persisting the endpoint set and
/// recording the validation outcome on the registration.
///
/// Publishes `status_update` events for the registration on entry and exit.
pub async fn run_normalization(
    db: &DatabaseConnection,
    bus: &EventBus,
    config: &NormalizerConfig,
    registration_id: Uuid,
    document: &str,
) -> Result<(RegistrationModel, usize), ApiError> {
    let registrations = ApiRegistrationRepository::new(db.clone());
    let endpoints_repo = ApiEndpointRepository::new(db.clone());

    let registration = registrations.mark_validating(registration_id).await?;
    bus.publish(BusEvent::status(
        ResourceKind::Registration,
        registration_id,
        "validating",
    ));

    let normalizer = Normalizer::new(config.clone());
    match normalizer.normalize(&registration, document) {
        Ok(endpoints) => {
            let count = endpoints_repo
                .replace_for_registration(registration_id, endpoints)
                .await?;
            let updated = registrations
                .record_validation(registration_id, true, None)
                .await?;
            bus.publish(BusEvent::status(
                ResourceKind::Registration,
                registration_id,
                "active",
            ));
            Ok((updated, count))
        }
        Err(error) => {
            let message = error.to_string();
            registrations
                .record_validation(registration_id, false, Some(message.clone()))
                .await?;
            bus.publish(BusEvent::status_with_message(
                ResourceKind::Registration,
                registration_id,
                "validation_failed",
                message,
            ));
            Err(error.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn sample_registration(api_kind: &str, auth_type: &str) -> RegistrationModel {
        RegistrationModel {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "test-api".to_string(),
            base_url: "https://api.example.com".to_string(),
            api_kind: api_kind.to_string(),
            auth_type: auth_type.to_string(),
            auth_blob: None,
            status: "pending".to_string(),
            last_validated_at: None,
            validation_error: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_endpoint_id_deterministic() {
        let registration_id = Uuid::new_v4();
        let a = endpoint_id(registration_id, "get", "/users/{id}");
        let b = endpoint_id(registration_id, "get", "/users/{id}");
        let c = endpoint_id(registration_id, "post", "/users/{id}");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, endpoint_id(Uuid::new_v4(), "get", "/users/{id}"));
    }

    #[test]
    fn test_oversized_document_rejected() {
        let registration = sample_registration("rest_openapi", "none");
        let normalizer = Normalizer::new(NormalizerConfig {
            max_spec_bytes: 16,
            max_graphql_fields: 500,
        });

        let result = normalizer.normalize(&registration, &"x".repeat(32));
        assert!(matches!(result, Err(NormalizeError::TooLarge { .. })));
    }

    #[test]
    fn test_unsupported_kind_rejected() {
        let registration = sample_registration("soap", "none");
        let normalizer = Normalizer::new(NormalizerConfig::default());

        let result = normalizer.normalize(&registration, "{}");
        assert!(matches!(result, Err(NormalizeError::UnsupportedKind(_))));
    }

    #[test]
    fn test_error_taxonomy_mapping() {
        let too_many = NormalizeError::TooManyFields {
            max_fields: 10,
            actual: 20,
        };
        assert_eq!(too_many.error_type(), ErrorType::SpecIncompatible);

        let parse = NormalizeError::Parse("bad".to_string());
        assert_eq!(parse.error_type(), ErrorType::SpecInvalid);
    }
}
