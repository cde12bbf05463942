//! # Data Models
//!
//! This module contains all the data models used throughout mcpforge.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod api_endpoint;
pub mod api_registration;
pub mod build_record;
pub mod deployment;
pub mod generation_job;

pub use api_endpoint::Entity as ApiEndpoint;
pub use api_registration::Entity as ApiRegistration;
pub use build_record::Entity as BuildRecord;
pub use deployment::Entity as Deployment;
pub use generation_job::Entity as GenerationJob;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "mcpforge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Liveness response for the health endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    /// Overall verdict (`ok`)
    pub status: String,
    /// Database reachability (`ok`)
    pub database: String,
}
