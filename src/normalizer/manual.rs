//! Manually entered endpoint lists.
//!
//! The document is a JSON array of endpoint objects. This path covers
//! REST APIs without an OpenAPI document and custom protocols the owner
//! describes by hand.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::models::api_registration::Model as RegistrationModel;
use crate::repositories::api_endpoint::NormalizedEndpoint;

use super::{
    DEFAULT_CONTENT_TYPE, DEFAULT_TIMEOUT_SECONDS, NormalizeError, SUPPORTED_METHODS, endpoint_id,
    infer_requires_auth,
};

#[derive(Debug, Deserialize)]
struct ManualEndpoint {
    #[serde(default)]
    name: Option<String>,
    method: String,
    path: String,
    #[serde(default)]
    request_schema: Option<JsonValue>,
    #[serde(default)]
    response_schema: Option<JsonValue>,
    #[serde(default)]
    query_params: Option<JsonValue>,
    #[serde(default)]
    path_params: Option<JsonValue>,
    #[serde(default)]
    headers: Option<JsonValue>,
    #[serde(default)]
    requires_auth: Option<bool>,
    #[serde(default)]
    rate_limit: Option<i32>,
    #[serde(default)]
    timeout_seconds: Option<i32>,
    #[serde(default)]
    cache_ttl_seconds: Option<i32>,
    #[serde(default)]
    content_type: Option<String>,
}

pub fn parse(
    registration: &RegistrationModel,
    document: &str,
) -> Result<Vec<NormalizedEndpoint>, NormalizeError> {
    let entries: Vec<ManualEndpoint> = serde_json::from_str(document)
        .map_err(|e| NormalizeError::Parse(format!("invalid endpoint list: {}", e)))?;

    if entries.is_empty() {
        return Err(NormalizeError::Parse(
            "endpoint list is empty".to_string(),
        ));
    }

    entries.into_iter().map(|entry| build(registration, entry)).collect()
}

fn build(
    registration: &RegistrationModel,
    entry: ManualEndpoint,
) -> Result<NormalizedEndpoint, NormalizeError> {
    let method = entry.method.to_lowercase();
    if !SUPPORTED_METHODS.contains(&method.as_str()) {
        return Err(NormalizeError::InvalidEndpoint(format!(
            "unsupported method '{}'",
            entry.method
        )));
    }

    if !entry.path.starts_with('/') {
        return Err(NormalizeError::InvalidEndpoint(format!(
            "path '{}' must start with '/'",
            entry.path
        )));
    }

    let timeout_seconds = entry.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
    if timeout_seconds <= 0 {
        return Err(NormalizeError::InvalidEndpoint(
            "timeout_seconds must be positive".to_string(),
        ));
    }
    if entry.rate_limit.is_some_and(|v| v <= 0) {
        return Err(NormalizeError::InvalidEndpoint(
            "rate_limit must be positive".to_string(),
        ));
    }
    if entry.cache_ttl_seconds.is_some_and(|v| v <= 0) {
        return Err(NormalizeError::InvalidEndpoint(
            "cache_ttl_seconds must be positive".to_string(),
        ));
    }

    let name = entry.name.unwrap_or_else(|| {
        let slug: String = entry
            .path
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}_{}", method, slug.trim_matches('_'))
    });

    // An explicit requires_auth=false opts the endpoint out.
    let requires_auth = match entry.requires_auth {
        Some(explicit) => explicit && registration.auth_type != "none",
        None => infer_requires_auth(registration, false),
    };

    Ok(NormalizedEndpoint {
        id: endpoint_id(registration.id, &method, &entry.path),
        name,
        method,
        path: entry.path,
        request_schema: entry.request_schema,
        response_schema: entry.response_schema,
        query_params: entry.query_params,
        path_params: entry.path_params,
        headers: entry.headers,
        requires_auth,
        rate_limit: entry.rate_limit,
        timeout_seconds,
        cache_ttl_seconds: entry.cache_ttl_seconds,
        content_type: entry
            .content_type
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
    })
}
