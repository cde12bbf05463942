//! OpenAPI document parsing into the canonical endpoint model.
//!
//! Accepts OpenAPI 3.x (and Swagger 2.0) documents as JSON. Each
//! path/method operation becomes one canonical endpoint; request and
//! response schemas, parameters and header requirements are carried over
//! where declared.

use serde_json::{Value as JsonValue, json};

use crate::models::api_registration::Model as RegistrationModel;
use crate::repositories::api_endpoint::NormalizedEndpoint;

use super::{
    DEFAULT_CONTENT_TYPE, DEFAULT_TIMEOUT_SECONDS, NormalizeError, SUPPORTED_METHODS, endpoint_id,
    infer_requires_auth,
};

pub fn parse(
    registration: &RegistrationModel,
    document: &str,
) -> Result<Vec<NormalizedEndpoint>, NormalizeError> {
    let doc: JsonValue = serde_json::from_str(document)
        .map_err(|e| NormalizeError::Parse(format!("invalid JSON: {}", e)))?;

    if doc.get("openapi").is_none() && doc.get("swagger").is_none() {
        return Err(NormalizeError::Parse(
            "missing 'openapi' or 'swagger' version field".to_string(),
        ));
    }

    let paths = doc
        .get("paths")
        .and_then(JsonValue::as_object)
        .ok_or_else(|| NormalizeError::Parse("missing 'paths' object".to_string()))?;

    let mut endpoints = Vec::new();

    for (path, item) in paths {
        if !path.starts_with('/') {
            return Err(NormalizeError::InvalidEndpoint(format!(
                "path '{}' must start with '/'",
                path
            )));
        }

        let Some(item) = item.as_object() else {
            continue;
        };

        // Path-level parameters apply to every operation beneath them.
        let path_level_params = item
            .get("parameters")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();

        for (method, operation) in item {
            if !SUPPORTED_METHODS.contains(&method.as_str()) {
                continue;
            }
            let Some(operation) = operation.as_object() else {
                continue;
            };

            let mut parameters = path_level_params.clone();
            if let Some(op_params) = operation.get("parameters").and_then(JsonValue::as_array) {
                parameters.extend(op_params.iter().cloned());
            }

            let (query_params, path_params, headers) = split_parameters(&parameters);

            let name = operation
                .get("operationId")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| derive_name(method, path));

            let (request_schema, content_type) = request_body(operation);
            let response_schema = success_response_schema(operation);

            // An explicit empty security array opts the operation out.
            let explicit_opt_out = operation
                .get("security")
                .and_then(JsonValue::as_array)
                .is_some_and(|s| s.is_empty());

            endpoints.push(NormalizedEndpoint {
                id: endpoint_id(registration.id, method, path),
                name,
                method: method.clone(),
                path: path.clone(),
                request_schema,
                response_schema,
                query_params,
                path_params,
                headers,
                requires_auth: infer_requires_auth(registration, explicit_opt_out),
                rate_limit: None,
                timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
                cache_ttl_seconds: None,
                content_type,
            });
        }
    }

    if endpoints.is_empty() {
        return Err(NormalizeError::Parse(
            "document declares no operations".to_string(),
        ));
    }

    Ok(endpoints)
}

fn derive_name(method: &str, path: &str) -> String {
    let slug: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let slug = slug.trim_matches('_').to_string();
    format!("{}_{}", method, slug)
}

type ParameterGroups = (Option<JsonValue>, Option<JsonValue>, Option<JsonValue>);

fn split_parameters(parameters: &[JsonValue]) -> ParameterGroups {
    let mut query = Vec::new();
    let mut path = Vec::new();
    let mut headers = Vec::new();

    for param in parameters {
        let Some(location) = param.get("in").and_then(JsonValue::as_str) else {
            continue;
        };
        let Some(name) = param.get("name").and_then(JsonValue::as_str) else {
            continue;
        };

        let definition = json!({
            "name": name,
            "required": param.get("required").and_then(JsonValue::as_bool).unwrap_or(false),
            "schema": param.get("schema").cloned().unwrap_or(JsonValue::Null),
        });

        match location {
            "query" => query.push(definition),
            "path" => path.push(definition),
            "header" => headers.push(definition),
            _ => {}
        }
    }

    let wrap = |v: Vec<JsonValue>| {
        if v.is_empty() {
            None
        } else {
            Some(JsonValue::Array(v))
        }
    };

    (wrap(query), wrap(path), wrap(headers))
}

fn request_body(operation: &serde_json::Map<String, JsonValue>) -> (Option<JsonValue>, String) {
    let Some(content) = operation
        .get("requestBody")
        .and_then(|b| b.get("content"))
        .and_then(JsonValue::as_object)
    else {
        return (None, DEFAULT_CONTENT_TYPE.to_string());
    };

    if let Some(media) = content.get(DEFAULT_CONTENT_TYPE) {
        return (
            media.get("schema").cloned(),
            DEFAULT_CONTENT_TYPE.to_string(),
        );
    }

    // Fall back to the first declared media type.
    content
        .iter()
        .next()
        .map(|(content_type, media)| (media.get("schema").cloned(), content_type.clone()))
        .unwrap_or((None, DEFAULT_CONTENT_TYPE.to_string()))
}

fn success_response_schema(operation: &serde_json::Map<String, JsonValue>) -> Option<JsonValue> {
    let responses = operation.get("responses")?.as_object()?;

    for status in ["200", "201", "202", "default"] {
        if let Some(schema) = responses
            .get(status)
            .and_then(|r| r.get("content"))
            .and_then(|c| c.get(DEFAULT_CONTENT_TYPE))
            .and_then(|m| m.get("schema"))
        {
            return Some(schema.clone());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample_registration;
    use super::*;

    fn petstore_document() -> String {
        json!({
            "openapi": "3.0.0",
            "info": {"title": "Petstore", "version": "1.0.0"},
            "paths": {
                "/users/{id}": {
                    "parameters": [
                        {"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}
                    ],
                    "get": {
                        "operationId": "getUser",
                        "parameters": [
                            {"name": "verbose", "in": "query", "schema": {"type": "boolean"}}
                        ],
                        "responses": {
                            "200": {
                                "content": {
                                    "application/json": {"schema": {"type": "object"}}
                                }
                            }
                        }
                    },
                    "delete": {
                        "security": [],
                        "responses": {"204": {"description": "deleted"}}
                    }
                },
                "/users": {
                    "post": {
                        "requestBody": {
                            "content": {
                                "application/json": {"schema": {"type": "object"}}
                            }
                        },
                        "responses": {"201": {"description": "created"}}
                    }
                }
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_openapi_document() {
        let registration = sample_registration("rest_openapi", "bearer");
        let endpoints = parse(&registration, &petstore_document()).expect("parses");

        assert_eq!(endpoints.len(), 3);

        let get_user = endpoints
            .iter()
            .find(|e| e.name == "getUser")
            .expect("getUser present");
        assert_eq!(get_user.method, "get");
        assert_eq!(get_user.path, "/users/{id}");
        assert!(get_user.requires_auth);
        assert!(get_user.path_params.is_some());
        assert!(get_user.query_params.is_some());
        assert!(get_user.response_schema.is_some());
        assert_eq!(get_user.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    }

    #[test]
    fn test_empty_security_opts_out_of_auth() {
        let registration = sample_registration("rest_openapi", "bearer");
        let endpoints = parse(&registration, &petstore_document()).expect("parses");

        let delete_user = endpoints
            .iter()
            .find(|e| e.method == "delete")
            .expect("delete present");
        assert!(!delete_user.requires_auth);
    }

    #[test]
    fn test_derived_operation_name() {
        let registration = sample_registration("rest_openapi", "none");
        let endpoints = parse(&registration, &petstore_document()).expect("parses");

        let post_users = endpoints
            .iter()
            .find(|e| e.method == "post")
            .expect("post present");
        assert_eq!(post_users.name, "post_users");
        assert!(!post_users.requires_auth);
    }

    #[test]
    fn test_missing_version_field_rejected() {
        let registration = sample_registration("rest_openapi", "none");
        let result = parse(&registration, r#"{"paths": {}}"#);
        assert!(matches!(result, Err(NormalizeError::Parse(_))));
    }

    #[test]
    fn test_document_without_operations_rejected() {
        let registration = sample_registration("rest_openapi", "none");
        let result = parse(&registration, r#"{"openapi": "3.0.0", "paths": {}}"#);
        assert!(matches!(result, Err(NormalizeError::Parse(_))));
    }
}
