//! GraphQL SDL parsing into the canonical endpoint model.
//!
//! Each field of the schema's `Query` and `Mutation` types becomes one
//! canonical endpoint. All GraphQL operations execute as POSTs against the
//! upstream graphql endpoint; the canonical path embeds the field name
//! (`/graphql/<field>`) so the (path, method) uniqueness invariant holds.

use regex::Regex;
use serde_json::{Value as JsonValue, json};

use crate::models::api_registration::Model as RegistrationModel;
use crate::repositories::api_endpoint::NormalizedEndpoint;

use super::{
    DEFAULT_CONTENT_TYPE, DEFAULT_TIMEOUT_SECONDS, NormalizeError, endpoint_id,
    infer_requires_auth,
};

pub fn parse(
    registration: &RegistrationModel,
    document: &str,
    max_fields: usize,
) -> Result<Vec<NormalizedEndpoint>, NormalizeError> {
    let query_fields = type_fields(document, "Query")?;
    let mutation_fields = type_fields(document, "Mutation")?;

    if query_fields.is_empty() && mutation_fields.is_empty() {
        return Err(NormalizeError::Parse(
            "schema declares no Query or Mutation fields".to_string(),
        ));
    }

    let total = query_fields.len() + mutation_fields.len();
    if total > max_fields {
        return Err(NormalizeError::TooManyFields {
            max_fields,
            actual: total,
        });
    }

    let mut endpoints = Vec::with_capacity(total);
    for (operation_kind, fields) in [("query", query_fields), ("mutation", mutation_fields)] {
        for field in fields {
            let path = format!("/graphql/{}", field.name);
            endpoints.push(NormalizedEndpoint {
                id: endpoint_id(registration.id, "post", &path),
                name: field.name.clone(),
                method: "post".to_string(),
                path,
                request_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "operation": {"type": "string", "const": operation_kind},
                        "variables": {"type": "object"},
                    },
                })),
                response_schema: None,
                query_params: field.arguments,
                path_params: None,
                headers: None,
                requires_auth: infer_requires_auth(registration, false),
                rate_limit: None,
                timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
                cache_ttl_seconds: None,
                content_type: DEFAULT_CONTENT_TYPE.to_string(),
            });
        }
    }

    Ok(endpoints)
}

struct SdlField {
    name: String,
    arguments: Option<JsonValue>,
}

/// Extract the fields of a named SDL object type.
fn type_fields(document: &str, type_name: &str) -> Result<Vec<SdlField>, NormalizeError> {
    let Some(body) = type_body(document, type_name) else {
        return Ok(Vec::new());
    };

    let field_re = Regex::new(r"(?m)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(\(([^)]*)\))?\s*:")
        .map_err(|e| NormalizeError::Parse(e.to_string()))?;
    let arg_re = Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*:\s*([\[\]A-Za-z0-9_!]+)")
        .map_err(|e| NormalizeError::Parse(e.to_string()))?;

    let mut fields = Vec::new();
    for captures in field_re.captures_iter(body) {
        let name = captures[1].to_string();

        let arguments = captures.get(3).map(|args| {
            let definitions: Vec<JsonValue> = arg_re
                .captures_iter(args.as_str())
                .map(|arg| {
                    let type_ref = arg[2].to_string();
                    json!({
                        "name": arg[1].to_string(),
                        "required": type_ref.ends_with('!'),
                        "type": type_ref.trim_end_matches('!'),
                    })
                })
                .collect();
            JsonValue::Array(definitions)
        });

        fields.push(SdlField { name, arguments });
    }

    Ok(fields)
}

/// Find the brace-delimited body of `type <name> { ... }`.
fn type_body<'a>(document: &'a str, type_name: &str) -> Option<&'a str> {
    let marker_re = Regex::new(&format!(r"type\s+{}\s*\{{", regex::escape(type_name))).ok()?;
    let start = marker_re.find(document)?.end();

    let mut depth = 1usize;
    for (offset, c) in document[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&document[start..start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample_registration;
    use super::*;

    const SCHEMA: &str = r#"
        type User {
            id: ID!
            name: String
        }

        type Query {
            user(id: ID!): User
            users(limit: Int): [User]
        }

        type Mutation {
            createUser(name: String!): User
        }
    "#;

    #[test]
    fn test_parse_sdl_fields() {
        let registration = sample_registration("graphql", "bearer");
        let endpoints = parse(&registration, SCHEMA, 500).expect("parses");

        assert_eq!(endpoints.len(), 3);
        assert!(endpoints.iter().all(|e| e.method == "post"));
        assert!(endpoints.iter().all(|e| e.requires_auth));

        let user = endpoints.iter().find(|e| e.name == "user").unwrap();
        assert_eq!(user.path, "/graphql/user");
        let args = user.query_params.as_ref().unwrap().as_array().unwrap();
        assert_eq!(args[0]["name"], "id");
        assert_eq!(args[0]["required"], true);
    }

    #[test]
    fn test_field_budget_enforced() {
        let registration = sample_registration("graphql", "none");
        let result = parse(&registration, SCHEMA, 2);
        assert!(matches!(
            result,
            Err(NormalizeError::TooManyFields {
                max_fields: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_schema_without_operations_rejected() {
        let registration = sample_registration("graphql", "none");
        let result = parse(&registration, "type User { id: ID! }", 500);
        assert!(matches!(result, Err(NormalizeError::Parse(_))));
    }

    #[test]
    fn test_reparse_is_idempotent() {
        let registration = sample_registration("graphql", "none");
        let first = parse(&registration, SCHEMA, 500).expect("parses");
        let second = parse(&registration, SCHEMA, 500).expect("parses");

        let first_ids: Vec<_> = first.iter().map(|e| e.id).collect();
        let second_ids: Vec<_> = second.iter().map(|e| e.id).collect();
        assert_eq!(first_ids, second_ids);
    }
}
