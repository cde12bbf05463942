//! Render context passed to template sets.
//!
//! The context carries everything a target needs to render a complete
//! server: the registration, its endpoint set, the requested features and
//! the auth binding. Auth mapping lives here, expressed once per auth kind,
//! so every target language injects credentials identically.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::crypto::AuthCredentials;
use crate::models::api_endpoint::Model as EndpointModel;
use crate::models::api_registration::Model as RegistrationModel;

use super::registry::RenderError;

/// Environment variable names the generated server reads credentials from.
pub const ENV_API_KEY: &str = "MCP_UPSTREAM_API_KEY";
pub const ENV_TOKEN: &str = "MCP_UPSTREAM_TOKEN";
pub const ENV_USERNAME: &str = "MCP_UPSTREAM_USERNAME";
pub const ENV_PASSWORD: &str = "MCP_UPSTREAM_PASSWORD";

const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// How the generated server authenticates to the upstream API.
///
/// One variant per supported auth kind. Credentials are never embedded in
/// generated source; the binding names the environment variables the
/// deployed container must provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthBinding {
    None,
    ApiKey { header: String },
    Bearer,
    Basic,
    /// OAuth2 access tokens are injected like bearer tokens; refresh is the
    /// operator's concern, outside the generated server.
    OAuth2,
    Custom { header: String },
}

/// A single header the generated request code must set.
///
/// `value_template` uses `{credential}` as the placeholder for the resolved
/// credential value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInjection {
    pub header: String,
    pub value_template: String,
}

impl AuthBinding {
    /// Build the binding for a registration's declared auth type.
    pub fn from_registration(
        registration: &RegistrationModel,
        credentials: Option<&AuthCredentials>,
    ) -> Result<Self, RenderError> {
        match registration.auth_type.as_str() {
            "none" => Ok(AuthBinding::None),
            "api_key" => {
                let header = credentials
                    .and_then(|c| c.key_location.clone())
                    .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string());
                Ok(AuthBinding::ApiKey { header })
            }
            "bearer" | "bearer_token" => Ok(AuthBinding::Bearer),
            "basic" => Ok(AuthBinding::Basic),
            "oauth2" => Ok(AuthBinding::OAuth2),
            "custom" => {
                let header = credentials
                    .and_then(|c| c.key_location.clone())
                    .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string());
                Ok(AuthBinding::Custom { header })
            }
            other => Err(RenderError::MissingContext(format!(
                "unsupported auth type '{}'",
                other
            ))),
        }
    }

    /// The header the request code injects, if any.
    pub fn injection(&self) -> Option<HeaderInjection> {
        match self {
            AuthBinding::None => None,
            AuthBinding::ApiKey { header } | AuthBinding::Custom { header } => {
                Some(HeaderInjection {
                    header: header.clone(),
                    value_template: "{credential}".to_string(),
                })
            }
            AuthBinding::Bearer | AuthBinding::OAuth2 => Some(HeaderInjection {
                header: "Authorization".to_string(),
                value_template: "Bearer {credential}".to_string(),
            }),
            AuthBinding::Basic => Some(HeaderInjection {
                header: "Authorization".to_string(),
                // {credential} resolves to base64(username:password), computed
                // by the generated server at startup.
                value_template: "Basic {credential}".to_string(),
            }),
        }
    }

    /// Environment variables the deployed container must provide.
    pub fn required_env(&self) -> &'static [&'static str] {
        match self {
            AuthBinding::None => &[],
            AuthBinding::ApiKey { .. } | AuthBinding::Custom { .. } => &[ENV_API_KEY],
            AuthBinding::Bearer | AuthBinding::OAuth2 => &[ENV_TOKEN],
            AuthBinding::Basic => &[ENV_USERNAME, ENV_PASSWORD],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthBinding::None => "none",
            AuthBinding::ApiKey { .. } => "api_key",
            AuthBinding::Bearer => "bearer",
            AuthBinding::Basic => "basic",
            AuthBinding::OAuth2 => "oauth2",
            AuthBinding::Custom { .. } => "custom",
        }
    }
}

/// Everything a template set needs to render one server.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub registration: RegistrationModel,
    pub endpoints: Vec<EndpointModel>,
    pub language: String,
    pub framework: String,
    pub features: Vec<String>,
    pub config: BTreeMap<String, String>,
    pub auth: AuthBinding,
}

impl RenderContext {
    /// Name the generated server identifies itself with.
    pub fn server_name(&self) -> String {
        format!("mcp-{}", slugify(&self.registration.name))
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// Endpoint descriptors embedded into the generated server.
    pub fn endpoint_manifest(&self) -> JsonValue {
        let entries: Vec<JsonValue> = self
            .endpoints
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "method": e.method,
                    "path": e.path,
                    "requires_auth": e.requires_auth,
                    "timeout_seconds": e.timeout_seconds,
                    "content_type": e.content_type,
                    "query_params": e.query_params,
                    "path_params": e.path_params,
                    "request_schema": e.request_schema,
                    "response_schema": e.response_schema,
                })
            })
            .collect();
        JsonValue::Array(entries)
    }
}

fn slugify(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    slug.trim_matches('-').replace("--", "-")
}
