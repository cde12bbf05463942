//! Python/FastAPI template set.

use crate::generator::context::{AuthBinding, RenderContext};
use crate::generator::registry::{FileSet, RenderError, TemplateSet};

pub struct PythonFastapi;

const SERVER_TEMPLATE: &str = r#"import base64
import json
import os
import pathlib

import httpx
from fastapi import FastAPI, HTTPException
from pydantic import BaseModel

BASE_URL = "__BASE_URL__"
SERVER_NAME = "__SERVER_NAME__"

ENDPOINTS = json.loads(pathlib.Path(__file__).with_name("endpoints.json").read_text())
ENDPOINT_INDEX = {(e["method"], e["path"]): e for e in ENDPOINTS}

app = FastAPI(title=SERVER_NAME__DOCS_ARGS__)


def auth_headers():
__AUTH_BODY__


class ToolCall(BaseModel):
    endpoint: str
    method: str
    params: dict = {}
    data: dict | None = None

__LOGGING_MIDDLEWARE__

@app.get("/health")
def health():
    return {"status": "ok", "server": SERVER_NAME}


@app.post("/mcp/tools/list")
def tools_list():
    return {
        "tools": [
            {
                "name": "call_api",
                "description": "Invoke an operation of the upstream API at " + BASE_URL,
                "input_schema": {
                    "type": "object",
                    "properties": {
                        "endpoint": {"type": "string"},
                        "method": {"type": "string"},
                        "params": {"type": "object"},
                        "data": {"type": "object"},
                    },
                    "required": ["endpoint", "method"],
                },
            }
        ],
        "endpoints": ENDPOINTS,
    }


@app.post("/mcp/tools/call")
def tools_call(call: ToolCall):
    spec = ENDPOINT_INDEX.get((call.method.lower(), call.endpoint))
    if spec is None:
        raise HTTPException(status_code=404, detail="unknown endpoint")

    path = call.endpoint
    query = {}
    for key, value in call.params.items():
        placeholder = "{" + key + "}"
        if placeholder in path:
            path = path.replace(placeholder, str(value))
        else:
            query[key] = value

    headers = {}
    if spec.get("requires_auth"):
        headers.update(auth_headers())

    with httpx.Client(base_url=BASE_URL, timeout=spec.get("timeout_seconds", 30)) as client:
        response = client.request(
            call.method.upper(), path, params=query, json=call.data, headers=headers
        )

    try:
        data = response.json()
    except ValueError:
        data = response.text

    return {
        "status_code": response.status_code,
        "headers": dict(response.headers),
        "data": data,
    }
"#;

const LOGGING_MIDDLEWARE: &str = r#"
import logging
import time

logging.basicConfig(level=logging.INFO)
logger = logging.getLogger(SERVER_NAME)


@app.middleware("http")
async def log_requests(request, call_next):
    started = time.monotonic()
    response = await call_next(request)
    elapsed_ms = (time.monotonic() - started) * 1000
    logger.info("%s %s -> %s (%.1fms)", request.method, request.url.path, response.status_code, elapsed_ms)
    return response

"#;

const DOCKERFILE: &str = r#"FROM python:3.12-slim

WORKDIR /app

COPY requirements.txt .
RUN pip install --no-cache-dir -r requirements.txt

COPY . .

EXPOSE 8000
HEALTHCHECK --interval=30s --timeout=5s --start-period=10s \
    CMD python -c "import urllib.request; urllib.request.urlopen('http://localhost:8000/health')"

CMD ["uvicorn", "server:app", "--host", "0.0.0.0", "--port", "8000"]
"#;

const REQUIREMENTS: &str = "fastapi==0.115.8\nuvicorn==0.34.0\nhttpx==0.28.1\n";

impl TemplateSet for PythonFastapi {
    fn language(&self) -> &'static str {
        "python"
    }

    fn framework(&self) -> &'static str {
        "fastapi"
    }

    fn render(&self, context: &RenderContext) -> Result<FileSet, RenderError> {
        if context.endpoints.is_empty() {
            return Err(RenderError::MissingContext(
                "registration has no endpoints".to_string(),
            ));
        }

        let manifest = serde_json::to_string_pretty(&context.endpoint_manifest()).map_err(|e| {
            RenderError::File {
                file: "endpoints.json".to_string(),
                reason: e.to_string(),
            }
        })?;

        let docs_args = if context.has_feature("docs") {
            ""
        } else {
            ", docs_url=None, redoc_url=None"
        };

        let server = SERVER_TEMPLATE
            .replace("__BASE_URL__", context.registration.base_url.trim_end_matches('/'))
            .replace("__SERVER_NAME__", &context.server_name())
            .replace("__DOCS_ARGS__", docs_args)
            .replace("__AUTH_BODY__", &auth_body(&context.auth))
            .replace(
                "__LOGGING_MIDDLEWARE__",
                if context.has_feature("logging") {
                    LOGGING_MIDDLEWARE
                } else {
                    ""
                },
            );

        let mut files = FileSet::new();
        files.push("server.py", server);
        files.push("endpoints.json", format!("{}\n", manifest));
        files.push("requirements.txt", REQUIREMENTS);
        files.push("Dockerfile", DOCKERFILE);
        files.push("README.md", readme(context));

        Ok(files)
    }
}

/// Body of the generated `auth_headers()` function.
///
/// The header name and value template come straight from the binding, so a
/// bearer registration renders the same `Authorization: Bearer <token>`
/// injection every target produces.
fn auth_body(binding: &AuthBinding) -> String {
    let Some(injection) = binding.injection() else {
        return "    return {}".to_string();
    };

    let credential = match binding {
        AuthBinding::Basic => concat!(
            "    raw = os.environ.get(\"MCP_UPSTREAM_USERNAME\", \"\") + \":\" + ",
            "os.environ.get(\"MCP_UPSTREAM_PASSWORD\", \"\")\n",
            "    credential = base64.b64encode(raw.encode()).decode()\n"
        )
        .to_string(),
        _ => format!(
            "    credential = os.environ.get(\"{}\", \"\")\n",
            binding.required_env()[0]
        ),
    };

    format!(
        "{}    return {{\"{}\": \"{}\".replace(\"{{credential}}\", credential)}}",
        credential, injection.header, injection.value_template
    )
}

fn readme(context: &RenderContext) -> String {
    let env_lines: String = context
        .auth
        .required_env()
        .iter()
        .map(|var| format!("- `{}`\n", var))
        .collect();

    format!(
        "# {}\n\nGenerated MCP bridge server for `{}`.\n\n\
         Run with `uvicorn server:app --host 0.0.0.0 --port 8000`.\n\n\
         ## Endpoints\n\n\
         - `GET /health` - liveness probe\n\
         - `POST /mcp/tools/list` - tool listing\n\
         - `POST /mcp/tools/call` - tool invocation\n\n\
         ## Required environment\n\n{}",
        context.server_name(),
        context.registration.base_url,
        if env_lines.is_empty() {
            "(none)\n".to_string()
        } else {
            env_lines
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::context::tests_support::sample_context;

    #[test]
    fn test_render_produces_complete_tree() {
        let context = sample_context("python", "fastapi", "bearer", &[]);
        let files = PythonFastapi.render(&context).expect("renders");

        let paths: Vec<_> = files.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "server.py",
                "endpoints.json",
                "requirements.txt",
                "Dockerfile",
                "README.md"
            ]
        );
    }

    #[test]
    fn test_bearer_injection_rendered() {
        let context = sample_context("python", "fastapi", "bearer", &[]);
        let files = PythonFastapi.render(&context).expect("renders");

        let server = &files.files()[0].contents;
        assert!(server.contains("MCP_UPSTREAM_TOKEN"));
        assert!(server.contains("Authorization"));
        assert!(server.contains("Bearer {credential}"));
    }

    #[test]
    fn test_logging_feature_toggles_middleware() {
        let without = PythonFastapi
            .render(&sample_context("python", "fastapi", "none", &[]))
            .expect("renders");
        assert!(!without.files()[0].contents.contains("log_requests"));

        let with = PythonFastapi
            .render(&sample_context("python", "fastapi", "none", &["logging"]))
            .expect("renders");
        assert!(with.files()[0].contents.contains("log_requests"));
    }

    #[test]
    fn test_empty_endpoint_set_rejected() {
        let mut context = sample_context("python", "fastapi", "none", &[]);
        context.endpoints.clear();

        let result = PythonFastapi.render(&context);
        assert!(matches!(result, Err(RenderError::MissingContext(_))));
    }
}
