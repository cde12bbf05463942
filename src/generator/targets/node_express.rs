//! Node/Express template set.

use crate::generator::context::{AuthBinding, RenderContext};
use crate::generator::registry::{FileSet, RenderError, TemplateSet};

pub struct NodeExpress;

const SERVER_TEMPLATE: &str = r#"const express = require("express");
const fs = require("fs");
const path = require("path");

const BASE_URL = "__BASE_URL__";
const SERVER_NAME = "__SERVER_NAME__";

const endpoints = JSON.parse(
  fs.readFileSync(path.join(__dirname, "endpoints.json"), "utf8")
);
const endpointIndex = new Map(endpoints.map((e) => [`${e.method} ${e.path}`, e]));

const app = express();
app.use(express.json());

function authHeaders() {
__AUTH_BODY__
}

__LOGGING_MIDDLEWARE__

app.get("/health", (req, res) => {
  res.json({ status: "ok", server: SERVER_NAME });
});

app.post("/mcp/tools/list", (req, res) => {
  res.json({
    tools: [
      {
        name: "call_api",
        description: `Invoke an operation of the upstream API at ${BASE_URL}`,
        input_schema: {
          type: "object",
          properties: {
            endpoint: { type: "string" },
            method: { type: "string" },
            params: { type: "object" },
            data: { type: "object" },
          },
          required: ["endpoint", "method"],
        },
      },
    ],
    endpoints,
  });
});

app.post("/mcp/tools/call", async (req, res) => {
  const { endpoint, method, params = {}, data = null } = req.body || {};
  const spec = endpointIndex.get(`${(method || "").toLowerCase()} ${endpoint}`);
  if (!spec) {
    res.status(404).json({ error: "unknown endpoint" });
    return;
  }

  let resolvedPath = endpoint;
  const query = new URLSearchParams();
  for (const [key, value] of Object.entries(params)) {
    const placeholder = `{${key}}`;
    if (resolvedPath.includes(placeholder)) {
      resolvedPath = resolvedPath.replaceAll(placeholder, String(value));
    } else {
      query.set(key, String(value));
    }
  }

  const headers = { "content-type": spec.content_type || "application/json" };
  if (spec.requires_auth) {
    Object.assign(headers, authHeaders());
  }

  const queryString = query.toString();
  const url = BASE_URL + resolvedPath + (queryString ? `?${queryString}` : "");
  const controller = new AbortController();
  const timeout = setTimeout(
    () => controller.abort(),
    (spec.timeout_seconds || 30) * 1000
  );

  try {
    const response = await fetch(url, {
      method: method.toUpperCase(),
      headers,
      body: data ? JSON.stringify(data) : undefined,
      signal: controller.signal,
    });

    const text = await response.text();
    let body;
    try {
      body = JSON.parse(text);
    } catch {
      body = text;
    }

    res.json({
      status_code: response.status,
      headers: Object.fromEntries(response.headers.entries()),
      data: body,
    });
  } catch (err) {
    res.status(502).json({ error: String(err) });
  } finally {
    clearTimeout(timeout);
  }
});

const port = process.env.PORT || 8000;
app.listen(port, () => {
  console.log(`${SERVER_NAME} listening on ${port}`);
});
"#;

const LOGGING_MIDDLEWARE: &str = r#"app.use((req, res, next) => {
  const started = process.hrtime.bigint();
  res.on("finish", () => {
    const elapsedMs = Number(process.hrtime.bigint() - started) / 1e6;
    console.log(`${req.method} ${req.path} -> ${res.statusCode} (${elapsedMs.toFixed(1)}ms)`);
  });
  next();
});
"#;

const DOCKERFILE: &str = r#"FROM node:20-slim

WORKDIR /app

COPY package.json .
RUN npm install --omit=dev

COPY . .

EXPOSE 8000
HEALTHCHECK --interval=30s --timeout=5s --start-period=10s \
    CMD node -e "fetch('http://localhost:8000/health').then(r => process.exit(r.ok ? 0 : 1), () => process.exit(1))"

CMD ["node", "server.js"]
"#;

impl TemplateSet for NodeExpress {
    fn language(&self) -> &'static str {
        "node"
    }

    fn framework(&self) -> &'static str {
        "express"
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

        let server = SERVER_TEMPLATE
            .replace("__BASE_URL__", context.registration.base_url.trim_end_matches('/'))
            .replace("__SERVER_NAME__", &context.server_name())
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
        files.push("server.js", server);
        files.push("endpoints.json", format!("{}\n", manifest));
        files.push("package.json", package_json(context));
        files.push("Dockerfile", DOCKERFILE);
        files.push("README.md", readme(context));

        Ok(files)
    }
}

/// Body of the generated `authHeaders()` function, driven by the same
/// binding data the Python target consumes.
fn auth_body(binding: &AuthBinding) -> String {
    let Some(injection) = binding.injection() else {
        return "  return {};".to_string();
    };

    let credential = match binding {
        AuthBinding::Basic => concat!(
            "  const raw = `${process.env.MCP_UPSTREAM_USERNAME || \"\"}:",
            "${process.env.MCP_UPSTREAM_PASSWORD || \"\"}`;\n",
            "  const credential = Buffer.from(raw).toString(\"base64\");\n"
        )
        .to_string(),
        _ => format!(
            "  const credential = process.env.{} || \"\";\n",
            binding.required_env()[0]
        ),
    };

    format!(
        "{}  return {{ \"{}\": \"{}\".replace(\"{{credential}}\", credential) }};",
        credential, injection.header, injection.value_template
    )
}

fn package_json(context: &RenderContext) -> String {
    serde_json::to_string_pretty(&serde_json::json!({
        "name": context.server_name(),
        "version": "1.0.0",
        "private": true,
        "main": "server.js",
        "scripts": {
            "start": "node server.js"
        },
        "dependencies": {
            "express": "4.21.2"
        }
    }))
    .map(|s| format!("{}\n", s))
    .unwrap_or_default()
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
         Run with `node server.js`.\n\n\
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
