//! Built-in template sets.
//!
//! Each target renders a self-contained source tree for an MCP bridge
//! server: a tool-listing operation, a tool-invocation operation accepting
//! `{endpoint, method, params, data}`, and a liveness path. Targets consume
//! the same [`AuthBinding`](super::context::AuthBinding) data, so credential
//! injection behaves identically regardless of language.

pub mod node_express;
pub mod python_fastapi;
