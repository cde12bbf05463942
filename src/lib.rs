//! # mcpforge
//!
//! Service that turns upstream API specifications (OpenAPI, GraphQL SDL or
//! manual endpoint lists) into generated MCP server source trees, container
//! images and running deployments.
//!
//! The pipeline is: register an API, normalize its specification into a
//! canonical endpoint set, generate server source for a language/framework
//! target, build a container image, then deploy and health-check it. Each
//! stage records its state in the database and publishes transitions on an
//! in-process event bus that backs the SSE endpoints.

pub mod builder;
pub mod config;
pub mod crypto;
pub mod db;
pub mod deployer;
pub mod error;
pub mod events;
pub mod generator;
pub mod handlers;
pub mod models;
pub mod normalizer;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod workers;
