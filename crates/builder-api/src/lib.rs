//! Visual-builder service client adapter.
//!
//! Implements the [`pipeline::PipelineService`] trait over the service's JSON
//! HTTP endpoints:
//!
//! | Operation | Request | Response |
//! |-----------|---------|----------|
//! | templates | `GET api/data-ingestion/visual-builder/?action=node_templates` | `{node_templates: {category: [template]}}` |
//! | create | `POST api/data-ingestion/visual-builder/` `{name, description, industry}` | `{pipeline_id}` |
//! | add node | `POST .../{pipeline_id}/` `{action: "add_node", node_type, position, config}` | `{node_id}` |
//! | connect | `POST .../{pipeline_id}/` `{action: "connect_nodes", source_node_id, target_node_id}` | `{connection_id}` |
//! | execute | `POST .../{pipeline_id}/` `{action: "execute"}` | acknowledgement |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** URL construction, authentication, serialisation, and
//! HTTP error mapping all live here. The [`pipeline`] crate sees only
//! [`pipeline::PipelineService`] and [`pipeline::RemoteRequestError`].
//!
//! No call is retried. Each failure is returned once with a
//! [`pipeline::RetryPolicy`] hint attached to the error.

pub mod client;
pub mod config;
mod wire;

pub use client::{HttpPipelineService, BUILDER_PATH, REQUEST_ID_HEADER};
pub use config::{ClientConfig, ConfigError, BASE_URL_ENV, DEFAULT_BASE_URL, TOKEN_ENV};
