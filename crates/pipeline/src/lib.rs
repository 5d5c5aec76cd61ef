//! Domain model for the visual pipeline builder.
//!
//! This crate contains the pipeline graph, node templates, configuration
//! schemas and their validator, the shared identifiers and value types, and the
//! [`PipelineService`] port that infrastructure crates implement.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed from the remote service; infrastructure crates
//! define *how* to reach it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`PipelineId`, `NodeId`, `MutationSeq`, etc.) |
//! | [`types`] | Shared value types (`NodeKind`, `Position`, `CanvasConfig`, etc.) |
//! | [`errors`] | Graph and remote error types, retry policy |
//! | [`schema`] | Field kinds, config schemas, the config validator |
//! | [`template`] | Node templates and the template registry |
//! | [`graph`] | The pipeline graph and its operations |
//! | [`service`] | The `PipelineService` port and its request types |

pub mod errors;
pub mod graph;
pub mod identifiers;
pub mod schema;
pub mod service;
pub mod template;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{GraphError, RemoteRequestError, RetryPolicy};
pub use graph::{Connection, Pipeline, PipelineNode, PipelineReport, SOURCE_PORT, TARGET_PORT};
pub use identifiers::{ConnectionId, MutationSeq, NodeId, PipelineId, RequestId, TemplateId};
pub use schema::{
    default_config, validate_config, ConfigSchema, FieldErrors, FieldKind, FieldSchema,
    JsonInput, NodeConfig, REQUIRED_MESSAGE,
};
pub use service::{AddNode, ConnectNodes, CreatePipeline, ExecutionAck, PipelineService};
pub use template::{NodeTemplate, TemplateRegistry};
pub use types::{CanvasConfig, NodeKind, NodeStatus, Position, Timestamp, MAX_ZOOM, MIN_ZOOM};
