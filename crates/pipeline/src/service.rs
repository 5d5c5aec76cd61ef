//! Port definition for the remote visual-builder service.
//!
//! [`PipelineService`] is what the orchestration layer needs from the backend.
//! Infrastructure crates supply the transport (`builder-api` implements it over
//! HTTP); this crate only fixes the request and response shapes in domain terms.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::schema::NodeConfig;
use crate::template::TemplateRegistry;
use crate::{ConnectionId, NodeId, PipelineId, Position, RemoteRequestError, TemplateId};

/// Fields sent when persisting a new pipeline shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub name: String,
    pub description: String,
    pub industry: String,
}

/// An `add_node` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddNode {
    /// The template to instantiate, sent as `node_type`.
    pub template_id: TemplateId,
    pub position: Position,
    pub config: NodeConfig,
}

/// A `connect_nodes` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectNodes {
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
}

/// Acknowledgement of an `execute` action.
///
/// Only confirms that the run request was accepted. Results arrive out of band.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionAck {
    /// Free-form status string returned by the service, if any.
    pub status: Option<String>,
    /// Service-side run identifier, if the service returned one.
    pub run_id: Option<String>,
}

/// The remote pipeline service.
///
/// Every method may fail with [`RemoteRequestError`]. Implementations must not
/// retry on their own.
#[async_trait]
pub trait PipelineService: Send + Sync {
    /// Fetches the node template catalog.
    async fn node_templates(&self) -> Result<TemplateRegistry, RemoteRequestError>;

    /// Persists a new pipeline shell and returns its id.
    async fn create_pipeline(&self, request: &CreatePipeline) -> Result<PipelineId, RemoteRequestError>;

    /// Adds a node and returns the service-assigned node id.
    async fn add_node(&self, pipeline: &PipelineId, request: &AddNode) -> Result<NodeId, RemoteRequestError>;

    /// Connects two nodes and returns the service-assigned connection id.
    async fn connect_nodes(
        &self,
        pipeline: &PipelineId,
        request: &ConnectNodes,
    ) -> Result<ConnectionId, RemoteRequestError>;

    /// Requests a run of the pipeline.
    async fn execute(&self, pipeline: &PipelineId) -> Result<ExecutionAck, RemoteRequestError>;
}
