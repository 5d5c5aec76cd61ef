//! The in-memory pipeline graph.
//!
//! [`Pipeline`] holds the nodes, connections, and canvas metadata of one
//! pipeline. Every state transition takes `&self` and returns a new
//! [`Pipeline`]; the receiver is never modified, so a failed operation leaves
//! the caller's graph exactly as it was.
//!
//! ## Projection invariant
//!
//! Each node's `inputs`/`outputs` lists are a projection of the connection set:
//! for every connection `s -> t` the source lists `t` in `outputs` and the target
//! lists `s` in `inputs`, and nothing else appears in either list. Every
//! operation preserves this; [`Pipeline::is_projection_consistent`] checks it.
//!
//! Duplicate connections between the same pair of nodes and cycles are
//! accepted. [`Pipeline::topological_order`] reports whether the graph is a DAG
//! for callers that need one.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;

use crate::schema::{validate_config, FieldErrors, NodeConfig};
use crate::template::TemplateRegistry;
use crate::{
    CanvasConfig, ConnectionId, GraphError, NodeId, NodeKind, NodeStatus, PipelineId, Position,
    TemplateId,
};

/// Port name on the source side of every connection.
pub const SOURCE_PORT: &str = "output";

/// Port name on the target side of every connection.
pub const TARGET_PORT: &str = "input";

// ---------------------------------------------------------------------------
// Nodes and connections
// ---------------------------------------------------------------------------

/// One step of a pipeline, instantiated from a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineNode {
    pub id: NodeId,
    /// Inherited from the template at creation; never changes.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub template_id: TemplateId,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub config: NodeConfig,
    pub position: Position,
    pub status: NodeStatus,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
}

impl PipelineNode {
    /// Ids of upstream neighbours, one entry per incoming connection.
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Ids of downstream neighbours, one entry per outgoing connection.
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }
}

/// A directed edge from one node's output port to another node's input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub source_port: String,
    pub target_port: String,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A pipeline graph: nodes, connections, and canvas metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pipeline {
    id: Option<PipelineId>,
    pub name: String,
    pub description: String,
    /// Free-form industry tag used to narrow the template palette.
    pub industry: String,
    nodes: Vec<PipelineNode>,
    connections: Vec<Connection>,
    canvas: CanvasConfig,
}

impl Pipeline {
    /// An empty, unsaved pipeline.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        industry: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: description.into(),
            industry: industry.into(),
            nodes: Vec::new(),
            connections: Vec::new(),
            canvas: CanvasConfig::default(),
        }
    }

    /// The service-assigned id, or `None` while the pipeline is unsaved.
    pub fn id(&self) -> Option<&PipelineId> {
        self.id.as_ref()
    }

    /// Returns a copy carrying the service-assigned id.
    #[must_use]
    pub fn with_id(&self, id: PipelineId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    pub fn nodes(&self) -> &[PipelineNode] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn canvas(&self) -> CanvasConfig {
        self.canvas
    }

    pub fn node(&self, id: &NodeId) -> Option<&PipelineNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    fn require_node(&self, id: &NodeId) -> Result<usize, GraphError> {
        self.nodes
            .iter()
            .position(|n| &n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound { node_id: id.clone() })
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Adds a node built from `template_id`'s template under the service-assigned
    /// `node_id`. The node starts with an empty config and
    /// [`NodeStatus::Configured`].
    ///
    /// # Errors
    ///
    /// - [`GraphError::TemplateNotFound`] if the registry has no such template.
    /// - [`GraphError::DuplicateNode`] if `node_id` is already in the pipeline.
    pub fn add_node(
        &self,
        registry: &TemplateRegistry,
        template_id: &TemplateId,
        node_id: NodeId,
        position: Position,
    ) -> Result<(PipelineNode, Pipeline), GraphError> {
        let template = registry.require(template_id)?;
        if self.contains_node(&node_id) {
            return Err(GraphError::DuplicateNode { node_id });
        }

        let node = PipelineNode {
            id: node_id,
            kind: template.kind,
            template_id: template.id.clone(),
            name: template.name.clone(),
            description: template.description.clone(),
            icon: template.icon.clone(),
            config: NodeConfig::new(),
            position,
            status: NodeStatus::Configured,
            inputs: Vec::new(),
            outputs: Vec::new(),
        };
        tracing::debug!(node_id = %node.id, template_id = %template.id, "node added");

        let mut next = self.clone();
        next.nodes.push(node.clone());
        Ok((node, next))
    }

    /// Connects `source`'s output to `target`'s input under the service-assigned
    /// `connection_id`.
    ///
    /// # Errors
    ///
    /// - [`GraphError::InvalidConnection`] if `source == target`.
    /// - [`GraphError::NodeNotFound`] if either endpoint is absent.
    /// - [`GraphError::DuplicateConnection`] if `connection_id` is already used.
    pub fn connect(
        &self,
        connection_id: ConnectionId,
        source: &NodeId,
        target: &NodeId,
    ) -> Result<(Connection, Pipeline), GraphError> {
        self.check_connection(source, target)?;
        let source_idx = self.require_node(source)?;
        let target_idx = self.require_node(target)?;
        if self.connections.iter().any(|c| c.id == connection_id) {
            return Err(GraphError::DuplicateConnection { connection_id });
        }

        let connection = Connection {
            id: connection_id,
            source_node_id: source.clone(),
            target_node_id: target.clone(),
            source_port: SOURCE_PORT.to_string(),
            target_port: TARGET_PORT.to_string(),
        };

        let mut next = self.clone();
        next.nodes[source_idx].outputs.push(target.clone());
        next.nodes[target_idx].inputs.push(source.clone());
        next.connections.push(connection.clone());
        tracing::debug!(connection_id = %connection.id, %source, %target, "nodes connected");
        Ok((connection, next))
    }

    /// Checks that `source -> target` could be connected, without needing a
    /// connection id. Lets callers fail fast before asking the service for one.
    pub fn check_connection(&self, source: &NodeId, target: &NodeId) -> Result<(), GraphError> {
        if source == target {
            return Err(GraphError::InvalidConnection {
                source_node_id: source.clone(),
                target_node_id: target.clone(),
                reason: "a node cannot connect to itself".to_string(),
            });
        }
        self.require_node(source)?;
        self.require_node(target)?;
        Ok(())
    }

    /// Removes a node, every connection touching it, and every reference to it
    /// in the remaining nodes' `inputs`/`outputs`.
    ///
    /// Deleting an id that is not in the pipeline returns an identical pipeline.
    #[must_use]
    pub fn delete_node(&self, id: &NodeId) -> Pipeline {
        if !self.contains_node(id) {
            return self.clone();
        }

        let mut next = self.clone();
        next.nodes.retain(|n| &n.id != id);
        next.connections
            .retain(|c| &c.source_node_id != id && &c.target_node_id != id);
        for node in &mut next.nodes {
            node.inputs.retain(|n| n != id);
            node.outputs.retain(|n| n != id);
        }
        tracing::debug!(node_id = %id, "node deleted");
        next
    }

    /// Replaces a node's config wholesale.
    ///
    /// # Errors
    ///
    /// [`GraphError::NodeNotFound`] if the node is absent.
    pub fn update_node_config(&self, id: &NodeId, config: NodeConfig) -> Result<Pipeline, GraphError> {
        let idx = self.require_node(id)?;
        let mut next = self.clone();
        next.nodes[idx].config = config;
        Ok(next)
    }

    /// Moves a node on the canvas.
    pub fn move_node(&self, id: &NodeId, position: Position) -> Result<Pipeline, GraphError> {
        let idx = self.require_node(id)?;
        let mut next = self.clone();
        next.nodes[idx].position = position;
        Ok(next)
    }

    /// Records a status delivered by the external result stream.
    pub fn set_node_status(&self, id: &NodeId, status: NodeStatus) -> Result<Pipeline, GraphError> {
        let idx = self.require_node(id)?;
        let mut next = self.clone();
        next.nodes[idx].status = status;
        Ok(next)
    }

    #[must_use]
    pub fn with_canvas(&self, canvas: CanvasConfig) -> Pipeline {
        Self {
            canvas: CanvasConfig::new(canvas.zoom, canvas.pan),
            ..self.clone()
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Rebuilds `(source, target)` pairs from the nodes' `outputs` lists.
    pub fn connections_from_projection(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes
            .iter()
            .flat_map(|n| n.outputs.iter().map(move |t| (n.id.clone(), t.clone())))
            .collect()
    }

    /// `true` when both the `outputs` and the `inputs` projections match the
    /// connection set as multisets.
    pub fn is_projection_consistent(&self) -> bool {
        let mut expected: Vec<(NodeId, NodeId)> = self
            .connections
            .iter()
            .map(|c| (c.source_node_id.clone(), c.target_node_id.clone()))
            .collect();
        expected.sort();

        let mut from_outputs = self.connections_from_projection();
        from_outputs.sort();

        let mut from_inputs: Vec<(NodeId, NodeId)> = self
            .nodes
            .iter()
            .flat_map(|n| n.inputs.iter().map(move |s| (s.clone(), n.id.clone())))
            .collect();
        from_inputs.sort();

        expected == from_outputs && expected == from_inputs
    }

    /// Node ids in an order where every connection points forward, or `None`
    /// if the connections contain a cycle.
    ///
    /// Ties are broken by node insertion order, so the result is deterministic.
    pub fn topological_order(&self) -> Option<Vec<NodeId>> {
        let mut in_degree: HashMap<&NodeId, usize> =
            self.nodes.iter().map(|n| (&n.id, n.inputs.len())).collect();
        let mut ready: VecDeque<&PipelineNode> =
            self.nodes.iter().filter(|n| n.inputs.is_empty()).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_front() {
            order.push(node.id.clone());
            for target in &node.outputs {
                if let Some(degree) = in_degree.get_mut(target) {
                    *degree -= 1;
                    if *degree == 0 {
                        if let Some(next) = self.node(target) {
                            ready.push_back(next);
                        }
                    }
                }
            }
        }

        (order.len() == self.nodes.len()).then_some(order)
    }

    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_some()
    }

    /// Validates every node's config against its template schema.
    pub fn validate_configs(&self, registry: &TemplateRegistry) -> PipelineReport {
        let mut report = PipelineReport::default();
        for node in &self.nodes {
            match registry.get(&node.template_id) {
                Some(template) => {
                    let errors = validate_config(&template.config_schema, &node.config);
                    if !errors.is_empty() {
                        report.field_errors.insert(node.id.clone(), errors);
                    }
                }
                None => report.missing_templates.push(node.id.clone()),
            }
        }
        report
    }
}

/// Result of [`Pipeline::validate_configs`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    /// Nodes with at least one failing field.
    pub field_errors: BTreeMap<NodeId, FieldErrors>,
    /// Nodes whose template is no longer in the registry.
    pub missing_templates: Vec<NodeId>,
}

impl PipelineReport {
    /// `true` when every node's config satisfies its schema.
    pub fn is_clean(&self) -> bool {
        self.field_errors.is_empty() && self.missing_templates.is_empty()
    }

    pub fn errors_for(&self, id: &NodeId) -> Option<&FieldErrors> {
        self.field_errors.get(id)
    }
}
