//! Pipeline definition files.
//!
//! A definition describes a pipeline to build in TOML. Nodes are referred to
//! by a local `key` because the service assigns the real ids.
//!
//! ```toml
//! name = "Weekly churn"
//! industry = "retail"
//!
//! [[nodes]]
//! key = "orders"
//! template = "csv_source"
//! position = { x = 80.0, y = 120.0 }
//! config = { file = "orders.csv", has_header = "yes" }
//!
//! [[nodes]]
//! key = "dedupe"
//! template = "dedupe"
//!
//! [[connections]]
//! from = "orders"
//! to = "dedupe"
//! ```
//!
//! String config values are coerced through the field kind declared by the
//! template schema, so `has_header = "yes"` becomes a boolean.

use std::collections::{BTreeMap, HashSet};

use anyhow::{bail, Context};
use pipeline::{
    ConnectionId, NodeConfig, NodeId, NodeTemplate, Pipeline, PipelineReport, Position, TemplateId,
    TemplateRegistry,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub connections: Vec<ConnectionDefinition>,
}

#[derive(Debug, Deserialize)]
pub struct NodeDefinition {
    pub key: String,
    pub template: TemplateId,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub config: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionDefinition {
    pub from: String,
    pub to: String,
}

impl PipelineDefinition {
    /// Parses a definition and checks that node keys are unique and every
    /// connection refers to a declared key.
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let definition: Self = toml::from_str(contents).context("invalid pipeline definition")?;

        let mut keys = HashSet::new();
        for node in &definition.nodes {
            if !keys.insert(node.key.as_str()) {
                bail!("duplicate node key `{}`", node.key);
            }
        }
        for connection in &definition.connections {
            for key in [&connection.from, &connection.to] {
                if !keys.contains(key.as_str()) {
                    bail!("connection refers to unknown node key `{key}`");
                }
            }
        }
        Ok(definition)
    }

    pub fn empty_pipeline(&self) -> Pipeline {
        Pipeline::new(&self.name, &self.description, &self.industry)
    }
}

impl NodeDefinition {
    /// The node config: template defaults overlaid with the definition's values.
    pub fn resolve_config(&self, template: &NodeTemplate) -> anyhow::Result<NodeConfig> {
        let mut config = template.default_config();
        for (name, value) in &self.config {
            let value = match (template.config_schema.get(name), value) {
                (Some(field), toml::Value::String(raw)) => field.kind.coerce(raw),
                _ => serde_json::to_value(value)
                    .with_context(|| format!("config `{name}` of node `{}`", self.key))?,
            };
            config.insert(name.clone(), value);
        }
        Ok(config)
    }
}

/// Outcome of checking a definition against the template catalog without
/// contacting the service.
pub struct DraftCheck {
    pub graph: Pipeline,
    pub report: PipelineReport,
    /// Definition key of each drafted node, by draft id.
    pub keys: BTreeMap<NodeId, String>,
}

/// Builds the definition as a local graph with placeholder ids and validates
/// every node config.
pub fn draft(definition: &PipelineDefinition, registry: &TemplateRegistry) -> anyhow::Result<DraftCheck> {
    let mut graph = definition.empty_pipeline();
    let mut ids: BTreeMap<&str, NodeId> = BTreeMap::new();
    let mut keys = BTreeMap::new();

    for (index, node) in definition.nodes.iter().enumerate() {
        let id = NodeId::new(format!("draft-{}", index + 1)).context("draft node id")?;
        let (_, next) = graph
            .add_node(registry, &node.template, id.clone(), node.position)
            .with_context(|| format!("node `{}`", node.key))?;
        let template = registry.require(&node.template)?;
        graph = next.update_node_config(&id, node.resolve_config(template)?)?;
        ids.insert(node.key.as_str(), id.clone());
        keys.insert(id, node.key.clone());
    }

    for (index, connection) in definition.connections.iter().enumerate() {
        let id = ConnectionId::new(format!("draft-c{}", index + 1)).context("draft connection id")?;
        let (Some(source), Some(target)) = (ids.get(connection.from.as_str()), ids.get(connection.to.as_str())) else {
            bail!("connection {} -> {} refers to an unknown node", connection.from, connection.to);
        };
        let (_, next) = graph
            .connect(id, source, target)
            .with_context(|| format!("connection {} -> {}", connection.from, connection.to))?;
        graph = next;
    }

    let report = graph.validate_configs(registry);
    Ok(DraftCheck { graph, report, keys })
}
