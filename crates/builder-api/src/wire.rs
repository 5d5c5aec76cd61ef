//! JSON request and response bodies of the visual-builder endpoints.

use std::collections::BTreeMap;

use pipeline::{NodeConfig, NodeId, NodeTemplate, Position, RemoteRequestError, TemplateId};
use serde::{Deserialize, Serialize};

/// Body of `POST {pipeline_id}/`.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub(crate) enum ActionBody<'a> {
    AddNode {
        node_type: &'a TemplateId,
        position: Position,
        config: &'a NodeConfig,
    },
    ConnectNodes {
        source_node_id: &'a NodeId,
        target_node_id: &'a NodeId,
    },
    Execute,
}

/// Entries are kept raw so one undecodable template does not sink the catalog.
#[derive(Debug, Deserialize)]
pub(crate) struct TemplatesResponse {
    pub node_templates: BTreeMap<String, Vec<serde_json::Value>>,
}

impl TemplatesResponse {
    /// Decodes each template on its own, skipping the ones that fail.
    pub fn into_catalog(self) -> BTreeMap<String, Vec<NodeTemplate>> {
        self.node_templates
            .into_iter()
            .map(|(category, entries)| {
                let templates = entries
                    .into_iter()
                    .filter_map(|entry| {
                        let id = entry.get("id").cloned().unwrap_or_default();
                        match serde_json::from_value::<NodeTemplate>(entry) {
                            Ok(template) => Some(template),
                            Err(e) => {
                                tracing::warn!(%category, template_id = %id, error = %e, "skipping undecodable node template");
                                None
                            }
                        }
                    })
                    .collect();
                (category, templates)
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatePipelineResponse {
    pub pipeline_id: WireId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddNodeResponse {
    pub node_id: WireId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectNodesResponse {
    pub connection_id: WireId,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExecuteResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "execution_id")]
    pub run_id: Option<WireId>,
}

/// A service-assigned id, sent either as a JSON string or a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Text(String),
    Number(serde_json::Number),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Text(s) => s,
            WireId::Number(n) => n.to_string(),
        }
    }

    /// Converts into a domain id, rejecting an empty value.
    pub fn into_id<T>(self, field: &str, make: fn(String) -> Option<T>) -> Result<T, RemoteRequestError> {
        make(self.into_string()).ok_or_else(|| RemoteRequestError::MalformedBody {
            message: format!("`{field}` is empty"),
        })
    }

    pub fn into_plain(self) -> String {
        self.into_string()
    }
}
