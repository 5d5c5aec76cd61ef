//! Node templates and the template registry.
//!
//! Templates are read-only and served by the visual-builder service as a map
//! of category to template list. [`TemplateRegistry`] flattens that map into a
//! lookup by [`TemplateId`] while keeping the category grouping for display.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{default_config, ConfigSchema, NodeConfig};
use crate::{GraphError, NodeKind, TemplateId};

/// Read-only description of a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplate {
    pub id: TemplateId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    /// Display grouping. Filled from the catalog key when the entry omits it.
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub config_schema: ConfigSchema,
}

impl NodeTemplate {
    /// A config pre-filled with the schema's defaults.
    pub fn default_config(&self) -> NodeConfig {
        default_config(&self.config_schema)
    }

    fn matches_keyword(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        [&self.name, &self.description, &self.category]
            .iter()
            .any(|field| field.to_lowercase().contains(&keyword))
    }
}

/// Catalog of node templates, indexed by id.
///
/// Iteration order is stable: categories sort by name, and templates keep the
/// order the service listed them in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateRegistry {
    templates: Vec<NodeTemplate>,
}

impl TemplateRegistry {
    /// Builds a registry from the service's `{category: [template]}` catalog.
    ///
    /// A later duplicate of an already-seen template id is dropped.
    pub fn from_catalog(catalog: BTreeMap<String, Vec<NodeTemplate>>) -> Self {
        let mut registry = Self::default();
        for (category, templates) in catalog {
            for mut template in templates {
                if template.category.is_empty() {
                    template.category = category.clone();
                }
                if registry.get(&template.id).is_some() {
                    tracing::warn!(template_id = %template.id, "duplicate node template ignored");
                    continue;
                }
                registry.templates.push(template);
            }
        }
        registry
    }

    /// Builds a registry from an already-flat template list.
    pub fn from_templates(templates: impl IntoIterator<Item = NodeTemplate>) -> Self {
        let mut catalog: BTreeMap<String, Vec<NodeTemplate>> = BTreeMap::new();
        for template in templates {
            catalog
                .entry(template.category.clone())
                .or_default()
                .push(template);
        }
        Self::from_catalog(catalog)
    }

    pub fn get(&self, id: &TemplateId) -> Option<&NodeTemplate> {
        self.templates.iter().find(|t| &t.id == id)
    }

    /// Looks up a template, failing with [`GraphError::TemplateNotFound`].
    pub fn require(&self, id: &TemplateId) -> Result<&NodeTemplate, GraphError> {
        self.get(id).ok_or_else(|| GraphError::TemplateNotFound {
            template_id: id.clone(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeTemplate> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Category names in display order.
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for template in &self.templates {
            if !categories.contains(&template.category.as_str()) {
                categories.push(&template.category);
            }
        }
        categories
    }

    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a NodeTemplate> {
        self.templates.iter().filter(move |t| t.category == category)
    }

    /// Templates whose name, description, or category mention `keyword`
    /// (case-insensitive). Used to narrow the palette to an industry.
    pub fn matching<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a NodeTemplate> {
        self.templates
            .iter()
            .filter(move |t| t.matches_keyword(keyword))
    }
}
