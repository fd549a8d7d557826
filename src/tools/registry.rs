//! Tool registry - routes tool names to the connector that owns them

use std::collections::HashMap;

use tracing::warn;

use super::traits::{ToolConnector, ToolDescriptor};
use crate::error::{Error, Result};

/// Name -> connector routing table, built once after every connector is connected.
///
/// When two connectors expose the same tool name the first connector in
/// registration order wins; later duplicates are recorded and not advertised.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    routes: HashMap<String, usize>,
    descriptors: Vec<ToolDescriptor>,
    duplicates: Vec<String>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the routing table from connectors in registration order
    pub fn build(connectors: &[Box<dyn ToolConnector>]) -> Self {
        let mut registry = ToolRegistry::new();
        for (index, connector) in connectors.iter().enumerate() {
            for tool in connector.tools() {
                registry.register(index, connector.name(), tool);
            }
        }
        registry
    }

    fn register(&mut self, index: usize, connector_name: &str, tool: &ToolDescriptor) {
        if self.routes.contains_key(&tool.name) {
            warn!(
                "Tool '{}' from connector '{}' is shadowed by an earlier connector",
                tool.name, connector_name
            );
            self.duplicates.push(tool.name.clone());
            return;
        }
        self.routes.insert(tool.name.clone(), index);
        self.descriptors.push(tool.clone());
    }

    /// Index of the connector owning `tool_name`
    pub fn resolve(&self, tool_name: &str) -> Result<usize> {
        self.routes
            .get(tool_name)
            .copied()
            .ok_or_else(|| Error::ToolNotFound(tool_name.to_string()))
    }

    /// Advertised descriptors, in registration order, without duplicates
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    /// Names that were exposed by more than one connector
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    /// List tool names
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }
}
