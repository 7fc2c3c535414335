//! Name-indexed collection of tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::base_tool::{BaseTool, ToolError};
use super::taskmaster_tools::taskmaster_tools;
use crate::tracker::SharedTaskMaster;

/// Tools indexed by name. Listing preserves registration order.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn BaseTool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every tracker tool bound to `tracker`.
    pub fn with_taskmaster(tracker: &SharedTaskMaster) -> Self {
        let mut registry = Self::new();
        for tool in taskmaster_tools(tracker) {
            registry.register(tool);
        }
        registry
    }

    /// Register a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn BaseTool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            log::debug!("Replaced tool {}", name);
        } else {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BaseTool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tools in registration order.
    pub fn list(&self) -> Vec<Arc<dyn BaseTool>> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name).cloned())
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn clear(&mut self) {
        self.tools.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Run the named tool.
    pub async fn call(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        log::debug!("Calling tool {}", name);
        tool.arun(args).await
    }
}
