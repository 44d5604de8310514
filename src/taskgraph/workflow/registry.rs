// SPDX-License-Identifier: MIT

use crate::runtime::{TaskGraphError, Tool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name-to-tool mapping shared by every engine built from it.
///
/// Cloning is cheap and clones see the same tools. Populate it before
/// starting runs; lookups during a run only take the read lock.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a tool under `name`; a later registration replaces it
    pub async fn register(&self, name: impl Into<String>, tool: Arc<dyn Tool>) {
        let name = name.into();
        let mut tools = self.tools.write().await;
        if tools.insert(name.clone(), tool).is_some() {
            log::info!("Replaced tool: {}", name);
        } else {
            log::info!("Registered tool: {}", name);
        }
    }

    /// Register a tool under its own name
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.register(name, tool).await;
    }

    pub async fn get(&self, name: &str) -> Result<Arc<dyn Tool>, TaskGraphError> {
        let tools = self.tools.read().await;
        tools
            .get(name)
            .cloned()
            .ok_or_else(|| TaskGraphError::tool_not_found(name))
    }

    /// Registered tool names, sorted
    pub async fn list(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
