// SPDX-License-Identifier: MIT

//! Graph loader - YAML/JSON file loading and parsing

use super::types::GraphDefinition;
use crate::runtime::TaskGraphError;
use std::fs;
use std::path::Path;

/// Loads graph definitions from YAML or JSON files
pub struct GraphLoader;

impl GraphLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a graph definition from a file
    pub fn load_graph<P: AsRef<Path>>(&self, path: P) -> Result<GraphDefinition, TaskGraphError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a graph definition from a YAML (or JSON) string
    pub fn parse(content: &str) -> Result<GraphDefinition, TaskGraphError> {
        let def: GraphDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }
}

impl Default for GraphLoader {
    fn default() -> Self {
        Self::new()
    }
}
