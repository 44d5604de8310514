// SPDX-License-Identifier: MIT

//! Schema types for graph definitions
//!
//! These are the serialized shapes accepted from YAML/JSON files and the
//! HTTP API.

use serde::{Deserialize, Serialize};

/// Default cap on loop-body passes per loop node visit
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// A complete workflow graph
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GraphDefinition {
    pub name: String,
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
    pub start_node: String,
}

/// How a node behaves when visited
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Run the tool once
    #[default]
    Standard,
    /// Same as standard; branching is driven by edge conditions
    Conditional,
    /// Run the tool while the loop condition holds, up to `max_iterations`
    Loop,
}

/// A node in the graph
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NodeConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    /// Registry key of the tool this node runs
    pub tool: String,
    /// Continuation condition (loop nodes)
    pub loop_condition: Option<String>,
    /// Pass cap (loop nodes); defaults to 10
    pub max_iterations: Option<u32>,
}

/// A directed, optionally conditional edge
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EdgeConfig {
    pub from_node: String,
    pub to_node: String,
    pub condition: Option<String>,
}

impl NodeConfig {
    pub fn standard(name: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: NodeType::Standard,
            tool: tool.into(),
            loop_condition: None,
            max_iterations: None,
        }
    }

    pub fn looping(
        name: impl Into<String>,
        tool: impl Into<String>,
        condition: impl Into<String>,
        max_iterations: u32,
    ) -> Self {
        Self {
            name: name.into(),
            node_type: NodeType::Loop,
            tool: tool.into(),
            loop_condition: Some(condition.into()),
            max_iterations: Some(max_iterations),
        }
    }
}

impl EdgeConfig {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_node: from.into(),
            to_node: to.into(),
            condition: None,
        }
    }

    pub fn when(from: impl Into<String>, to: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            from_node: from.into(),
            to_node: to.into(),
            condition: Some(condition.into()),
        }
    }

    /// The condition, if one is set and non-blank
    pub fn active_condition(&self) -> Option<&str> {
        self.condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_default() {
        assert_eq!(NodeType::default(), NodeType::Standard);
    }

    #[test]
    fn test_deserialize_graph() {
        let yaml = r#"
            name: Loop Test
            nodes:
              - name: prepare
                tool: prepare
              - name: loop
                type: loop
                tool: increment
                loop_condition: "counter < 5"
                max_iterations: 10
            edges:
              - from_node: prepare
                to_node: loop
            start_node: prepare
        "#;
        let graph: GraphDefinition = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].node_type, NodeType::Standard);
        assert_eq!(graph.nodes[1].node_type, NodeType::Loop);
        assert_eq!(graph.nodes[1].loop_condition.as_deref(), Some("counter < 5"));
        assert_eq!(graph.edges[0], EdgeConfig::new("prepare", "loop"));
    }

    #[test]
    fn test_edges_default_to_empty() {
        let json = r#"{"name": "g", "nodes": [{"name": "a", "tool": "t"}], "start_node": "a"}"#;
        let graph: GraphDefinition = serde_json::from_str(json).unwrap();
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_serialize_node_type_lowercase() {
        let node = NodeConfig::looping("l", "t", "x < 1", 3);
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "loop");
    }

    #[test]
    fn test_active_condition_ignores_blank() {
        assert_eq!(EdgeConfig::new("a", "b").active_condition(), None);
        assert_eq!(EdgeConfig::when("a", "b", "  ").active_condition(), None);
        assert_eq!(
            EdgeConfig::when("a", "b", " x > 1 ").active_condition(),
            Some("x > 1")
        );
    }
}
