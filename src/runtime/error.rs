// SPDX-License-Identifier: MIT

//! Typed error handling for taskgraph-rs
//!
//! Construction-time problems are fatal and surface as
//! [`GraphValidationError`]. Everything that goes wrong while a run is in
//! flight is contained by the engine and recorded in the execution log.

use thiserror::Error;

/// Top-level error type for taskgraph-rs
#[derive(Debug, Error)]
pub enum TaskGraphError {
    /// The graph definition is malformed
    #[error("Graph validation error: {0}")]
    GraphValidation(#[from] GraphValidationError),

    /// No tool is registered under the requested name
    #[error("Tool '{name}' not found in registry")]
    ToolNotFound { name: String },

    /// A tool returned a failure (or its task died)
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// Configuration errors (invalid env values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite storage errors
    #[error("Database error: {0}")]
    Database(String),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Problems detected while compiling a graph definition
#[derive(Debug, Error, PartialEq)]
pub enum GraphValidationError {
    /// The start node does not name any node in the graph
    #[error("Start node '{0}' is not defined")]
    UnknownStartNode(String),

    /// Two nodes share the same name
    #[error("Node '{0}' is defined more than once")]
    DuplicateNode(String),

    /// An edge leaves a node that does not exist
    #[error("Edge source '{0}' is not defined")]
    UnknownEdgeSource(String),

    /// A loop node was declared without a continuation condition
    #[error("Loop node '{0}' has no loop condition")]
    MissingLoopCondition(String),
}

/// Errors raised while parsing or evaluating a condition expression.
///
/// These never escape the engine: a failing condition counts as `false`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConditionError {
    /// Malformed expression text
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// Expression referenced a key that is not in the state
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    /// Operands of the wrong type for an operator
    #[error("Type error: {0}")]
    Type(String),

    /// Division or modulo by zero
    #[error("Division by zero")]
    DivisionByZero,
}

impl TaskGraphError {
    /// Create a tool not found error
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    /// Create a tool execution error
    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a database error
    pub fn database(message: impl std::fmt::Display) -> Self {
        Self::Database(message.to_string())
    }
}

impl ConditionError {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }
}

impl From<String> for TaskGraphError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
