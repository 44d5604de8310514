// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! This module compiles a graph definition into a `WorkflowEngine` that
//! walks nodes along their edges, threading one state through the run.

pub mod executor;
mod node;

pub use executor::{ExecutionOutcome, Termination, WorkflowEngine, DEFAULT_MAX_STEPS};
pub use node::Node;
