// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `ExecutionState` - the data and run metadata threaded through one run
//! - `ExecutionLogEntry` - the per-step record appended to the execution log

mod entry;
mod store;

pub use entry::{ExecutionLogEntry, StepStatus};
pub use store::{ExecutionState, StateMetadata};
