// SPDX-License-Identifier: MIT

//! Building blocks shared by every part of the engine: the tool
//! capability and the error types.

pub mod error;
pub mod tool;

pub use error::{ConditionError, GraphValidationError, TaskGraphError};
pub use tool::{AsyncFnTool, FnTool, StateData, Tool, ToolResult};
