// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};
use std::error::Error;
use std::future::Future;
use std::sync::Arc;

/// The key/value data threaded through a run
pub type StateData = Map<String, Value>;

/// What a tool hands back: a partial update to merge, or a failure
pub type ToolResult = Result<StateData, Box<dyn Error + Send + Sync>>;

/// A unit of work that a graph node invokes.
///
/// Tools receive a read-only view of the current state data and return the
/// keys they want merged back. Every tool, blocking or not, is driven through
/// this one async method; the wrappers below adapt plain closures.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool name
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does
    fn description(&self) -> &str;

    /// Run the tool against the current state data
    async fn execute(&self, state: &StateData) -> ToolResult;
}

type SyncToolFn = dyn Fn(&StateData) -> ToolResult + Send + Sync;
type AsyncToolFn = dyn Fn(StateData) -> BoxFuture<'static, ToolResult> + Send + Sync;

/// Adapts a synchronous closure into a [`Tool`].
///
/// The closure runs on tokio's blocking pool so CPU-bound work never stalls
/// the scheduler thread driving the run.
pub struct FnTool {
    name: String,
    description: String,
    func: Arc<SyncToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&StateData) -> ToolResult + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            description: format!("Function tool: {}", name),
            name,
            func: Arc::new(func),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, state: &StateData) -> ToolResult {
        let func = Arc::clone(&self.func);
        let input = state.clone();
        match tokio::task::spawn_blocking(move || func(&input)).await {
            Ok(result) => result,
            Err(e) => Err(format!("tool task aborted: {}", e).into()),
        }
    }
}

/// Adapts an async closure into a [`Tool`]
pub struct AsyncFnTool {
    name: String,
    description: String,
    func: Box<AsyncToolFn>,
}

impl AsyncFnTool {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(StateData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        let name = name.into();
        Self {
            description: format!("Async function tool: {}", name),
            name,
            func: Box::new(move |state| func(state).boxed()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Tool for AsyncFnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, state: &StateData) -> ToolResult {
        (self.func)(state.clone()).await
    }
}
