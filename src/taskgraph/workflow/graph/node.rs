// SPDX-License-Identifier: MIT

//! Compiled graph nodes

use chrono::Utc;

use crate::runtime::{GraphValidationError, TaskGraphError};
use crate::taskgraph::workflow::condition::Condition;
use crate::taskgraph::workflow::registry::ToolRegistry;
use crate::taskgraph::workflow::state::{ExecutionLogEntry, ExecutionState};
use crate::taskgraph::workflow::types::{NodeConfig, NodeType, DEFAULT_MAX_ITERATIONS};

/// Node ready for execution
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub tool: String,
    pub node_type: NodeType,
    /// Compiled continuation condition; always set for loop nodes
    pub loop_condition: Option<Condition>,
    pub max_iterations: u32,
}

impl Node {
    pub fn from_config(config: &NodeConfig) -> Result<Self, GraphValidationError> {
        let loop_condition = config
            .loop_condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(Condition::compile);

        if config.node_type == NodeType::Loop && loop_condition.is_none() {
            return Err(GraphValidationError::MissingLoopCondition(
                config.name.clone(),
            ));
        }

        Ok(Self {
            name: config.name.clone(),
            tool: config.tool.clone(),
            node_type: config.node_type,
            loop_condition,
            max_iterations: config.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
        })
    }

    pub fn is_loop(&self) -> bool {
        self.node_type == NodeType::Loop
    }

    /// Execute the node against the state, returning the log entries it
    /// produced.
    ///
    /// Never fails outward: tool lookup and tool errors become `error`
    /// entries, and any update merged before the failure stays in `state`.
    pub async fn execute(
        &self,
        state: &mut ExecutionState,
        registry: &ToolRegistry,
    ) -> Vec<ExecutionLogEntry> {
        log::info!("Executing node: {}", self.name);

        match (&self.loop_condition, self.node_type) {
            (Some(condition), NodeType::Loop) => {
                self.execute_loop(condition, state, registry).await
            }
            _ => {
                let started = Utc::now();
                let entry = match self.run_tool(state, registry).await {
                    Ok(()) => ExecutionLogEntry::success(&self.name, started, state.snapshot()),
                    Err(e) => self.failure_entry(started, e, state),
                };
                vec![entry]
            }
        }
    }

    async fn execute_loop(
        &self,
        condition: &Condition,
        state: &mut ExecutionState,
        registry: &ToolRegistry,
    ) -> Vec<ExecutionLogEntry> {
        let entered = Utc::now();
        let mut entries = Vec::new();
        let mut pass = 0;

        while pass < self.max_iterations && condition.is_satisfied(state.data()) {
            pass += 1;
            let started = Utc::now();
            state.increment_iteration();

            match self.run_tool(state, registry).await {
                Ok(()) => {
                    log::info!("Loop iteration {} completed for node {}", pass, self.name);
                    entries.push(
                        ExecutionLogEntry::success(&self.name, started, state.snapshot())
                            .with_iteration(pass),
                    );
                }
                Err(e) => {
                    entries.push(self.failure_entry(started, e, state).with_iteration(pass));
                    return entries;
                }
            }
        }

        if pass > 0
            && pass == self.max_iterations
            && matches!(condition.try_evaluate(state.data()), Ok(true))
        {
            log::warn!(
                "Loop node '{}' stopped after reaching max_iterations ({})",
                self.name,
                self.max_iterations
            );
        }

        if entries.is_empty() {
            log::info!("Loop condition false on entry for node {}, skipping", self.name);
            entries.push(ExecutionLogEntry::success(
                &self.name,
                entered,
                state.snapshot(),
            ));
        }

        entries
    }

    async fn run_tool(
        &self,
        state: &mut ExecutionState,
        registry: &ToolRegistry,
    ) -> Result<(), TaskGraphError> {
        let tool = registry.get(&self.tool).await?;
        let update = tool
            .execute(state.data())
            .await
            .map_err(|e| TaskGraphError::tool_execution(&self.tool, e.to_string()))?;
        state.update(update);
        Ok(())
    }

    fn failure_entry(
        &self,
        started: chrono::DateTime<Utc>,
        error: TaskGraphError,
        state: &ExecutionState,
    ) -> ExecutionLogEntry {
        log::error!("Error executing node '{}': {}", self.name, error);
        ExecutionLogEntry::failure(&self.name, started, error.to_string(), state.snapshot())
    }
}
