// SPDX-License-Identifier: MIT

//! Execution log records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runtime::StateData;

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
}

/// One entry of the append-only execution log
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionLogEntry {
    /// Node that ran
    pub node: String,
    /// When the step started
    pub timestamp: DateTime<Utc>,
    pub status: StepStatus,
    /// Failure message, present iff `status` is `Error`
    pub error: Option<String>,
    /// Loop pass number (1-based); absent for non-loop steps and no-op loops
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    /// Deep copy of the state data taken after the step
    pub state_snapshot: StateData,
}

impl ExecutionLogEntry {
    pub fn success(node: impl Into<String>, timestamp: DateTime<Utc>, snapshot: StateData) -> Self {
        Self {
            node: node.into(),
            timestamp,
            status: StepStatus::Success,
            error: None,
            iteration: None,
            state_snapshot: snapshot,
        }
    }

    pub fn failure(
        node: impl Into<String>,
        timestamp: DateTime<Utc>,
        error: impl Into<String>,
        snapshot: StateData,
    ) -> Self {
        Self {
            node: node.into(),
            timestamp,
            status: StepStatus::Error,
            error: Some(error.into()),
            iteration: None,
            state_snapshot: snapshot,
        }
    }

    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == StepStatus::Error
    }
}
