// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runtime::{StateData, TaskGraphError};

/// Run metadata carried next to the data
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StateMetadata {
    pub created_at: DateTime<Utc>,
    /// Loop-body passes executed so far, across every loop node of the run
    #[serde(default)]
    pub iteration_count: u64,
}

impl Default for StateMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            iteration_count: 0,
        }
    }
}

/// Mutable state owned by a single run.
///
/// Updates are shallow merges: keys are inserted or overwritten, never
/// removed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionState {
    #[serde(default)]
    data: StateData,
    #[serde(default)]
    metadata: StateMetadata,
}

impl ExecutionState {
    /// Create a fresh state from caller-supplied data
    pub fn new(data: StateData) -> Self {
        Self {
            data,
            metadata: StateMetadata::default(),
        }
    }

    /// Create an empty state
    pub fn empty() -> Self {
        Self::new(StateData::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a value, falling back to `default` when the key is absent
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.data.get(key).cloned().unwrap_or(default)
    }

    /// Get a nested value using dot notation (e.g., "result.intent")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.data.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Merge a partial update into the data, overwriting on collision
    pub fn update(&mut self, updates: StateData) {
        for (key, value) in updates {
            self.data.insert(key, value);
        }
    }

    pub fn increment_iteration(&mut self) {
        self.metadata.iteration_count += 1;
    }

    pub fn iteration_count(&self) -> u64 {
        self.metadata.iteration_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.metadata.created_at
    }

    pub fn metadata(&self) -> &StateMetadata {
        &self.metadata
    }

    pub fn data(&self) -> &StateData {
        &self.data
    }

    pub fn into_data(self) -> StateData {
        self.data
    }

    /// Independent deep copy of the data, for log entries
    pub fn snapshot(&self) -> StateData {
        self.data.clone()
    }

    /// Convert to the persisted `{data, metadata}` form
    pub fn to_json(&self) -> Result<Value, TaskGraphError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a state from its persisted form
    pub fn from_json(value: Value) -> Result<Self, TaskGraphError> {
        Ok(serde_json::from_value(value)?)
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<StateData> for ExecutionState {
    fn from(data: StateData) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_from(value: Value) -> ExecutionState {
        ExecutionState::new(value.as_object().cloned().unwrap())
    }

    #[test]
    fn test_empty_state() {
        let state = ExecutionState::empty();
        assert!(state.get("anything").is_none());
        assert_eq!(state.iteration_count(), 0);
    }

    #[test]
    fn test_get_or_default() {
        let state = state_from(json!({"value": 5}));
        assert_eq!(state.get_or("value", json!(0)), json!(5));
        assert_eq!(state.get_or("missing", json!(0)), json!(0));
    }

    #[test]
    fn test_update_merges_and_overwrites() {
        let mut state = state_from(json!({"a": 1, "b": 2}));
        state.update(json!({"b": 20, "c": 30}).as_object().cloned().unwrap());

        assert_eq!(state.get("a"), Some(&json!(1)));
        assert_eq!(state.get("b"), Some(&json!(20)));
        assert_eq!(state.get("c"), Some(&json!(30)));
    }

    #[test]
    fn test_update_never_removes_keys() {
        let mut state = state_from(json!({"keep": true}));
        state.update(StateData::new());
        assert_eq!(state.get("keep"), Some(&json!(true)));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut state = state_from(json!({"items": [1, 2]}));
        let snapshot = state.snapshot();

        state.set("items", json!([1, 2, 3]));

        assert_eq!(snapshot.get("items"), Some(&json!([1, 2])));
        assert_eq!(state.get("items"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn test_increment_iteration() {
        let mut state = ExecutionState::empty();
        state.increment_iteration();
        state.increment_iteration();
        assert_eq!(state.iteration_count(), 2);
    }

    #[test]
    fn test_get_path() {
        let state = state_from(json!({"result": {"data": {"value": 42}}}));

        assert_eq!(state.get_path("result.data"), Some(&json!({"value": 42})));
        assert_eq!(state.get_path("result.data.value"), Some(&json!(42)));
        assert_eq!(state.get_path("result.nonexistent"), None);
    }

    #[test]
    fn test_json_round_trip() {
        let mut state = state_from(json!({"value": 5, "nested": {"list": ["a", "b"]}}));
        state.increment_iteration();

        let persisted = state.to_json().unwrap();
        assert_eq!(persisted["data"]["value"], 5);
        assert_eq!(persisted["metadata"]["iteration_count"], 1);

        let restored = ExecutionState::from_json(persisted).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_from_json_without_metadata() {
        let restored = ExecutionState::from_json(json!({"data": {"x": 1}})).unwrap();
        assert_eq!(restored.get("x"), Some(&json!(1)));
        assert_eq!(restored.iteration_count(), 0);
    }
}
