//! Graph workflow executor

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::node::Node;
use crate::runtime::{GraphValidationError, StateData, TaskGraphError};
use crate::taskgraph::workflow::condition::Condition;
use crate::taskgraph::workflow::registry::ToolRegistry;
use crate::taskgraph::workflow::state::{ExecutionLogEntry, ExecutionState};
use crate::taskgraph::workflow::types::GraphDefinition;

/// Default cap on node visits per run
pub const DEFAULT_MAX_STEPS: usize = 1000;

/// Outgoing edge with its condition compiled
#[derive(Debug, Clone)]
struct CompiledEdge {
    to_node: String,
    condition: Option<Condition>,
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// No outgoing edge matched
    Completed,
    /// A non-loop node was reached a second time
    CycleDetected { node: String },
    /// An edge led to a node that is not in the graph
    UnknownNode { node: String },
    /// The run visited `limit` nodes and still had somewhere to go
    StepLimit { limit: usize },
}

impl Termination {
    pub fn is_completed(&self) -> bool {
        matches!(self, Termination::Completed)
    }
}

/// Everything a run hands back
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub state: ExecutionState,
    pub log: Vec<ExecutionLogEntry>,
    pub termination: Termination,
}

impl ExecutionOutcome {
    /// True if any step recorded an error
    pub fn has_errors(&self) -> bool {
        self.log.iter().any(ExecutionLogEntry::is_error)
    }
}

/// Graph-based workflow engine.
///
/// Holds only the compiled graph, so one engine can drive any number of
/// concurrent runs; all run state lives in the `ExecutionState` each
/// `execute` call creates.
pub struct WorkflowEngine {
    name: String,
    start_node: String,
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Vec<CompiledEdge>>,
    registry: ToolRegistry,
    max_steps: usize,
}

impl WorkflowEngine {
    /// Compile a graph definition, validating its structure
    pub fn new(definition: &GraphDefinition, registry: ToolRegistry) -> Result<Self, TaskGraphError> {
        let mut nodes = HashMap::new();
        for config in &definition.nodes {
            let node = Node::from_config(config)?;
            if nodes.insert(config.name.clone(), node).is_some() {
                return Err(GraphValidationError::DuplicateNode(config.name.clone()).into());
            }
        }

        let mut edges: HashMap<String, Vec<CompiledEdge>> = HashMap::new();
        for edge in &definition.edges {
            if !nodes.contains_key(&edge.from_node) {
                return Err(GraphValidationError::UnknownEdgeSource(edge.from_node.clone()).into());
            }
            if !nodes.contains_key(&edge.to_node) {
                log::warn!(
                    "Edge {} -> {} points at an undefined node",
                    edge.from_node,
                    edge.to_node
                );
            }
            edges
                .entry(edge.from_node.clone())
                .or_default()
                .push(CompiledEdge {
                    to_node: edge.to_node.clone(),
                    condition: edge.active_condition().map(Condition::compile),
                });
        }

        if !nodes.contains_key(&definition.start_node) {
            return Err(GraphValidationError::UnknownStartNode(definition.start_node.clone()).into());
        }

        log::info!(
            "Built workflow engine '{}' with {} nodes and {} edges",
            definition.name,
            nodes.len(),
            definition.edges.len()
        );

        Ok(Self {
            name: definition.name.clone(),
            start_node: definition.start_node.clone(),
            nodes,
            edges,
            registry,
            max_steps: DEFAULT_MAX_STEPS,
        })
    }

    /// Override the per-run step limit
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_node(&self) -> &str {
        &self.start_node
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Run the graph from the start node until no next node is selected.
    ///
    /// Tool failures never abort the run; they show up as `error` entries
    /// in the returned log.
    pub async fn execute(&self, initial_state: StateData) -> ExecutionOutcome {
        let mut state = ExecutionState::new(initial_state);
        let mut execution_log: Vec<ExecutionLogEntry> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = Some(self.start_node.as_str());
        let mut visits = 0;

        let termination = loop {
            let Some(name) = current else {
                break Termination::Completed;
            };

            let Some(node) = self.nodes.get(name) else {
                log::error!("Node '{}' not found, stopping execution", name);
                break Termination::UnknownNode {
                    node: name.to_string(),
                };
            };

            if !visited.insert(name) && !node.is_loop() {
                log::warn!("Cycle detected at node '{}', stopping execution", name);
                break Termination::CycleDetected {
                    node: name.to_string(),
                };
            }

            let entries = node.execute(&mut state, &self.registry).await;
            visits += 1;
            execution_log.extend(entries);

            current = self.next_node(name, &state);

            if current.is_some() && visits >= self.max_steps {
                log::warn!(
                    "Workflow '{}' reached the step limit ({}), stopping execution",
                    self.name,
                    self.max_steps
                );
                break Termination::StepLimit {
                    limit: self.max_steps,
                };
            }
        };

        log::info!(
            "Workflow '{}' finished after {} steps ({} log entries): {:?}",
            self.name,
            visits,
            execution_log.len(),
            termination
        );

        ExecutionOutcome {
            state,
            log: execution_log,
            termination,
        }
    }

    /// Pick the next node: first matching conditional edge in declaration
    /// order, else the first unconditional edge
    fn next_node(&self, current: &str, state: &ExecutionState) -> Option<&str> {
        let edges = self.edges.get(current)?;

        edges
            .iter()
            .find(|edge| {
                edge.condition
                    .as_ref()
                    .is_some_and(|condition| condition.is_satisfied(state.data()))
            })
            .or_else(|| edges.iter().find(|edge| edge.condition.is_none()))
            .map(|edge| edge.to_node.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FnTool;
    use crate::taskgraph::workflow::state::StepStatus;
    use crate::taskgraph::workflow::types::{EdgeConfig, NodeConfig};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn data(value: Value) -> StateData {
        value.as_object().cloned().unwrap()
    }

    fn int(state: &StateData, key: &str) -> i64 {
        state.get(key).and_then(Value::as_i64).unwrap_or(0)
    }

    async fn test_registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry
            .register(
                "add_ten",
                Arc::new(FnTool::new("add_ten", |s| {
                    Ok(data(json!({"value": int(s, "value") + 10})))
                })),
            )
            .await;
        registry
            .register(
                "multiply_by_two",
                Arc::new(FnTool::new("multiply_by_two", |s| {
                    Ok(data(json!({"value": int(s, "value") * 2})))
                })),
            )
            .await;
        registry
            .register(
                "check_threshold",
                Arc::new(FnTool::new("check_threshold", |s| {
                    Ok(data(json!({"passed": int(s, "value") > 50})))
                })),
            )
            .await;
        registry
            .register(
                "increment",
                Arc::new(FnTool::new("increment", |s| {
                    Ok(data(json!({"counter": int(s, "counter") + 1})))
                })),
            )
            .await;
        registry
            .register(
                "fail",
                Arc::new(FnTool::new("fail", |_| Err("tool exploded".into()))),
            )
            .await;
        registry
    }

    fn graph(nodes: Vec<NodeConfig>, edges: Vec<EdgeConfig>, start: &str) -> GraphDefinition {
        GraphDefinition {
            name: "test".to_string(),
            nodes,
            edges,
            start_node: start.to_string(),
        }
    }

    fn visited(outcome: &ExecutionOutcome) -> Vec<&str> {
        outcome.log.iter().map(|e| e.node.as_str()).collect()
    }

    #[tokio::test]
    async fn test_simple_workflow() {
        let def = graph(
            vec![
                NodeConfig::standard("add", "add_ten"),
                NodeConfig::standard("multiply", "multiply_by_two"),
            ],
            vec![EdgeConfig::new("add", "multiply")],
            "add",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        let outcome = engine.execute(data(json!({"value": 5}))).await;

        assert_eq!(outcome.state.get("value"), Some(&json!(30)));
        assert_eq!(outcome.log.len(), 2);
        assert_eq!(outcome.termination, Termination::Completed);
        assert!(!outcome.has_errors());
    }

    #[tokio::test]
    async fn test_linear_graph_visits_in_edge_order() {
        let def = graph(
            vec![
                NodeConfig::standard("d", "increment"),
                NodeConfig::standard("b", "increment"),
                NodeConfig::standard("a", "increment"),
                NodeConfig::standard("c", "increment"),
            ],
            vec![
                EdgeConfig::new("a", "b"),
                EdgeConfig::new("b", "c"),
                EdgeConfig::new("c", "d"),
            ],
            "a",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        let outcome = engine.execute(StateData::new()).await;

        assert_eq!(visited(&outcome), vec!["a", "b", "c", "d"]);
        assert_eq!(outcome.state.get("counter"), Some(&json!(4)));
        assert_eq!(outcome.log[1].state_snapshot.get("counter"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_conditional_branching() {
        let def = graph(
            vec![
                NodeConfig::standard("add", "add_ten"),
                NodeConfig::standard("check", "check_threshold"),
                NodeConfig::standard("multiply", "multiply_by_two"),
            ],
            vec![
                EdgeConfig::new("add", "check"),
                EdgeConfig::when("check", "multiply", "passed == True"),
            ],
            "add",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        let passing = engine.execute(data(json!({"value": 50}))).await;
        assert_eq!(passing.state.get("passed"), Some(&json!(true)));
        assert_eq!(passing.state.get("value"), Some(&json!(120)));
        assert_eq!(visited(&passing), vec!["add", "check", "multiply"]);

        let failing = engine.execute(data(json!({"value": 1}))).await;
        assert_eq!(failing.state.get("passed"), Some(&json!(false)));
        assert_eq!(visited(&failing), vec!["add", "check"]);
        assert!(failing.termination.is_completed());
    }

    #[tokio::test]
    async fn test_first_matching_condition_wins() {
        let def = graph(
            vec![
                NodeConfig::standard("start", "increment"),
                NodeConfig::standard("first", "add_ten"),
                NodeConfig::standard("second", "multiply_by_two"),
            ],
            vec![
                EdgeConfig::when("start", "first", "counter >= 1"),
                EdgeConfig::when("start", "second", "counter > 0"),
            ],
            "start",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        for _ in 0..5 {
            let outcome = engine.execute(StateData::new()).await;
            assert_eq!(visited(&outcome), vec!["start", "first"]);
        }
    }

    #[tokio::test]
    async fn test_conditional_edges_take_priority_over_unconditional() {
        let def = graph(
            vec![
                NodeConfig::standard("start", "increment"),
                NodeConfig::standard("fallback", "add_ten"),
                NodeConfig::standard("branch", "multiply_by_two"),
            ],
            vec![
                EdgeConfig::new("start", "fallback"),
                EdgeConfig::when("start", "branch", "counter == 1"),
            ],
            "start",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        let outcome = engine.execute(StateData::new()).await;
        assert_eq!(visited(&outcome), vec!["start", "branch"]);
    }

    #[tokio::test]
    async fn test_malformed_condition_is_never_selected() {
        let def = graph(
            vec![
                NodeConfig::standard("start", "increment"),
                NodeConfig::standard("broken", "add_ten"),
                NodeConfig::standard("fallback", "multiply_by_two"),
            ],
            vec![
                EdgeConfig::when("start", "broken", "counter ==="),
                EdgeConfig::new("start", "fallback"),
            ],
            "start",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        let outcome = engine.execute(StateData::new()).await;
        assert_eq!(visited(&outcome), vec!["start", "fallback"]);
    }

    #[tokio::test]
    async fn test_loop_node() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = ToolRegistry::new();
        registry
            .register(
                "increment",
                Arc::new(FnTool::new("increment", move |s| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(data(json!({"counter": int(s, "counter") + 1})))
                })),
            )
            .await;

        let def = graph(
            vec![NodeConfig::looping("loop", "increment", "counter < 5", 10)],
            vec![],
            "loop",
        );
        let engine = WorkflowEngine::new(&def, registry).unwrap();

        let outcome = engine.execute(data(json!({"counter": 0}))).await;

        assert_eq!(outcome.state.get("counter"), Some(&json!(5)));
        assert!(outcome.state.iteration_count() >= 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(outcome.log.len(), 5);
        assert!(outcome.log.iter().all(|e| e.node == "loop"));
    }

    #[tokio::test]
    async fn test_loop_node_may_be_revisited() {
        let def = graph(
            vec![NodeConfig::looping("loop", "increment", "counter < 5", 2)],
            vec![EdgeConfig::when("loop", "loop", "counter < 5")],
            "loop",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        let outcome = engine.execute(data(json!({"counter": 0}))).await;

        assert_eq!(outcome.state.get("counter"), Some(&json!(5)));
        assert_eq!(outcome.state.iteration_count(), 5);
        assert_eq!(outcome.termination, Termination::Completed);
    }

    #[tokio::test]
    async fn test_failing_tool_is_contained() {
        let def = graph(
            vec![
                NodeConfig::standard("add", "add_ten"),
                NodeConfig::standard("explode", "fail"),
                NodeConfig::standard("multiply", "multiply_by_two"),
            ],
            vec![
                EdgeConfig::new("add", "explode"),
                EdgeConfig::new("explode", "multiply"),
            ],
            "add",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        let outcome = engine.execute(data(json!({"value": 5}))).await;

        assert_eq!(visited(&outcome), vec!["add", "explode", "multiply"]);
        let failed = &outcome.log[1];
        assert_eq!(failed.status, StepStatus::Error);
        assert!(failed.error.as_deref().is_some_and(|e| e.contains("tool exploded")));
        assert_eq!(failed.state_snapshot, outcome.log[0].state_snapshot);
        assert_eq!(outcome.state.get("value"), Some(&json!(30)));
        assert!(outcome.has_errors());
        assert!(outcome.termination.is_completed());
    }

    #[tokio::test]
    async fn test_unregistered_tool_is_step_failure() {
        let def = graph(
            vec![
                NodeConfig::standard("ghost", "not_registered"),
                NodeConfig::standard("add", "add_ten"),
            ],
            vec![EdgeConfig::new("ghost", "add")],
            "ghost",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        let outcome = engine.execute(data(json!({"value": 1}))).await;

        assert_eq!(outcome.log[0].status, StepStatus::Error);
        assert_eq!(outcome.log[0].state_snapshot, data(json!({"value": 1})));
        assert_eq!(outcome.state.get("value"), Some(&json!(11)));
    }

    #[tokio::test]
    async fn test_cycle_halts_without_logging_revisit() {
        let def = graph(
            vec![
                NodeConfig::standard("a", "increment"),
                NodeConfig::standard("b", "increment"),
                NodeConfig::standard("x", "increment"),
            ],
            vec![
                EdgeConfig::new("a", "x"),
                EdgeConfig::new("x", "b"),
                EdgeConfig::when("b", "x", "counter < 10"),
            ],
            "a",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        let outcome = engine.execute(StateData::new()).await;

        assert_eq!(visited(&outcome), vec!["a", "x", "b"]);
        assert_eq!(
            outcome.termination,
            Termination::CycleDetected {
                node: "x".to_string()
            }
        );
        assert!(!outcome.has_errors());
    }

    #[tokio::test]
    async fn test_cycle_back_to_start_halts() {
        let def = graph(
            vec![
                NodeConfig::standard("a", "increment"),
                NodeConfig::standard("b", "increment"),
            ],
            vec![EdgeConfig::new("a", "b"), EdgeConfig::new("b", "a")],
            "a",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        let outcome = engine.execute(StateData::new()).await;

        assert_eq!(visited(&outcome), vec!["a", "b"]);
        assert_eq!(outcome.state.get("counter"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_dangling_edge_terminates_run() {
        let def = graph(
            vec![NodeConfig::standard("a", "increment")],
            vec![EdgeConfig::new("a", "nowhere")],
            "a",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        let outcome = engine.execute(StateData::new()).await;

        assert_eq!(outcome.log.len(), 1);
        assert_eq!(
            outcome.termination,
            Termination::UnknownNode {
                node: "nowhere".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_step_limit_stops_spinning_loop() {
        let def = graph(
            vec![NodeConfig::looping("spin", "increment", "counter < 0", 10)],
            vec![EdgeConfig::new("spin", "spin")],
            "spin",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await)
            .unwrap()
            .with_max_steps(5);

        let outcome = engine.execute(StateData::new()).await;

        assert_eq!(outcome.log.len(), 5);
        assert_eq!(outcome.termination, Termination::StepLimit { limit: 5 });
    }

    #[tokio::test]
    async fn test_long_loop_counts_as_one_step() {
        let def = graph(
            vec![
                NodeConfig::looping("count", "increment", "counter < 1500", 2000),
                NodeConfig::standard("fin", "add_ten"),
            ],
            vec![EdgeConfig::new("count", "fin")],
            "count",
        );
        let engine = WorkflowEngine::new(&def, test_registry().await).unwrap();

        let outcome = engine.execute(data(json!({"counter": 0}))).await;

        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(outcome.log.len(), 1501);
        assert_eq!(outcome.log.last().map(|e| e.node.as_str()), Some("fin"));
        assert_eq!(outcome.state.get("counter"), Some(&json!(1500)));
        assert_eq!(outcome.state.get("value"), Some(&json!(10)));
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_engine() {
        let def = graph(
            vec![
                NodeConfig::standard("add", "add_ten"),
                NodeConfig::standard("multiply", "multiply_by_two"),
            ],
            vec![EdgeConfig::new("add", "multiply")],
            "add",
        );
        let engine = Arc::new(WorkflowEngine::new(&def, test_registry().await).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.execute(data(json!({"value": i}))).await })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let outcome = handle.await.unwrap();
            assert_eq!(outcome.state.get("value"), Some(&json!((i as i64 + 10) * 2)));
        }
    }

    #[tokio::test]
    async fn test_validation_unknown_start_node() {
        let def = graph(vec![NodeConfig::standard("a", "increment")], vec![], "missing");
        let err = WorkflowEngine::new(&def, ToolRegistry::new()).err().unwrap();
        assert!(matches!(
            err,
            TaskGraphError::GraphValidation(GraphValidationError::UnknownStartNode(ref n)) if n == "missing"
        ));
    }

    #[tokio::test]
    async fn test_validation_duplicate_node() {
        let def = graph(
            vec![
                NodeConfig::standard("a", "increment"),
                NodeConfig::standard("a", "add_ten"),
            ],
            vec![],
            "a",
        );
        let err = WorkflowEngine::new(&def, ToolRegistry::new()).err().unwrap();
        assert!(matches!(
            err,
            TaskGraphError::GraphValidation(GraphValidationError::DuplicateNode(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_unknown_edge_source() {
        let def = graph(
            vec![NodeConfig::standard("a", "increment")],
            vec![EdgeConfig::new("ghost", "a")],
            "a",
        );
        let err = WorkflowEngine::new(&def, ToolRegistry::new()).err().unwrap();
        assert!(matches!(
            err,
            TaskGraphError::GraphValidation(GraphValidationError::UnknownEdgeSource(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_loop_without_condition() {
        let mut node = NodeConfig::looping("loop", "increment", "x", 3);
        node.loop_condition = None;
        let def = graph(vec![node], vec![], "loop");

        let err = WorkflowEngine::new(&def, ToolRegistry::new()).err().unwrap();
        assert!(matches!(
            err,
            TaskGraphError::GraphValidation(GraphValidationError::MissingLoopCondition(_))
        ));
    }
}
