//! The graph scheduler: walks nodes, dispatches tools, selects successors.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::condition;
use crate::model::graph::{GraphDefinition, NodeType};
use crate::model::run::{ExecutionLog, Run, RunStatus};
use crate::model::state::WorkflowState;
use crate::registry::ToolRegistry;
use crate::{EngineError, Result};

/// Executes graphs against the shared tool registry.
///
/// Stateless: all mutable state lives in the [`Run`] produced by each call
/// to [`GraphEngine::execute`]. A single engine instance can run any number
/// of graphs concurrently, since nothing here is shared across runs except
/// the registry itself (which is already internally synchronized).
pub struct GraphEngine<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> GraphEngine<'a> {
    /// Build an engine dispatching tools through `registry`.
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Execute `graph` from its entry point against `initial_state`.
    ///
    /// Always returns a [`Run`] in a terminal status (`Completed` or
    /// `Failed`): errors during execution are captured into the run rather
    /// than propagated, per the engine's error-handling contract. Only
    /// graph-construction-adjacent failures ever bubble out as an `Err`, and
    /// there are none at this layer: a [`GraphDefinition`] is already
    /// structurally validated by the time it reaches the engine.
    pub async fn execute(
        &self,
        graph: &GraphDefinition,
        initial_state: WorkflowState,
        max_iterations: usize,
    ) -> Run {
        self.execute_cancellable(graph, initial_state, max_iterations, CancellationToken::new())
            .await
    }

    /// As [`GraphEngine::execute`], but checked against `cancel` between
    /// node dispatches (never mid-tool-call).
    pub async fn execute_cancellable(
        &self,
        graph: &GraphDefinition,
        initial_state: WorkflowState,
        max_iterations: usize,
        cancel: CancellationToken,
    ) -> Run {
        let adjacency = build_adjacency(graph);

        let mut metadata = initial_state.metadata.clone();
        metadata.insert("graph_name".to_string(), serde_json::json!(graph.name));
        let mut run = Run::new(
            graph.graph_id.clone(),
            WorkflowState::with_data(initial_state.data, metadata),
            max_iterations,
        );
        run.status = RunStatus::Running;
        run.current_node = Some(graph.entry_point.clone());
        run.started_at = Some(Utc::now());

        let mut visited: HashSet<String> = HashSet::new();

        loop {
            if cancel.is_cancelled() {
                fail_run(&mut run, EngineError::Cancelled.to_string());
                break;
            }

            if run.iteration_count >= run.max_iterations {
                fail_run(
                    &mut run,
                    EngineError::IterationCapExceeded(run.iteration_count).to_string(),
                );
                break;
            }

            let Some(current_name) = run.current_node.clone() else {
                // No current node means we already reached a terminal state;
                // the loop condition below always exits before this can run
                // with current_node still Some and absent from the graph.
                break;
            };

            let Some(node) = graph.node(&current_name) else {
                fail_run(
                    &mut run,
                    EngineError::NotFound(format!("node '{current_name}' not found in graph")).to_string(),
                );
                break;
            };

            let log = self
                .execute_node(&current_name, node.node_type, node.tool_name.as_deref(), &run.current_state)
                .await;
            let success = log.success;
            let output = log.output_state.clone();
            let error = log.error.clone();
            run.execution_logs.push(log);

            if !success {
                run.status = RunStatus::Failed;
                run.error = error;
                run.completed_at = Some(Utc::now());
                break;
            }

            run.current_state.data = output;
            visited.insert(current_name.clone());

            let next = select_successor(&adjacency, &current_name, &run.current_state.data);

            match next {
                Some(next_name) => {
                    if visited.contains(&next_name) {
                        run.iteration_count += 1;
                    }
                    run.current_node = Some(next_name);
                }
                None => {
                    run.status = RunStatus::Completed;
                    run.completed_at = Some(Utc::now());
                    run.current_node = None;
                    break;
                }
            }
        }

        run
    }

    async fn execute_node(
        &self,
        node_name: &str,
        node_type: NodeType,
        tool_name: Option<&str>,
        state: &WorkflowState,
    ) -> ExecutionLog {
        let input_state = state.snapshot_data();
        let timestamp = Utc::now();
        let timer = Instant::now();
        let node_name_for_log = node_name.to_string();

        let result: Result<_> = match node_type {
            NodeType::Function => match tool_name {
                None => Err(EngineError::ToolFailure(
                    "FUNCTION node has no tool_name configured".to_string(),
                )),
                Some(name) => match self.registry.get(name) {
                    Ok(tool) => tool.call(input_state.clone()).await,
                    Err(err) => Err(err),
                },
            },
            NodeType::Conditional | NodeType::Start | NodeType::End => Ok(input_state.clone()),
        };

        let execution_time_ms = timer.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(output_state) => ExecutionLog {
                node_name: node_name_for_log,
                timestamp,
                input_state,
                output_state,
                execution_time_ms,
                success: true,
                error: None,
            },
            Err(err) => ExecutionLog {
                node_name: node_name_for_log,
                timestamp,
                output_state: input_state.clone(),
                input_state,
                execution_time_ms,
                success: false,
                error: Some(err.to_string()),
            },
        }
    }
}

fn fail_run(run: &mut Run, error: String) {
    run.status = RunStatus::Failed;
    run.error = Some(error);
    run.completed_at = Some(Utc::now());
    run.current_node = None;
}

/// `from_node -> ordered outgoing edges`, preserving declaration order.
fn build_adjacency<'g>(graph: &'g GraphDefinition) -> HashMap<&'g str, Vec<&'g crate::model::graph::EdgeDefinition>> {
    let mut adjacency: HashMap<&str, Vec<&crate::model::graph::EdgeDefinition>> = HashMap::new();
    for edge in &graph.edges {
        adjacency.entry(edge.from_node.as_str()).or_default().push(edge);
    }
    adjacency
}

/// Evaluate conditional edges first (in declaration order), then fall back
/// to the first unconditional edge. Returns `None` when no edge matches,
/// a legitimate terminal state, not an error.
fn select_successor(
    adjacency: &HashMap<&str, Vec<&crate::model::graph::EdgeDefinition>>,
    current: &str,
    data: &crate::model::state::StateData,
) -> Option<String> {
    let edges = adjacency.get(current)?;

    let (conditional, unconditional): (Vec<_>, Vec<_>) =
        edges.iter().partition(|e| e.condition.is_some());

    for edge in &conditional {
        let cond = edge.condition.as_deref().expect("partitioned on Some");
        if condition::evaluate(cond, data) {
            return Some(edge.to_node.clone());
        }
    }

    unconditional.first().map(|e| e.to_node.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::{EdgeDefinition, NodeDefinition};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn node(name: &str, node_type: NodeType, tool_name: Option<&str>) -> NodeDefinition {
        NodeDefinition {
            name: name.to_string(),
            node_type,
            tool_name: tool_name.map(str::to_string),
            config: None,
        }
    }

    fn edge(from: &str, to: &str, condition: Option<&str>) -> EdgeDefinition {
        EdgeDefinition {
            from_node: from.to_string(),
            to_node: to.to_string(),
            condition: condition.map(str::to_string),
            label: None,
        }
    }

    fn identity(state: crate::model::state::StateData) -> Result<crate::model::state::StateData> {
        Ok(state)
    }

    fn registry_with_identity() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register_fn("identity", "passthrough", false, identity).unwrap();
        registry
    }

    #[tokio::test]
    async fn linear_graph_completes_with_logs_in_order() {
        let registry = registry_with_identity();
        let nodes = vec![
            node("a", NodeType::Function, Some("identity")),
            node("b", NodeType::Function, Some("identity")),
            node("c", NodeType::Function, Some("identity")),
        ];
        let edges = vec![edge("a", "b", None), edge("b", "c", None)];
        let graph = GraphDefinition::new("g", None, nodes, edges, "a").unwrap();

        let mut state = WorkflowState::new();
        state.data.insert("x".to_string(), json!(1));

        let engine = GraphEngine::new(&registry);
        let run = engine.execute(&graph, state, 10).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.iteration_count, 0);
        assert_eq!(run.execution_logs.len(), 3);
        assert_eq!(run.current_state.data.get("x"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn conditional_branch_is_taken_over_default() {
        let registry = registry_with_identity();
        let nodes = vec![
            node("a", NodeType::Function, Some("identity")),
            node("b", NodeType::End, None),
            node("c", NodeType::End, None),
        ];
        let edges = vec![
            edge("a", "b", Some("state['x'] >= 10")),
            edge("a", "c", None),
        ];
        let graph = GraphDefinition::new("g", None, nodes, edges, "a").unwrap();
        let engine = GraphEngine::new(&registry);

        let mut high = WorkflowState::new();
        high.data.insert("x".to_string(), json!(10));
        let run = engine.execute(&graph, high, 10).await;
        assert_eq!(run.execution_logs.len(), 2);
        assert_eq!(run.execution_logs[1].node_name, "b");

        let mut low = WorkflowState::new();
        low.data.insert("x".to_string(), json!(5));
        let run2 = engine.execute(&graph, low, 10).await;
        assert_eq!(run2.execution_logs.len(), 2);
        assert_eq!(run2.execution_logs[1].node_name, "c");
    }

    #[tokio::test]
    async fn loop_fails_at_iteration_cap() {
        let registry = registry_with_identity();
        let nodes = vec![
            node("a", NodeType::Function, Some("identity")),
            node("b", NodeType::Function, Some("identity")),
        ];
        let edges = vec![edge("a", "b", None), edge("b", "a", Some("true"))];
        let graph = GraphDefinition::new("g", None, nodes, edges, "a").unwrap();

        let engine = GraphEngine::new(&registry);
        let run = engine.execute(&graph, WorkflowState::new(), 3).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.iteration_count, 3);
        assert!(run.error.unwrap().contains("iteration"));
    }

    #[tokio::test]
    async fn tool_failure_rolls_back_output_to_input_and_fails_run() {
        let registry = ToolRegistry::new();
        registry
            .register_fn("boom", "always fails", false, |_state| {
                Err(EngineError::ToolFailure("boom exploded".to_string()))
            })
            .unwrap();
        registry.register_fn("identity", "passthrough", false, identity).unwrap();

        let nodes = vec![
            node("a", NodeType::Function, Some("identity")),
            node("b", NodeType::Function, Some("boom")),
        ];
        let edges = vec![edge("a", "b", None)];
        let graph = GraphDefinition::new("g", None, nodes, edges, "a").unwrap();

        let engine = GraphEngine::new(&registry);
        let mut state = WorkflowState::new();
        state.data.insert("x".to_string(), json!(1));
        let run = engine.execute(&graph, state, 10).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.execution_logs.len(), 2);
        let failed_log = &run.execution_logs[1];
        assert!(!failed_log.success);
        assert_eq!(failed_log.output_state, failed_log.input_state);
        assert_eq!(run.error.as_deref(), Some(failed_log.error.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn unknown_tool_at_run_time_fails_that_node() {
        let registry = ToolRegistry::new();
        let nodes = vec![node("a", NodeType::Function, Some("ghost"))];
        let graph = GraphDefinition::new("g", None, nodes, vec![], "a").unwrap();

        let engine = GraphEngine::new(&registry);
        let run = engine.execute(&graph, WorkflowState::new(), 10).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.execution_logs.len(), 1);
        assert!(!run.execution_logs[0].success);
    }

    #[tokio::test]
    async fn unconditional_edge_declared_second_still_wins_as_fallback() {
        let registry = registry_with_identity();
        let nodes = vec![
            node("a", NodeType::Function, Some("identity")),
            node("b", NodeType::End, None),
            node("c", NodeType::End, None),
        ];
        let edges = vec![
            edge("a", "b", Some("state['k'] == 1")),
            edge("a", "c", None),
        ];
        let graph = GraphDefinition::new("g", None, nodes, edges, "a").unwrap();

        let engine = GraphEngine::new(&registry);
        let mut state = WorkflowState::new();
        state.data.insert("k".to_string(), json!(2));
        let run = engine.execute(&graph, state, 10).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.execution_logs.len(), 2);
    }

    #[tokio::test]
    async fn condition_error_does_not_fault_the_run() {
        let registry = registry_with_identity();
        let nodes = vec![
            node("a", NodeType::Function, Some("identity")),
            node("b", NodeType::End, None),
        ];
        let edges = vec![edge("a", "b", Some("state['missing']['deep']"))];
        let graph = GraphDefinition::new("g", None, nodes, edges, "a").unwrap();

        let engine = GraphEngine::new(&registry);
        let run = engine.execute(&graph, WorkflowState::new(), 10).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.error.is_none());
    }

    #[tokio::test]
    async fn cancellation_fails_the_run_between_nodes() {
        let registry = registry_with_identity();
        let nodes = vec![
            node("a", NodeType::Function, Some("identity")),
            node("b", NodeType::Function, Some("identity")),
        ];
        let edges = vec![edge("a", "b", None)];
        let graph = GraphDefinition::new("g", None, nodes, edges, "a").unwrap();

        let token = CancellationToken::new();
        token.cancel();

        let engine = GraphEngine::new(&registry);
        let run = engine
            .execute_cancellable(&graph, WorkflowState::new(), 10, token)
            .await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("run cancelled"));
        assert!(run.execution_logs.is_empty());
    }
}
