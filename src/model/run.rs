//! Run lifecycle and per-node execution logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{StateData, WorkflowState};

/// The lifecycle state of a [`Run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Constructed but not yet dispatched.
    Pending,
    /// Actively executing nodes.
    Running,
    /// Reached a terminal node with no error.
    Completed,
    /// Terminated by a tool error, an unknown node, or the iteration cap.
    Failed,
}

/// A record of one node's execution within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    /// The node that was executed.
    pub node_name: String,

    /// When the node execution began.
    pub timestamp: DateTime<Utc>,

    /// Payload snapshot taken before the node ran.
    pub input_state: StateData,

    /// The tool's returned payload on success, or `input_state` unchanged
    /// on failure.
    pub output_state: StateData,

    /// Wall-clock execution time, in milliseconds.
    pub execution_time_ms: f64,

    /// Whether the node executed without error.
    pub success: bool,

    /// Present if and only if `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One execution of one graph, from entry to termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Opaque identifier for this run.
    pub run_id: String,

    /// The graph being executed.
    pub graph_id: String,

    /// Current lifecycle status.
    pub status: RunStatus,

    /// The node currently executing, or about to execute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node: Option<String>,

    /// The run's current state.
    pub current_state: WorkflowState,

    /// Append-only log of node executions, in execution order.
    #[serde(default)]
    pub execution_logs: Vec<ExecutionLog>,

    /// When the run began dispatching nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the run reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Present if and only if `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Count of transitions into an already-visited node.
    #[serde(default)]
    pub iteration_count: usize,

    /// The hard cap on `iteration_count` before the run fails.
    pub max_iterations: usize,
}

impl Run {
    /// Construct a new, not-yet-started run against `graph_id`.
    pub fn new(graph_id: impl Into<String>, initial_state: WorkflowState, max_iterations: usize) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            graph_id: graph_id.into(),
            status: RunStatus::Pending,
            current_node: None,
            current_state: initial_state,
            execution_logs: Vec::new(),
            started_at: None,
            completed_at: None,
            error: None,
            iteration_count: 0,
            max_iterations,
        }
    }

    /// Total execution time across all logged nodes, in milliseconds.
    pub fn total_execution_time_ms(&self) -> f64 {
        self.execution_logs.iter().map(|log| log.execution_time_ms).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_is_pending_with_no_logs() {
        let run = Run::new("graph-1", WorkflowState::new(), 10);
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.execution_logs.is_empty());
        assert_eq!(run.iteration_count, 0);
        assert_eq!(run.max_iterations, 10);
    }

    #[test]
    fn total_execution_time_sums_logs() {
        let mut run = Run::new("graph-1", WorkflowState::new(), 10);
        run.execution_logs.push(ExecutionLog {
            node_name: "a".to_string(),
            timestamp: Utc::now(),
            input_state: Default::default(),
            output_state: Default::default(),
            execution_time_ms: 1.5,
            success: true,
            error: None,
        });
        run.execution_logs.push(ExecutionLog {
            node_name: "b".to_string(),
            timestamp: Utc::now(),
            input_state: Default::default(),
            output_state: Default::default(),
            execution_time_ms: 2.5,
            success: true,
            error: None,
        });
        assert_eq!(run.total_execution_time_ms(), 4.0);
    }
}
