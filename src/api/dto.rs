//! Wire shapes for the `/graph/*` and `/health` routes.
//!
//! These are deliberately distinct from the core [`crate::model`] types:
//! the core owns `GraphDefinition` and `Run` as its execution contract,
//! while these structs own the JSON shape documented at the request
//! surface and may reshape/flatten fields for API ergonomics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{EdgeDefinition, ExecutionLog, NodeDefinition, RunStatus, StateData};

/// Body of `POST /graph/create`.
#[derive(Debug, Deserialize)]
pub struct CreateGraphRequest {
    /// Human-readable graph name.
    pub name: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// The graph's nodes, in declaration order.
    pub nodes: Vec<NodeDefinition>,
    /// The graph's edges, in declaration order.
    pub edges: Vec<EdgeDefinition>,
    /// The node execution starts from.
    pub entry_point: String,
}

/// 201 response for `POST /graph/create`.
#[derive(Debug, Serialize)]
pub struct CreateGraphResponse {
    /// The newly assigned graph id.
    pub graph_id: String,
    /// Human-readable confirmation, matching the originating service's shape.
    pub message: String,
}

/// Body of `POST /graph/run`.
#[derive(Debug, Deserialize)]
pub struct RunGraphRequest {
    /// The graph to execute.
    pub graph_id: String,
    /// The initial payload handed to the entry node.
    #[serde(default)]
    pub initial_state: StateData,
    /// Overrides the server's default iteration cap when present.
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

/// 200 response for `POST /graph/run`.
///
/// The source exposed a `RunGraphResponse` model but the route itself
/// returned an ad-hoc dict; this struct normalizes that gap into one
/// concrete wire shape, per the decision recorded in `DESIGN.md`.
#[derive(Debug, Serialize)]
pub struct RunGraphResponse {
    /// The completed (or failed) run's id.
    pub run_id: String,
    /// Terminal status: `completed` or `failed`.
    pub status: RunStatus,
    /// The run's payload at termination.
    pub final_state: StateData,
    /// Every node execution, in execution order.
    pub execution_logs: Vec<ExecutionLog>,
    /// Sum of every log's `execution_time_ms`.
    pub total_execution_time_ms: f64,
    /// `run.iteration_count` at termination.
    pub iterations_completed: usize,
}

/// 200 response for `GET /graph/state/{run_id}`.
#[derive(Debug, Serialize)]
pub struct RunStateResponse {
    /// The run's id.
    pub run_id: String,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Node currently executing or about to execute; `None` at termination.
    pub current_node: Option<String>,
    /// The run's current payload.
    pub current_state: StateData,
    /// `run.iteration_count`.
    pub iterations_completed: usize,
    /// When the run began dispatching nodes.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

/// One entry in `GET /graph/list`'s `graphs` array.
#[derive(Debug, Serialize)]
pub struct GraphSummary {
    /// The graph's id.
    pub graph_id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Number of nodes in the graph.
    pub node_count: usize,
    /// Number of edges in the graph.
    pub edge_count: usize,
    /// The node execution starts from.
    pub entry_point: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// 200 response for `GET /graph/list`.
#[derive(Debug, Serialize)]
pub struct ListGraphsResponse {
    /// `graphs.len()`.
    pub count: usize,
    /// Every stored graph, summarized.
    pub graphs: Vec<GraphSummary>,
}

/// 200 response for `GET /graph/runs/{graph_id}`.
#[derive(Debug, Serialize)]
pub struct ListRunsResponse {
    /// The graph runs are listed for.
    pub graph_id: String,
    /// The graph's name, for display without a second lookup.
    pub graph_name: String,
    /// `runs.len()`.
    pub count: usize,
    /// The matching runs, most recent first.
    pub runs: Vec<RunStateResponse>,
}

/// 200 response for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the process can answer requests at all.
    pub status: &'static str,
    /// Free-form description of the active storage backend.
    pub storage: Value,
}
