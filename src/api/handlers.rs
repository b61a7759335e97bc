//! Route handlers: structural validation at ingress, engine dispatch,
//! error-to-status-code mapping.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::dto::{
    CreateGraphRequest, CreateGraphResponse, GraphSummary, HealthResponse, ListGraphsResponse,
    ListRunsResponse, RunGraphRequest, RunGraphResponse, RunStateResponse,
};
use super::AppState;
use crate::engine::GraphEngine;
use crate::model::{GraphDefinition, Run};
use crate::EngineError;

/// Maps the core error kinds onto the status codes the request surface
/// documents: structural errors to 400, not-found to 404, everything else
/// (tool failures surfaced as a top-level error, storage errors) to 500.
fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::GraphStructure(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(err: &EngineError) -> Json<serde_json::Value> {
    Json(json!({ "error": err.to_string() }))
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn to_api_error(err: EngineError) -> ApiError {
    let status = status_for(&err);
    let body = error_body(&err);
    (status, body)
}

pub async fn create_graph(
    State(state): State<AppState>,
    Json(body): Json<CreateGraphRequest>,
) -> Result<(StatusCode, Json<CreateGraphResponse>), ApiError> {
    let graph = GraphDefinition::new(
        body.name,
        body.description,
        body.nodes,
        body.edges,
        body.entry_point,
    )
    .map_err(to_api_error)?;

    state.store.save_graph(&graph).await.map_err(to_api_error)?;

    tracing::info!(graph_id = %graph.graph_id, "graph created");

    Ok((
        StatusCode::CREATED,
        Json(CreateGraphResponse {
            graph_id: graph.graph_id,
            message: "graph created successfully".to_string(),
        }),
    ))
}

pub async fn run_graph(
    State(state): State<AppState>,
    Json(body): Json<RunGraphRequest>,
) -> Result<Json<RunGraphResponse>, ApiError> {
    let graph = state
        .store
        .get_graph(&body.graph_id)
        .await
        .map_err(to_api_error)?
        .ok_or_else(|| {
            to_api_error(EngineError::NotFound(format!(
                "graph '{}' not found",
                body.graph_id
            )))
        })?;

    let max_iterations = body.max_iterations.unwrap_or(state.default_max_iterations);
    let initial_state =
        crate::model::WorkflowState::with_data(body.initial_state, crate::model::StateData::new());

    let engine = GraphEngine::new(state.registry);
    let run = engine.execute(&graph, initial_state, max_iterations).await;

    state.store.save_run(&run).await.map_err(to_api_error)?;

    tracing::info!(run_id = %run.run_id, status = ?run.status, "run completed");

    Ok(Json(run_to_response(run)))
}

pub async fn get_run_state(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RunStateResponse>, ApiError> {
    let run = state
        .store
        .get_run(&run_id)
        .await
        .map_err(to_api_error)?
        .ok_or_else(|| to_api_error(EngineError::NotFound(format!("run '{run_id}' not found"))))?;

    Ok(Json(run_to_state_response(run)))
}

pub async fn list_graphs(
    State(state): State<AppState>,
) -> Result<Json<ListGraphsResponse>, ApiError> {
    let graphs = state.store.list_graphs().await.map_err(to_api_error)?;

    let summaries: Vec<GraphSummary> = graphs
        .into_iter()
        .map(|g| GraphSummary {
            graph_id: g.graph_id,
            name: g.name,
            description: g.description,
            node_count: g.nodes.len(),
            edge_count: g.edges.len(),
            entry_point: g.entry_point,
            created_at: g.created_at,
        })
        .collect();

    Ok(Json(ListGraphsResponse {
        count: summaries.len(),
        graphs: summaries,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

pub async fn list_runs(
    Path(graph_id): Path<String>,
    Query(query): Query<ListRunsQuery>,
    State(state): State<AppState>,
) -> Result<Json<ListRunsResponse>, ApiError> {
    let graph = state
        .store
        .get_graph(&graph_id)
        .await
        .map_err(to_api_error)?
        .ok_or_else(|| {
            to_api_error(EngineError::NotFound(format!("graph '{graph_id}' not found")))
        })?;

    let runs = state
        .store
        .list_runs(Some(&graph_id), query.limit)
        .await
        .map_err(to_api_error)?;

    let runs: Vec<RunStateResponse> = runs.into_iter().map(run_to_state_response).collect();

    Ok(Json(ListRunsResponse {
        graph_id,
        graph_name: graph.name,
        count: runs.len(),
        runs,
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let storage = match state.store.list_graphs().await {
        Ok(graphs) => json!({ "connected": true, "graph_count": graphs.len() }),
        Err(err) => json!({ "connected": false, "error": err.to_string() }),
    };

    Json(HealthResponse {
        status: "ok",
        storage,
    })
}

fn run_to_response(run: Run) -> RunGraphResponse {
    let total_execution_time_ms = run.total_execution_time_ms();
    RunGraphResponse {
        run_id: run.run_id,
        status: run.status,
        final_state: run.current_state.data,
        execution_logs: run.execution_logs,
        total_execution_time_ms,
        iterations_completed: run.iteration_count,
    }
}

fn run_to_state_response(run: Run) -> RunStateResponse {
    RunStateResponse {
        run_id: run.run_id,
        status: run.status,
        current_node: run.current_node,
        current_state: run.current_state.data,
        iterations_completed: run.iteration_count,
        started_at: run.started_at,
        completed_at: run.completed_at,
    }
}

