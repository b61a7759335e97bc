//! axum-based JSON API exposing graph creation, execution, state
//! inspection, and listing.
//!
//! Mirrors the originating FastAPI service's route surface
//! (`app/main.rs` in spirit): the engine itself is transport-agnostic,
//! this module is the thin collaborator that serializes a [`Run`] and
//! maps engine errors onto HTTP status codes.

mod dto;
mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::registry::ToolRegistry;
use crate::storage::GraphStore;

/// Shared state handed to every handler: the persistence collaborator and
/// a handle to the tool registry the engine dispatches through.
#[derive(Clone)]
pub struct AppState {
    /// The graph/run persistence collaborator.
    pub store: Arc<dyn GraphStore>,

    /// The tool registry used to execute `FUNCTION` nodes. `'static`
    /// because production wires [`ToolRegistry::global`]; tests may hand in
    /// a leaked fresh registry to get the same reference shape.
    pub registry: &'static ToolRegistry,

    /// Iteration cap applied when a `/graph/run` request doesn't override it.
    pub default_max_iterations: usize,
}

/// Build the router described in the request-surface table: `/graph/*` plus
/// `/health`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/graph/create", post(handlers::create_graph))
        .route("/graph/run", post(handlers::run_graph))
        .route("/graph/state/:run_id", get(handlers::get_run_state))
        .route("/graph/list", get(handlers::list_graphs))
        .route("/graph/runs/:graph_id", get(handlers::list_runs))
        .route("/health", get(handlers::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub use dto::{
    CreateGraphRequest, CreateGraphResponse, GraphSummary, HealthResponse, ListGraphsResponse,
    ListRunsResponse, RunGraphRequest, RunGraphResponse, RunStateResponse,
};

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::storage::InMemoryStore;

    fn test_state() -> AppState {
        let registry: &'static ToolRegistry = Box::leak(Box::new(ToolRegistry::new()));
        registry
            .register_fn("identity", "passthrough", false, |state| Ok(state))
            .unwrap();

        AppState {
            store: Arc::new(InMemoryStore::new()),
            registry,
            default_max_iterations: 10,
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_run_and_inspect_round_trip() {
        let app = router(test_state());

        let create_body = json!({
            "name": "smoke",
            "nodes": [
                {"name": "a", "node_type": "function", "tool_name": "identity"},
                {"name": "b", "node_type": "end"}
            ],
            "edges": [
                {"from_node": "a", "to_node": "b"}
            ],
            "entry_point": "a"
        });

        let create_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/graph/create")
                    .header("content-type", "application/json")
                    .body(Body::from(create_body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(create_response.status(), StatusCode::CREATED);
        let created = body_json(create_response).await;
        let graph_id = created["graph_id"].as_str().unwrap().to_string();

        let run_body = json!({"graph_id": graph_id, "initial_state": {"x": 1}});
        let run_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/graph/run")
                    .header("content-type", "application/json")
                    .body(Body::from(run_body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(run_response.status(), StatusCode::OK);
        let run = body_json(run_response).await;
        assert_eq!(run["status"], json!("completed"));
        let run_id = run["run_id"].as_str().unwrap().to_string();

        let state_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/graph/state/{run_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(state_response.status(), StatusCode::OK);
        let state_body = body_json(state_response).await;
        assert_eq!(state_body["run_id"], json!(run_id));
    }

    #[tokio::test]
    async fn run_unknown_graph_returns_404() {
        let app = router(test_state());

        let run_body = json!({"graph_id": "ghost", "initial_state": {}});
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/graph/run")
                    .header("content-type", "application/json")
                    .body(Body::from(run_body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn state_for_unknown_run_returns_404() {
        let app = router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/graph/state/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_graph_returns_400() {
        let app = router(test_state());

        let create_body = json!({
            "name": "bad",
            "nodes": [{"name": "a", "node_type": "start"}],
            "edges": [],
            "entry_point": "missing"
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/graph/create")
                    .header("content-type", "application/json")
                    .body(Body::from(create_body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], json!("ok"));
    }
}
