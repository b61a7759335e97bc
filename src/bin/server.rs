//! `workflow-server` boots the HTTP surface against a SQLite-backed
//! store, the process-wide tool registry, and the sample code-review
//! toolset.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use workflow_engine::api::{self, AppState};
use workflow_engine::storage::{GraphStore, SqliteStore};
use workflow_engine::tools::register_code_review_tools;
use workflow_engine::{Config, ToolRegistry};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(bind = %config.bind_address, db = %config.database_url, "starting workflow-server");

    let registry = ToolRegistry::global();
    register_code_review_tools(registry).expect("failed to register sample toolset");

    let store: Arc<dyn GraphStore> = Arc::new(
        SqliteStore::connect(&config.database_url)
            .await
            .expect("failed to connect to storage backend"),
    );

    let state = AppState {
        store,
        registry,
        default_max_iterations: config.default_max_iterations,
    };

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.bind_address));

    tracing::info!(addr = %listener.local_addr().unwrap(), "listening");

    axum::serve(listener, app)
        .await
        .expect("server error");
}
