//! SQLite-backed [`super::GraphStore`], matching the schema the originating
//! FastAPI service persisted to via `aiosqlite`.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::GraphStore;
use crate::model::{
    EdgeDefinition, ExecutionLog, GraphDefinition, NodeDefinition, Run, RunStatus, WorkflowState,
};
use crate::{EngineError, Result};

/// A connection pool backing [`super::GraphStore`] with two tables: `graphs`
/// and `runs`.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `database_url` (e.g. `sqlite://data/workflow.db`) and
    /// ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| EngineError::Storage(format!("invalid sqlite url '{database_url}': {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to connect to sqlite: {e}")))?;

        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS graphs (
                graph_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                nodes TEXT NOT NULL,
                edges TEXT NOT NULL,
                entry_point TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to create graphs table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                graph_id TEXT NOT NULL,
                status TEXT NOT NULL,
                current_node TEXT,
                current_state TEXT NOT NULL,
                execution_logs TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                error TEXT,
                iteration_count INTEGER NOT NULL DEFAULT 0,
                max_iterations INTEGER NOT NULL DEFAULT 10,
                FOREIGN KEY (graph_id) REFERENCES graphs(graph_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to create runs table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_graph_id ON runs(graph_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to create graph_id index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status)")
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Storage(format!("failed to create status index: {e}")))?;

        Ok(())
    }

    fn status_to_str(status: RunStatus) -> &'static str {
        match status {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    fn status_from_str(s: &str) -> Result<RunStatus> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(EngineError::Storage(format!("unknown run status '{other}'"))),
        }
    }

    async fn upsert_run(&self, run: &Run) -> Result<()> {
        let current_state_json = serde_json::to_string(&run.current_state)?;
        let execution_logs_json = serde_json::to_string(&run.execution_logs)?;

        sqlx::query(
            r#"
            INSERT INTO runs (
                run_id, graph_id, status, current_node, current_state,
                execution_logs, started_at, completed_at, error,
                iteration_count, max_iterations
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                status = excluded.status,
                current_node = excluded.current_node,
                current_state = excluded.current_state,
                execution_logs = excluded.execution_logs,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                error = excluded.error,
                iteration_count = excluded.iteration_count,
                max_iterations = excluded.max_iterations
            "#,
        )
        .bind(&run.run_id)
        .bind(&run.graph_id)
        .bind(Self::status_to_str(run.status))
        .bind(&run.current_node)
        .bind(current_state_json)
        .bind(execution_logs_json)
        .bind(run.started_at.map(|t| t.to_rfc3339()))
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .bind(&run.error)
        .bind(run.iteration_count as i64)
        .bind(run.max_iterations as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(format!("failed to save run: {e}")))?;

        Ok(())
    }

    fn run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Run> {
        let current_state_json: String = row.try_get("current_state").map_err(sqlx_err)?;
        let execution_logs_json: String = row.try_get("execution_logs").map_err(sqlx_err)?;
        let status_str: String = row.try_get("status").map_err(sqlx_err)?;
        let started_at: Option<String> = row.try_get("started_at").map_err(sqlx_err)?;
        let completed_at: Option<String> = row.try_get("completed_at").map_err(sqlx_err)?;

        let current_state: WorkflowState = serde_json::from_str(&current_state_json)?;
        let execution_logs: Vec<ExecutionLog> = serde_json::from_str(&execution_logs_json)?;

        Ok(Run {
            run_id: row.try_get("run_id").map_err(sqlx_err)?,
            graph_id: row.try_get("graph_id").map_err(sqlx_err)?,
            status: Self::status_from_str(&status_str)?,
            current_node: row.try_get("current_node").map_err(sqlx_err)?,
            current_state,
            execution_logs,
            started_at: parse_timestamp(started_at)?,
            completed_at: parse_timestamp(completed_at)?,
            error: row.try_get("error").map_err(sqlx_err)?,
            iteration_count: row.try_get::<i64, _>("iteration_count").map_err(sqlx_err)? as usize,
            max_iterations: row.try_get::<i64, _>("max_iterations").map_err(sqlx_err)? as usize,
        })
    }

    fn graph_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<GraphDefinition> {
        let nodes_json: String = row.try_get("nodes").map_err(sqlx_err)?;
        let edges_json: String = row.try_get("edges").map_err(sqlx_err)?;
        let created_at: String = row.try_get("created_at").map_err(sqlx_err)?;

        let nodes: Vec<NodeDefinition> = serde_json::from_str(&nodes_json)?;
        let edges: Vec<EdgeDefinition> = serde_json::from_str(&edges_json)?;

        Ok(GraphDefinition::from_parts(
            row.try_get("graph_id").map_err(sqlx_err)?,
            row.try_get("name").map_err(sqlx_err)?,
            row.try_get("description").map_err(sqlx_err)?,
            nodes,
            edges,
            row.try_get("entry_point").map_err(sqlx_err)?,
            created_at
                .parse::<DateTime<Utc>>()
                .map_err(|e| EngineError::Storage(format!("invalid created_at timestamp: {e}")))?,
        ))
    }
}

fn sqlx_err(e: sqlx::Error) -> EngineError {
    EngineError::Storage(e.to_string())
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            s.parse::<DateTime<Utc>>()
                .map_err(|e| EngineError::Storage(format!("invalid timestamp '{s}': {e}")))
        })
        .transpose()
}

#[async_trait]
impl GraphStore for SqliteStore {
    async fn save_graph(&self, graph: &GraphDefinition) -> Result<()> {
        let nodes_json = serde_json::to_string(&graph.nodes)?;
        let edges_json = serde_json::to_string(&graph.edges)?;

        sqlx::query(
            r#"
            INSERT INTO graphs (graph_id, name, description, nodes, edges, entry_point, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(graph_id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                nodes = excluded.nodes,
                edges = excluded.edges,
                entry_point = excluded.entry_point
            "#,
        )
        .bind(&graph.graph_id)
        .bind(&graph.name)
        .bind(&graph.description)
        .bind(nodes_json)
        .bind(edges_json)
        .bind(&graph.entry_point)
        .bind(graph.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        tracing::info!(graph_id = %graph.graph_id, "saved graph");
        Ok(())
    }

    async fn get_graph(&self, graph_id: &str) -> Result<Option<GraphDefinition>> {
        let row = sqlx::query("SELECT * FROM graphs WHERE graph_id = ?")
            .bind(graph_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;

        row.as_ref().map(Self::graph_from_row).transpose()
    }

    async fn list_graphs(&self) -> Result<Vec<GraphDefinition>> {
        let rows = sqlx::query("SELECT * FROM graphs ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;

        rows.iter().map(Self::graph_from_row).collect()
    }

    async fn delete_graph(&self, graph_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM graphs WHERE graph_id = ?")
            .bind(graph_id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_run(&self, run: &Run) -> Result<()> {
        self.upsert_run(run).await?;
        tracing::info!(run_id = %run.run_id, status = ?run.status, "saved run");
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        let row = sqlx::query("SELECT * FROM runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;

        row.as_ref().map(Self::run_from_row).transpose()
    }

    async fn update_run(&self, run: &Run) -> Result<()> {
        self.upsert_run(run).await
    }

    async fn list_runs(&self, graph_id: Option<&str>, limit: usize) -> Result<Vec<Run>> {
        let rows = if let Some(graph_id) = graph_id {
            sqlx::query(
                "SELECT * FROM runs WHERE graph_id = ? ORDER BY started_at DESC LIMIT ?",
            )
            .bind(graph_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?
        } else {
            sqlx::query("SELECT * FROM runs ORDER BY started_at DESC LIMIT ?")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(sqlx_err)?
        };

        rows.iter().map(Self::run_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeDefinition as Edge, NodeDefinition as Node, NodeType};

    async fn fresh_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn sample_graph() -> GraphDefinition {
        let nodes = vec![Node {
            name: "a".to_string(),
            node_type: NodeType::Start,
            tool_name: None,
            config: None,
        }];
        let edges: Vec<Edge> = vec![];
        GraphDefinition::new("sample", Some("desc".to_string()), nodes, edges, "a").unwrap()
    }

    #[tokio::test]
    async fn save_then_get_graph_round_trips_node_order() {
        let store = fresh_store().await;
        let graph = sample_graph();
        store.save_graph(&graph).await.unwrap();

        let fetched = store.get_graph(&graph.graph_id).await.unwrap().unwrap();
        assert_eq!(fetched.graph_id, graph.graph_id);
        assert_eq!(fetched.nodes[0].name, "a");
        assert_eq!(fetched.entry_point, "a");
    }

    #[tokio::test]
    async fn save_then_get_run_round_trips_logs() {
        let store = fresh_store().await;
        let mut run = Run::new("g1", WorkflowState::new(), 10);
        run.status = RunStatus::Completed;
        run.execution_logs.push(ExecutionLog {
            node_name: "a".to_string(),
            timestamp: Utc::now(),
            input_state: Default::default(),
            output_state: Default::default(),
            execution_time_ms: 1.0,
            success: true,
            error: None,
        });

        store.save_run(&run).await.unwrap();
        let fetched = store.get_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(fetched.execution_logs.len(), 1);
        assert_eq!(fetched.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn get_missing_run_returns_none() {
        let store = fresh_store().await;
        assert!(store.get_run("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_runs_filters_by_graph() {
        let store = fresh_store().await;
        for graph_id in ["g1", "g1", "g2"] {
            store.save_run(&Run::new(graph_id, WorkflowState::new(), 10)).await.unwrap();
        }

        let filtered = store.list_runs(Some("g1"), 10).await.unwrap();
        assert_eq!(filtered.len(), 2);
    }
}
