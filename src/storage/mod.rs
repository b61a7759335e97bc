//! Persistence of graphs and runs, behind a storage trait.
//!
//! The engine itself never touches storage: a [`GraphStore`] is a
//! collaborator the HTTP surface uses to persist what it creates and runs.
//! Two implementations ship: [`InMemoryStore`] for tests and ephemeral
//! deployments, and [`SqliteStore`] as the default for a real process.

mod sqlite;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::model::{GraphDefinition, Run};
use crate::Result;

pub use sqlite::SqliteStore;

/// Durable storage for graphs and runs.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Persist a graph. Overwrites any existing graph with the same id.
    async fn save_graph(&self, graph: &GraphDefinition) -> Result<()>;

    /// Fetch a graph by id.
    async fn get_graph(&self, graph_id: &str) -> Result<Option<GraphDefinition>>;

    /// List every stored graph, most recently created first.
    async fn list_graphs(&self) -> Result<Vec<GraphDefinition>>;

    /// Delete a graph by id. Returns whether a row was removed.
    async fn delete_graph(&self, graph_id: &str) -> Result<bool>;

    /// Persist a new run.
    async fn save_run(&self, run: &Run) -> Result<()>;

    /// Fetch a run by id.
    async fn get_run(&self, run_id: &str) -> Result<Option<Run>>;

    /// Overwrite an existing run (used by a future mid-flight checkpointing
    /// path; the current engine only calls [`GraphStore::save_run`] once,
    /// after the run reaches a terminal state).
    async fn update_run(&self, run: &Run) -> Result<()>;

    /// List runs, most recent first, optionally filtered to one graph.
    async fn list_runs(&self, graph_id: Option<&str>, limit: usize) -> Result<Vec<Run>>;
}

/// An in-process, non-durable [`GraphStore`].
#[derive(Default)]
pub struct InMemoryStore {
    graphs: RwLock<HashMap<String, GraphDefinition>>,
    runs: RwLock<HashMap<String, Run>>,
}

impl InMemoryStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryStore {
    async fn save_graph(&self, graph: &GraphDefinition) -> Result<()> {
        self.graphs.write().insert(graph.graph_id.clone(), graph.clone());
        Ok(())
    }

    async fn get_graph(&self, graph_id: &str) -> Result<Option<GraphDefinition>> {
        Ok(self.graphs.read().get(graph_id).cloned())
    }

    async fn list_graphs(&self) -> Result<Vec<GraphDefinition>> {
        let mut graphs: Vec<GraphDefinition> = self.graphs.read().values().cloned().collect();
        graphs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(graphs)
    }

    async fn delete_graph(&self, graph_id: &str) -> Result<bool> {
        Ok(self.graphs.write().remove(graph_id).is_some())
    }

    async fn save_run(&self, run: &Run) -> Result<()> {
        self.runs.write().insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        Ok(self.runs.read().get(run_id).cloned())
    }

    async fn update_run(&self, run: &Run) -> Result<()> {
        self.runs.write().insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn list_runs(&self, graph_id: Option<&str>, limit: usize) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .read()
            .values()
            .filter(|r| graph_id.map(|g| r.graph_id == g).unwrap_or(true))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeDefinition, NodeType, RunStatus, WorkflowState};

    fn sample_graph() -> GraphDefinition {
        let nodes = vec![NodeDefinition {
            name: "a".to_string(),
            node_type: NodeType::Start,
            tool_name: None,
            config: None,
        }];
        GraphDefinition::new("sample", None, nodes, vec![], "a").unwrap()
    }

    #[tokio::test]
    async fn save_then_get_graph_round_trips() {
        let store = InMemoryStore::new();
        let graph = sample_graph();
        store.save_graph(&graph).await.unwrap();

        let fetched = store.get_graph(&graph.graph_id).await.unwrap().unwrap();
        assert_eq!(fetched.graph_id, graph.graph_id);
        assert_eq!(fetched.nodes.len(), graph.nodes.len());
    }

    #[tokio::test]
    async fn unknown_graph_returns_none() {
        let store = InMemoryStore::new();
        assert!(store.get_graph("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_runs_filters_by_graph_and_respects_limit() {
        let store = InMemoryStore::new();
        for graph_id in ["g1", "g1", "g2"] {
            let run = Run::new(graph_id, WorkflowState::new(), 10);
            store.save_run(&run).await.unwrap();
        }

        let g1_runs = store.list_runs(Some("g1"), 10).await.unwrap();
        assert_eq!(g1_runs.len(), 2);

        let limited = store.list_runs(None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn delete_graph_reports_whether_a_row_was_removed() {
        let store = InMemoryStore::new();
        let graph = sample_graph();
        store.save_graph(&graph).await.unwrap();

        assert!(store.delete_graph(&graph.graph_id).await.unwrap());
        assert!(!store.delete_graph(&graph.graph_id).await.unwrap());
    }

    #[tokio::test]
    async fn new_run_starts_pending_before_save() {
        let run = Run::new("g", WorkflowState::new(), 10);
        assert_eq!(run.status, RunStatus::Pending);
    }
}
