//! Core data model for the workflow engine: graphs, nodes, edges, runs.

pub(crate) mod graph;
pub(crate) mod run;
pub(crate) mod state;

pub use graph::{EdgeDefinition, GraphDefinition, NodeDefinition, NodeType};
pub use run::{ExecutionLog, Run, RunStatus};
pub use state::{StateData, WorkflowState};
