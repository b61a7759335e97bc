//! # Workflow Engine
//!
//! A graph execution engine for building stateful workflows out of named
//! tool-calling nodes and conditionally-taken edges.
//!
//! ## Overview
//!
//! A graph is a set of named nodes and directed edges. Function nodes invoke
//! a registered tool that transforms a shared JSON state map; edges may carry
//! a boolean condition, evaluated in a small sandboxed expression dialect,
//! that decides which successor is taken. Execution walks from an entry node
//! until it reaches a sink, a tool error, or an iteration-safety cap.
//!
//! ## Key Features
//!
//! - **Graph-based workflows**: define branching and looping control flow as
//!   data, not code.
//! - **Sandboxed branching**: edge conditions run through a tiny expression
//!   interpreter, never a general scripting runtime.
//! - **Async-or-sync tools**: tools are a uniform async trait; synchronous
//!   work is expected to offload blocking calls itself.
//! - **Loop-safe**: re-entering an already-visited node counts as an
//!   iteration, bounded by a hard cap.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for workflow engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error type for the workflow engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Graph structure error (missing node, missing edge endpoint, etc).
    #[error("graph structure error: {0}")]
    GraphStructure(String),

    /// A graph, run, or tool lookup failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// A tool raised an error, or a FUNCTION node was misconfigured.
    #[error("tool failure: {0}")]
    ToolFailure(String),

    /// The run exceeded its configured iteration cap.
    #[error("iteration cap exceeded: possible infinite loop ({0} iterations)")]
    IterationCapExceeded(usize),

    /// Execution was cancelled by the caller between node dispatches.
    #[error("run cancelled")]
    Cancelled,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage-layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Generic internal error for unexpected conditions.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Core data model: graphs, nodes, edges, state, runs, execution logs.
pub mod model;

/// Name-keyed directory of tool callables.
pub mod registry;

/// Sandboxed boolean expression evaluator used for edge conditions.
pub mod condition;

/// The graph execution engine (the scheduler).
pub mod engine;

/// Persistence adapters for graphs and runs.
pub mod storage;

/// The sample code-review toolset and its graph.
pub mod tools;

/// Runtime configuration.
pub mod config;

/// axum-based HTTP surface.
pub mod api;

pub use config::Config;
pub use engine::GraphEngine;
pub use model::{
    EdgeDefinition, ExecutionLog, GraphDefinition, NodeDefinition, NodeType, Run, RunStatus,
    StateData, WorkflowState,
};
pub use registry::ToolRegistry;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_creation() {
        let node = NodeDefinition {
            name: "start".to_string(),
            node_type: NodeType::Start,
            tool_name: None,
            config: None,
        };

        assert_eq!(node.name, "start");
        assert_eq!(node.node_type, NodeType::Start);
    }

    #[test]
    fn test_state_initialization() {
        let state = WorkflowState::new();

        assert!(state.data.is_empty());
        assert!(state.metadata.is_empty());
    }
}
