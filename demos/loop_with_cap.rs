//! Builds a two-node graph that loops on itself forever (`A -> B -> A`,
//! guarded by a condition that is always true) and shows the engine
//! halting it at the iteration cap instead of looping indefinitely.
//!
//! ```text
//! cargo run --example loop_with_cap
//! ```

use workflow_engine::engine::GraphEngine;
use workflow_engine::model::{EdgeDefinition, GraphDefinition, NodeDefinition, NodeType, WorkflowState};
use workflow_engine::{StateData, ToolRegistry};

fn identity(state: StateData) -> workflow_engine::Result<StateData> {
    Ok(state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let registry = ToolRegistry::new();
    registry
        .register_fn("identity", "passthrough", false, identity)
        .expect("fresh registry");

    let nodes = vec![
        NodeDefinition {
            name: "a".to_string(),
            node_type: NodeType::Function,
            tool_name: Some("identity".to_string()),
            config: None,
        },
        NodeDefinition {
            name: "b".to_string(),
            node_type: NodeType::Function,
            tool_name: Some("identity".to_string()),
            config: None,
        },
    ];
    let edges = vec![
        EdgeDefinition {
            from_node: "a".to_string(),
            to_node: "b".to_string(),
            condition: None,
            label: None,
        },
        EdgeDefinition {
            from_node: "b".to_string(),
            to_node: "a".to_string(),
            condition: Some("true".to_string()),
            label: Some("always loops back".to_string()),
        },
    ];

    let graph = GraphDefinition::new("infinite-loop", None, nodes, edges, "a").expect("graph is well-formed");

    let engine = GraphEngine::new(&registry);
    let run = engine.execute(&graph, WorkflowState::new(), 5).await;

    println!("status: {:?}", run.status);
    println!("iterations_completed: {}", run.iteration_count);
    println!("nodes executed: {}", run.execution_logs.len());
    println!("error: {:?}", run.error);
}
