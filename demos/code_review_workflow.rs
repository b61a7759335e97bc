//! Runs the sample code-review graph against a deliberately messy function
//! and prints the quality score each improvement pass produces.
//!
//! ```text
//! cargo run --example code_review_workflow
//! ```

use serde_json::json;

use workflow_engine::engine::GraphEngine;
use workflow_engine::model::WorkflowState;
use workflow_engine::tools::{code_review_graph, register_code_review_tools};
use workflow_engine::ToolRegistry;

const MESSY_SOURCE: &str = r#"
def handle_request(req):
    if req:
        for item in req.items:
            if item.valid:
                if item.amount > 0:
                    if item.amount > 1000:
                        print("large")
                    elif item.amount > 100:
                        print("medium")
                    else:
                        print("small")
                elif item.amount < 0:
                    print("refund")
                else:
                    print("zero")
            else:
                print("invalid")
    return req
"#;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let registry = ToolRegistry::new();
    register_code_review_tools(&registry).expect("failed to register sample toolset");

    let graph = code_review_graph().expect("sample graph is well-formed");

    let mut state = WorkflowState::new();
    state.data.insert("code".to_string(), json!(MESSY_SOURCE));

    let engine = GraphEngine::new(&registry);
    let run = engine.execute(&graph, state, 10).await;

    println!("status: {:?}", run.status);
    println!("iterations: {}", run.iteration_count);
    for log in &run.execution_logs {
        println!(
            "  {} ({:.2}ms) success={}",
            log.node_name, log.execution_time_ms, log.success
        );
    }
    println!(
        "final quality_score: {:?}",
        run.current_state.data.get("quality_score")
    );
    println!(
        "final suggestions: {:?}",
        run.current_state.data.get("suggestions")
    );
}
