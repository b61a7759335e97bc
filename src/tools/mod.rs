//! The sample code-review toolset and its graph.
//!
//! A worked example shipped with the crate: five tools that analyze source
//! text for structural complexity, propose improvements, score quality, and
//! loop back into improvement until a quality threshold is met. This mirrors
//! the originating system's `code_review` workflow in shape, adapted to the
//! registry's `StateData -> StateData` calling convention.

use regex::Regex;
use serde_json::json;

use crate::model::state::StateData;
use crate::model::{EdgeDefinition, GraphDefinition, NodeDefinition, NodeType};
use crate::registry::ToolRegistry;
use crate::{EngineError, Result};

const QUALITY_THRESHOLD: f64 = 8.0;

/// Register all five code-review tools into `registry`.
pub fn register_code_review_tools(registry: &ToolRegistry) -> Result<()> {
    registry.register_fn(
        "extract_functions",
        "Scans source text and produces a list of function-like blocks with line counts",
        true,
        extract_functions,
    )?;
    registry.register_fn(
        "check_complexity",
        "Assigns a naive cyclomatic-complexity estimate per function",
        true,
        check_complexity,
    )?;
    registry.register_fn(
        "detect_issues",
        "Flags long functions and deep nesting as issues with a severity",
        true,
        detect_issues,
    )?;
    registry.register_fn(
        "suggest_improvements",
        "Appends suggestions derived from detected issues and advances the improvement loop",
        true,
        suggest_improvements,
    )?;
    registry.register_fn(
        "calculate_quality",
        "Computes a 0-10 quality score and sets quality_passed once it clears the threshold",
        true,
        calculate_quality,
    )?;
    Ok(())
}

/// Build the sample graph: a linear analysis pipeline that conditionally
/// loops `calculate_quality -> suggest_improvements` while `quality_passed`
/// is false, the same shape as the originating `code_review.py` workflow.
pub fn code_review_graph() -> Result<GraphDefinition> {
    let nodes = vec![
        NodeDefinition {
            name: "start".to_string(),
            node_type: NodeType::Start,
            tool_name: None,
            config: None,
        },
        NodeDefinition {
            name: "extract_functions".to_string(),
            node_type: NodeType::Function,
            tool_name: Some("extract_functions".to_string()),
            config: None,
        },
        NodeDefinition {
            name: "check_complexity".to_string(),
            node_type: NodeType::Function,
            tool_name: Some("check_complexity".to_string()),
            config: None,
        },
        NodeDefinition {
            name: "detect_issues".to_string(),
            node_type: NodeType::Function,
            tool_name: Some("detect_issues".to_string()),
            config: None,
        },
        NodeDefinition {
            name: "suggest_improvements".to_string(),
            node_type: NodeType::Function,
            tool_name: Some("suggest_improvements".to_string()),
            config: None,
        },
        NodeDefinition {
            name: "calculate_quality".to_string(),
            node_type: NodeType::Function,
            tool_name: Some("calculate_quality".to_string()),
            config: None,
        },
        NodeDefinition {
            name: "end".to_string(),
            node_type: NodeType::End,
            tool_name: None,
            config: None,
        },
    ];

    let edges = vec![
        EdgeDefinition {
            from_node: "start".to_string(),
            to_node: "extract_functions".to_string(),
            condition: None,
            label: None,
        },
        EdgeDefinition {
            from_node: "extract_functions".to_string(),
            to_node: "check_complexity".to_string(),
            condition: None,
            label: None,
        },
        EdgeDefinition {
            from_node: "check_complexity".to_string(),
            to_node: "detect_issues".to_string(),
            condition: None,
            label: None,
        },
        EdgeDefinition {
            from_node: "detect_issues".to_string(),
            to_node: "suggest_improvements".to_string(),
            condition: None,
            label: None,
        },
        EdgeDefinition {
            from_node: "suggest_improvements".to_string(),
            to_node: "calculate_quality".to_string(),
            condition: None,
            label: None,
        },
        EdgeDefinition {
            from_node: "calculate_quality".to_string(),
            to_node: "suggest_improvements".to_string(),
            condition: Some("not state['quality_passed']".to_string()),
            label: Some("loop back for another improvement pass".to_string()),
        },
        EdgeDefinition {
            from_node: "calculate_quality".to_string(),
            to_node: "end".to_string(),
            condition: None,
            label: Some("quality threshold met".to_string()),
        },
    ];

    GraphDefinition::new(
        "code_review",
        Some("Analyzes source text, proposes improvements, loops until quality passes".to_string()),
        nodes,
        edges,
        "start",
    )
}

fn source_text(state: &StateData) -> Result<String> {
    state
        .get("code")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| EngineError::ToolFailure("state['code'] must be a string".to_string()))
}

fn function_pattern() -> &'static Regex {
    use std::sync::OnceLock;
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)^[ \t]*def\s+(\w+)\s*\(").expect("fixed pattern"))
}

fn extract_functions(mut state: StateData) -> Result<StateData> {
    let source = source_text(&state)?;
    let lines: Vec<&str> = source.lines().collect();
    let pattern = function_pattern();

    let mut functions = Vec::new();
    let starts: Vec<(usize, String)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            pattern.captures(line).map(|c| (i, c[1].to_string()))
        })
        .collect();

    for (idx, (start, name)) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).map(|(next, _)| *next).unwrap_or(lines.len());
        functions.push(json!({
            "name": name,
            "start_line": start,
            "num_lines": end.saturating_sub(*start),
        }));
    }

    state.insert("num_functions".to_string(), json!(functions.len()));
    state.insert("functions".to_string(), json!(functions));
    Ok(state)
}

fn check_complexity(mut state: StateData) -> Result<StateData> {
    let source = source_text(&state)?;
    let functions = state
        .get("functions")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let branch_keywords = ["if ", "elif ", "for ", "while ", "except", "and ", "or "];
    let lines: Vec<&str> = source.lines().collect();

    let mut scored = Vec::new();
    for function in functions {
        let start = function.get("start_line").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let num_lines = function.get("num_lines").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let end = (start + num_lines).min(lines.len());

        let complexity: usize = lines[start.min(lines.len())..end]
            .iter()
            .map(|line| branch_keywords.iter().filter(|kw| line.contains(*kw)).count())
            .sum::<usize>()
            + 1; // base path

        let mut entry = function.clone();
        entry["complexity"] = json!(complexity);
        scored.push(entry);
    }

    state.insert("functions".to_string(), json!(scored));
    Ok(state)
}

fn detect_issues(mut state: StateData) -> Result<StateData> {
    const LONG_FUNCTION_LINES: u64 = 30;
    const HIGH_COMPLEXITY: u64 = 10;

    let functions = state
        .get("functions")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut issues = Vec::new();
    for function in &functions {
        let name = function.get("name").and_then(|v| v.as_str()).unwrap_or("<unknown>");
        let num_lines = function.get("num_lines").and_then(|v| v.as_u64()).unwrap_or(0);
        let complexity = function.get("complexity").and_then(|v| v.as_u64()).unwrap_or(0);

        if num_lines > LONG_FUNCTION_LINES {
            issues.push(json!({
                "function": name,
                "kind": "long_function",
                "severity": "warning",
                "message": format!("{name} is {num_lines} lines long"),
            }));
        }
        if complexity > HIGH_COMPLEXITY {
            issues.push(json!({
                "function": name,
                "kind": "high_complexity",
                "severity": "error",
                "message": format!("{name} has an estimated complexity of {complexity}"),
            }));
        }
    }

    state.insert("issue_count".to_string(), json!(issues.len()));
    state.insert("issues".to_string(), json!(issues));
    Ok(state)
}

fn suggest_improvements(mut state: StateData) -> Result<StateData> {
    let issues = state
        .get("issues")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut suggestions: Vec<String> = state
        .get("suggestions")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    for issue in &issues {
        let kind = issue.get("kind").and_then(|v| v.as_str()).unwrap_or("");
        let function = issue.get("function").and_then(|v| v.as_str()).unwrap_or("<unknown>");
        let suggestion = match kind {
            "long_function" => format!("Split {function} into smaller, single-purpose functions"),
            "high_complexity" => format!("Reduce branching in {function}, e.g. via early returns"),
            other => format!("Review {function} ({other})"),
        };
        if !suggestions.contains(&suggestion) {
            suggestions.push(suggestion);
        }
    }

    let iteration = state
        .get("improvement_iteration")
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
        + 1;

    state.insert("suggestions".to_string(), json!(suggestions));
    state.insert("improvement_iteration".to_string(), json!(iteration));
    Ok(state)
}

fn calculate_quality(mut state: StateData) -> Result<StateData> {
    let issue_count = state
        .get("issues")
        .and_then(|v| v.as_array())
        .map(Vec::len)
        .unwrap_or(0) as f64;

    let avg_complexity = state
        .get("functions")
        .and_then(|v| v.as_array())
        .filter(|fns| !fns.is_empty())
        .map(|fns| {
            let total: f64 = fns
                .iter()
                .filter_map(|f| f.get("complexity").and_then(|v| v.as_u64()))
                .map(|c| c as f64)
                .sum();
            total / fns.len() as f64
        })
        .unwrap_or(0.0);

    let iteration = state
        .get("improvement_iteration")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as f64;

    // Start from a perfect score and deduct for issues, complexity, and the
    // number of improvement passes already taken; never below zero.
    let score = (10.0 - issue_count * 1.5 - (avg_complexity - 1.0).max(0.0) * 0.3 + iteration * 0.5)
        .clamp(0.0, 10.0);

    let passed = score >= QUALITY_THRESHOLD;

    state.insert("quality_score".to_string(), json!(score));
    state.insert("quality_passed".to_string(), json!(passed));
    state.insert("issue_count".to_string(), json!(issue_count as u64));
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SOURCE: &str = r#"
def clean_function(x):
    return x + 1

def messy_function(data):
    if data:
        for item in data:
            if item:
                if item > 0:
                    print(item)
                elif item < 0:
                    print(-item)
                else:
                    print(0)
    return data
"#;

    #[test]
    fn extract_functions_finds_both_defs() {
        let mut state = StateData::new();
        state.insert("code".to_string(), json!(SAMPLE_SOURCE));
        let state = extract_functions(state).unwrap();
        let functions = state.get("functions").unwrap().as_array().unwrap();
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0]["name"], json!("clean_function"));
        assert_eq!(functions[1]["name"], json!("messy_function"));
    }

    #[test]
    fn check_complexity_scores_branchy_function_higher() {
        let mut state = StateData::new();
        state.insert("code".to_string(), json!(SAMPLE_SOURCE));
        let state = extract_functions(state).unwrap();
        let state = check_complexity(state).unwrap();
        let functions = state.get("functions").unwrap().as_array().unwrap();
        let clean = functions[0]["complexity"].as_u64().unwrap();
        let messy = functions[1]["complexity"].as_u64().unwrap();
        assert!(messy > clean);
    }

    #[test]
    fn full_pipeline_improves_quality_across_iterations() {
        let mut state = StateData::new();
        state.insert("code".to_string(), json!(SAMPLE_SOURCE));

        let state = extract_functions(state).unwrap();
        let state = check_complexity(state).unwrap();
        let state = detect_issues(state).unwrap();
        let state = suggest_improvements(state).unwrap();
        let first_pass = calculate_quality(state).unwrap();
        let first_score = first_pass["quality_score"].as_f64().unwrap();

        let state = suggest_improvements(first_pass).unwrap();
        let second_pass = calculate_quality(state).unwrap();
        let second_score = second_pass["quality_score"].as_f64().unwrap();

        assert!(second_score >= first_score);
        assert_eq!(second_pass["improvement_iteration"], json!(2));
    }

    #[test]
    fn sample_graph_is_well_formed() {
        let graph = code_review_graph().unwrap();
        assert!(graph.find_unreachable_nodes().is_empty());
        assert_eq!(graph.entry_point, "start");
    }

    #[test]
    fn register_code_review_tools_populates_registry() {
        let registry = ToolRegistry::new();
        register_code_review_tools(&registry).unwrap();
        for name in [
            "extract_functions",
            "check_complexity",
            "detect_issues",
            "suggest_improvements",
            "calculate_quality",
        ] {
            assert!(registry.exists(name), "{name} should be registered");
        }
    }
}
