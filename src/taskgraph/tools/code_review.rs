// SPDX-License-Identifier: MIT

//! Code review tools and the workflow that chains them.
//!
//! Every tool reads the source under review from the `code` key. The
//! improvement loop runs while `quality_score < 80`, so seed the run with a
//! low score (for example `0`) to have suggestions produced.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::runtime::{FnTool, StateData, Tool, ToolResult};
use crate::taskgraph::workflow::registry::ToolRegistry;
use crate::taskgraph::workflow::types::{EdgeConfig, GraphDefinition, NodeConfig};

static FUNCTION_PATTERN: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"def\s+(\w+)\s*\([^)]*\):"));

const DECISION_KEYWORDS: [&str; 7] = ["if", "elif", "for", "while", "and", "or", "except"];
const MAX_LINE_LENGTH: usize = 100;

fn code(state: &StateData) -> &str {
    state.get("code").and_then(Value::as_str).unwrap_or("")
}

fn update(value: Value) -> StateData {
    match value {
        Value::Object(map) => map,
        _ => StateData::new(),
    }
}

/// Collect `def name(...):` function names
pub fn extract_functions(state: &StateData) -> ToolResult {
    let pattern = FUNCTION_PATTERN.as_ref().map_err(|e| e.to_string())?;
    let functions: Vec<&str> = pattern
        .captures_iter(code(state))
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();

    Ok(update(json!({
        "function_count": functions.len(),
        "functions": functions,
    })))
}

/// Score cyclomatic-style complexity by counting decision keywords
pub fn check_complexity(state: &StateData) -> ToolResult {
    let code = code(state);
    let complexity = 1 + DECISION_KEYWORDS
        .iter()
        .map(|kw| {
            code.matches(&format!(" {} ", kw)).count() + code.matches(&format!(" {}(", kw)).count()
        })
        .sum::<usize>();

    let level = if complexity > 10 {
        "high"
    } else if complexity > 5 {
        "medium"
    } else {
        "low"
    };

    Ok(update(json!({
        "complexity_score": complexity,
        "complexity_level": level,
    })))
}

/// Flag common style problems
pub fn detect_issues(state: &StateData) -> ToolResult {
    let code = code(state);
    let mut issues = Vec::new();

    if code.contains("TODO") || code.contains("FIXME") {
        issues.push("Contains TODO/FIXME comments".to_string());
    }
    if code.contains('\t') {
        issues.push("Uses tabs instead of spaces".to_string());
    }

    let long_lines: Vec<usize> = code
        .split('\n')
        .enumerate()
        .filter(|(_, line)| line.chars().count() > MAX_LINE_LENGTH)
        .map(|(i, _)| i + 1)
        .take(3)
        .collect();
    if !long_lines.is_empty() {
        issues.push(format!(
            "Lines exceed {} characters: {:?}",
            MAX_LINE_LENGTH, long_lines
        ));
    }

    if code.contains("except:") {
        issues.push("Uses bare except clause".to_string());
    }

    Ok(update(json!({
        "issue_count": issues.len(),
        "issues": issues,
    })))
}

/// Turn earlier findings into suggestions and a 0-100 quality score
pub fn suggest_improvements(state: &StateData) -> ToolResult {
    let complexity = state
        .get("complexity_score")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let issue_count = state
        .get("issues")
        .and_then(Value::as_array)
        .map_or(0, |issues| issues.len() as i64);
    let function_count = state
        .get("function_count")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let mut suggestions = Vec::new();
    if complexity > 10 {
        suggestions.push("Consider breaking down complex functions");
    }
    if issue_count > 0 {
        suggestions.push("Address detected code issues");
    }
    if function_count == 0 {
        suggestions.push("Consider extracting logic into functions");
    }

    let quality_score = 100 - (complexity * 2).min(30) - (issue_count * 10).min(40);

    Ok(update(json!({
        "suggestions": suggestions,
        "quality_score": quality_score.max(0),
    })))
}

pub fn create_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(
            FnTool::new("extract_functions", extract_functions)
                .with_description("Extract function names from the code"),
        ),
        Arc::new(
            FnTool::new("check_complexity", check_complexity)
                .with_description("Estimate code complexity from decision keywords"),
        ),
        Arc::new(
            FnTool::new("detect_issues", detect_issues)
                .with_description("Detect common code style issues"),
        ),
        Arc::new(
            FnTool::new("suggest_improvements", suggest_improvements)
                .with_description("Suggest improvements and compute a quality score"),
        ),
    ]
}

pub async fn register_code_review_tools(registry: &ToolRegistry) {
    for tool in create_tools() {
        registry.register_tool(tool).await;
    }
}

/// extract -> complexity -> issues -> improve, where improve loops while
/// `quality_score < 80` for at most three passes
pub fn code_review_workflow() -> GraphDefinition {
    GraphDefinition {
        name: "Code Review Agent".to_string(),
        nodes: vec![
            NodeConfig::standard("extract", "extract_functions"),
            NodeConfig::standard("complexity", "check_complexity"),
            NodeConfig::standard("issues", "detect_issues"),
            NodeConfig::looping("improve", "suggest_improvements", "quality_score < 80", 3),
        ],
        edges: vec![
            EdgeConfig::new("extract", "complexity"),
            EdgeConfig::new("complexity", "issues"),
            EdgeConfig::new("issues", "improve"),
        ],
        start_node: "extract".to_string(),
    }
}
