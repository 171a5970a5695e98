//! Loading evaluation test cases from a JSON file.

use serde_json::Value;
use std::path::Path;

use crate::error::{RagError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    /// Ground-truth passages (`context` or `reference_contexts`).
    pub reference_contexts: Vec<String>,
}

/// Read a JSON array of test cases.
///
/// Items need a question (`input` or `query`) and an expected answer
/// (`expected_output` or `reference_answer`); anything else is skipped.
/// Reference contexts are optional and may be a string or a list.
pub fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = std::fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
    let items: Vec<Value> = serde_json::from_str(&content)?;

    let cases: Vec<TestCase> = items.iter().filter_map(to_test_case).collect();
    if cases.len() < items.len() {
        tracing::warn!(
            skipped = items.len() - cases.len(),
            "test case items without input and expected output were skipped"
        );
    }
    Ok(cases)
}

fn to_test_case(item: &Value) -> Option<TestCase> {
    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| item.get(*n).and_then(Value::as_str))
            .map(str::to_string)
    };
    Some(TestCase {
        input: field(&["input", "query"])?,
        expected_output: field(&["expected_output", "reference_answer"])?,
        reference_contexts: ["context", "reference_contexts"]
            .iter()
            .find_map(|n| item.get(*n))
            .map(string_list)
            .unwrap_or_default(),
    })
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
