use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ReportError, ReportResult};
use crate::storage::{PytestSummary, TestErrorInput};

/// What one pytest-json-report document says about a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PytestReport {
    pub summary: PytestSummary,
    pub failed_tests: Vec<TestErrorInput>,
    pub collection_errors: Vec<TestErrorInput>,
}

impl PytestReport {
    /// Give node-less collection errors (the session collector) a node id.
    pub fn with_default_node_id(mut self, node_id: &str) -> Self {
        for error in &mut self.collection_errors {
            if error.node_id.is_empty() {
                error.node_id = node_id.to_string();
            }
        }
        self
    }
}

/// Extract failed tests, failed collectors and the summary from a report.
///
/// A report without a `summary` gets one counted from the test outcomes.
pub fn parse_report(report: &Value) -> ReportResult<PytestReport> {
    let root = report.as_object().ok_or_else(|| ReportError::InvalidFormat {
        message: "report is not a JSON object".to_string(),
    })?;

    let tests = root
        .get("tests")
        .ok_or_else(|| ReportError::InvalidFormat {
            message: "'tests' key not found".to_string(),
        })?
        .as_array()
        .ok_or_else(|| ReportError::InvalidFormat {
            message: "'tests' is not an array".to_string(),
        })?;

    let failed_tests: Vec<TestErrorInput> = tests
        .iter()
        .filter(|test| outcome(test) == "failed")
        .map(failed_test)
        .collect();

    let collection_errors: Vec<TestErrorInput> = root
        .get("collectors")
        .and_then(Value::as_array)
        .map(|collectors| {
            collectors
                .iter()
                .filter(|collector| outcome(collector) == "failed")
                .map(failed_collector)
                .collect()
        })
        .unwrap_or_default();

    let summary = match root.get("summary") {
        Some(Value::Object(map)) if !map.is_empty() => {
            serde_json::from_value(Value::Object(map.clone()))?
        }
        _ => count_outcomes(tests),
    };

    if !failed_tests.is_empty() {
        warn!(count = failed_tests.len(), "Test failures found");
    }
    if !collection_errors.is_empty() {
        warn!(count = collection_errors.len(), "Collection errors found");
    }
    debug!(total = summary.total, failed = summary.failed, "Pytest report parsed");

    Ok(PytestReport {
        summary,
        failed_tests,
        collection_errors,
    })
}

fn outcome(entry: &Value) -> &str {
    entry.get("outcome").and_then(Value::as_str).unwrap_or("")
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn failed_test(test: &Value) -> TestErrorInput {
    let node_id = text(test.get("nodeid"));

    let longrepr = match test.get("call") {
        Some(call @ Value::Object(_)) => text(call.get("longrepr")),
        _ => text(test.get("longrepr")),
    };

    // `location` is {"file", "line"} in older reports and [file, line, name] in newer ones.
    let (file, line) = match test.get("location") {
        Some(Value::Object(location)) => (
            text(location.get("file")),
            location.get("line").and_then(Value::as_i64).unwrap_or(0),
        ),
        Some(Value::Array(location)) => (
            text(location.first()),
            location.get(1).and_then(Value::as_i64).unwrap_or(0),
        ),
        _ => (
            String::new(),
            test.get("lineno").and_then(Value::as_i64).unwrap_or(0),
        ),
    };

    let duration = test
        .get("duration")
        .or_else(|| test.get("call").and_then(|call| call.get("duration")))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    TestErrorInput::new(node_id, longrepr).with_result(json!({
        "file": file,
        "line": line,
        "duration": duration,
    }))
}

fn failed_collector(collector: &Value) -> TestErrorInput {
    let result = match collector.get("result") {
        Some(result @ Value::Array(_)) => result.clone(),
        _ => Value::Array(Vec::new()),
    };

    TestErrorInput::new(text(collector.get("nodeid")), text(collector.get("longrepr")))
        .with_result(result)
}

fn count_outcomes(tests: &[Value]) -> PytestSummary {
    let count = |wanted: &str| tests.iter().filter(|t| outcome(t) == wanted).count() as u64;
    PytestSummary {
        total: tests.len() as u64,
        passed: count("passed"),
        failed: count("failed"),
        skipped: count("skipped"),
        ..PytestSummary::default()
    }
}
