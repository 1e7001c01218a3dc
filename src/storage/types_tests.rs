//! Unit tests for storage types: ids, runner inputs, summaries and updates.

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

// ============================================================================
// Id tests
// ============================================================================

#[test]
fn test_ids_serialize_transparently() {
    assert_eq!(serde_json::to_value(SourceFileId(7)).unwrap(), json!(7));
    let id: CoverageIssueId = serde_json::from_value(json!(12)).unwrap();
    assert_eq!(id, CoverageIssueId(12));
    assert_eq!(TestFileId(3).to_string(), "3");
}

// ============================================================================
// TestErrorInput tests
// ============================================================================

#[test]
fn test_error_input_defaults() {
    let input: TestErrorInput = serde_json::from_value(json!({
        "node_id": "tests/test_a.py::test_x"
    }))
    .unwrap();
    assert_eq!(input.outcome, "failed");
    assert_eq!(input.result, json!([]));
    assert_eq!(input.longrepr, "");
    assert!(input.error_type.is_none());
}

#[test]
fn test_error_input_accepts_nodeid_alias() {
    let input: TestErrorInput = serde_json::from_value(json!({
        "nodeid": "tests/test_a.py::test_y",
        "outcome": "error",
        "longrepr": "ImportError"
    }))
    .unwrap();
    assert_eq!(input.node_id, "tests/test_a.py::test_y");
    assert_eq!(input.outcome, "error");
}

#[test]
fn test_error_input_builders() {
    let input = TestErrorInput::new("t::x", "boom")
        .with_outcome("error")
        .with_error_type("SyntaxError")
        .with_result(json!({"line": 3}));
    assert_eq!(input.node_id, "t::x");
    assert_eq!(input.longrepr, "boom");
    assert_eq!(input.outcome, "error");
    assert_eq!(input.error_type.as_deref(), Some("SyntaxError"));
    assert_eq!(input.result, json!({"line": 3}));
}

// ============================================================================
// CoverageEntry tests
// ============================================================================

#[test]
fn test_coverage_entry_tagged_line_issue() {
    let entry: CoverageEntry = serde_json::from_value(json!({
        "type": "CoverageIssue",
        "line_number": 10,
        "branches": [
            {"source_line": 10, "end_line": 12, "condition": "x>0", "branch_type": "if"}
        ]
    }))
    .unwrap();

    match entry {
        CoverageEntry::CoverageIssue(line) => {
            assert_eq!(line.line_number, 10);
            assert!(!line.is_excluded);
            assert_eq!(line.branches.len(), 1);
            assert_eq!(line.branches[0].condition, "x>0");
        }
        other => panic!("expected a line issue, got {:?}", other),
    }
}

#[test]
fn test_coverage_entry_tagged_branch() {
    let entry: CoverageEntry = serde_json::from_value(json!({
        "type": "CoverageBranch",
        "source_line": 4,
        "end_line": 9,
        "condition": "",
        "branch_type": "jump"
    }))
    .unwrap();

    assert_eq!(
        entry,
        CoverageEntry::branch(BranchInput {
            source_line: 4,
            end_line: 9,
            condition: String::new(),
            branch_type: "jump".to_string(),
        })
    );
}

#[test]
fn test_coverage_entry_rejects_unknown_type() {
    let result: Result<CoverageEntry, _> =
        serde_json::from_value(json!({"type": "LintIssue", "line_number": 1}));
    assert!(result.is_err());
}

#[test]
fn test_coverage_entry_line_helper() {
    assert_eq!(
        serde_json::to_value(CoverageEntry::line(5)).unwrap(),
        json!({"type": "CoverageIssue", "line_number": 5, "is_excluded": false, "branches": []})
    );
}

// ============================================================================
// PytestSummary tests
// ============================================================================

#[test]
fn test_summary_keeps_unknown_keys() {
    let summary: PytestSummary = serde_json::from_value(json!({
        "total": 2,
        "failed": 1,
        "deselected": 4
    }))
    .unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.passed, 0);
    assert_eq!(summary.extra.get("deselected"), Some(&json!(4)));

    let value = serde_json::to_value(&summary).unwrap();
    assert_eq!(value["deselected"], json!(4));
}

#[test]
fn test_summary_error_alias() {
    let summary: PytestSummary = serde_json::from_value(json!({"error": 2})).unwrap();
    assert_eq!(summary.errors, 2);
}

#[test]
fn test_summary_new() {
    let summary = PytestSummary::new(2, 0);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.failed, 0);
    assert!(summary.extra.is_empty());
}

// ============================================================================
// Update and paging tests
// ============================================================================

#[test]
fn test_updates_report_emptiness() {
    assert!(SourceFileUpdate::default().is_empty());
    assert!(!SourceFileUpdate {
        file_hash: Some("abc".to_string())
    }
    .is_empty());

    assert!(TestFileUpdate::default().is_empty());
    assert!(!TestFileUpdate {
        source_file_id: Some(SourceFileId(1)),
        ..TestFileUpdate::default()
    }
    .is_empty());

    assert!(CoverageIssueUpdate::default().is_empty());
    assert!(!CoverageIssueUpdate {
        is_excluded: Some(true),
        ..CoverageIssueUpdate::default()
    }
    .is_empty());
}

#[test]
fn test_page_default() {
    assert_eq!(Page::default(), Page::new(100, 0));
}

// ============================================================================
// Helper tests
// ============================================================================

#[test]
fn test_timestamps_sort_lexically() {
    let earlier = timestamp_now();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let later = timestamp_now();
    assert!(earlier < later);
    assert!(parse_timestamp(&earlier).unwrap() < parse_timestamp(&later).unwrap());
}

#[test]
fn test_parse_timestamp_rejects_garbage() {
    let err = parse_timestamp("garbage").unwrap_err();
    assert!(matches!(err, StorageError::Query { .. }));
    assert!(err.to_string().contains("garbage"));
    assert!(!err.is_validation());
}

#[test]
fn test_require_non_empty() {
    assert!(require_non_empty("file_path", "src/m.py").is_ok());
    let err = require_non_empty("file_path", "  ").unwrap_err();
    assert!(err.is_validation());
}
