//! Unit tests for the tool result envelope.

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

// ============================================================================
// ToolStatus
// ============================================================================

#[test]
fn test_status_serializes_by_name() {
    assert_eq!(serde_json::to_value(ToolStatus::Success).unwrap(), json!("Success"));
    assert_eq!(serde_json::to_value(ToolStatus::Exception).unwrap(), json!("Exception"));
    assert_eq!(ToolStatus::Continue.to_string(), "Continue");
}

#[test]
fn test_status_from_str_ignores_case() {
    assert_eq!("FAILURE".parse::<ToolStatus>(), Ok(ToolStatus::Failure));
    assert_eq!("continue".parse::<ToolStatus>(), Ok(ToolStatus::Continue));
    assert!("pending".parse::<ToolStatus>().is_err());
}

#[test]
fn test_status_severity_order() {
    let mut statuses = vec![
        ToolStatus::Exception,
        ToolStatus::Success,
        ToolStatus::Error,
        ToolStatus::Continue,
        ToolStatus::Failure,
    ];
    statuses.sort_by_key(|s| s.severity());
    assert_eq!(
        statuses,
        vec![
            ToolStatus::Success,
            ToolStatus::Continue,
            ToolStatus::Failure,
            ToolStatus::Error,
            ToolStatus::Exception,
        ]
    );
}

// ============================================================================
// ToolResult
// ============================================================================

#[test]
fn test_next_action_default_instructions() {
    let action = NextAction::new("next_pytest_error");
    assert_eq!(action.instructions, "Call the mcp tool.");

    let action: NextAction = serde_json::from_value(json!({"mcp_tool": "run_pytest"})).unwrap();
    assert_eq!(action.instructions, "Call the mcp tool.");
}

#[test]
fn test_to_value_flattens_data_and_inlines_next_action() {
    let result = ToolResult::continuing("Pytest error in t::x")
        .with_next_action(NextAction::new("resolve_pytest_error").with_instructions("Fix it."))
        .with_data("node_id", "t::x")
        .with_data("errors_count", 2);

    assert_eq!(
        result.to_value(),
        json!({
            "status": "Continue",
            "message": "Pytest error in t::x",
            "next_action": {"mcp_tool": "resolve_pytest_error", "instructions": "Fix it."},
            "node_id": "t::x",
            "errors_count": 2
        })
    );
    assert_eq!(serde_json::to_value(&result).unwrap(), result.to_value());
}

#[test]
fn test_to_value_omits_missing_next_action() {
    let value = ToolResult::success("done").to_value();
    assert!(value.get("next_action").is_none());
}

#[test]
fn test_with_data_ignores_reserved_keys() {
    let result = ToolResult::success("kept").with_data("message", "overwritten");
    assert_eq!(result.to_value()["message"], json!("kept"));
    assert!(result.data.is_empty());
}

#[test]
fn test_result_round_trips_through_json() {
    let result = ToolResult::failure("black failed").with_data("exit_code", 123);
    let text = serde_json::to_string(&result).unwrap();
    let back: ToolResult = serde_json::from_str(&text).unwrap();
    assert_eq!(back, result);
}

// ============================================================================
// Directive
// ============================================================================

#[test]
fn test_directive_follows_status() {
    let hint = NextAction::new("next_pytest_error");

    assert_eq!(
        ToolResult::continuing("one more")
            .with_next_action(hint.clone())
            .directive(),
        Directive::Repeat("next_pytest_error".to_string())
    );
    assert_eq!(
        ToolResult::success("formatted")
            .with_next_action(hint)
            .directive(),
        Directive::Proceed("next_pytest_error".to_string())
    );
    assert_eq!(ToolResult::success("all clear").directive(), Directive::Done);
    assert_eq!(ToolResult::failure("isort failed").directive(), Directive::StageFailed);
    assert_eq!(ToolResult::error("bad path").directive(), Directive::Escalate);
    assert_eq!(ToolResult::exception("boom").directive(), Directive::Escalate);
    assert_eq!(ToolResult::continuing("no hint").directive(), Directive::Escalate);
}

// ============================================================================
// Stage aggregation
// ============================================================================

#[test]
fn test_stage_all_success() {
    let result = ToolResult::stage(
        "format",
        vec![
            ("autoflake".to_string(), ToolResult::success("ok")),
            ("isort".to_string(), ToolResult::success("ok")),
            ("black".to_string(), ToolResult::success("ok")),
        ],
    );

    assert_eq!(result.status, ToolStatus::Success);
    assert_eq!(result.message, "format: 3 of 3 steps succeeded");
    assert!(result.next_action.is_none());
}

#[test]
fn test_stage_failure_does_not_hide_later_steps() {
    let result = ToolResult::stage(
        "format",
        vec![
            ("autoflake".to_string(), ToolResult::success("ok")),
            ("isort".to_string(), ToolResult::failure("isort exited 1")),
            ("black".to_string(), ToolResult::success("ok")),
        ],
    );

    assert_eq!(result.status, ToolStatus::Failure);
    assert_eq!(
        result.data["steps"],
        json!([
            {"step": "autoflake", "status": "Success", "message": "ok"},
            {"step": "isort", "status": "Failure", "message": "isort exited 1"},
            {"step": "black", "status": "Success", "message": "ok"}
        ])
    );
}

#[test]
fn test_stage_worst_status_wins() {
    let result = ToolResult::stage(
        "checks",
        vec![
            ("a".to_string(), ToolResult::failure("f")),
            ("b".to_string(), ToolResult::exception("x")),
            ("c".to_string(), ToolResult::error("e")),
        ],
    );
    assert_eq!(result.status, ToolStatus::Exception);
}

#[test]
fn test_stage_empty_is_success() {
    let result = ToolResult::stage("nothing", Vec::new());
    assert_eq!(result.status, ToolStatus::Success);
    assert_eq!(result.data["steps"], json!([]));
}

// ============================================================================
// StatusMessages
// ============================================================================

#[test]
fn test_status_messages_append_matching_suffix() {
    let messages = StatusMessages::new()
        .on(ToolStatus::Success, "Run flake8 next.")
        .on(ToolStatus::Error, "Check the path.");

    let ok = messages.apply(ToolResult::success("Formatted 3 files"));
    assert_eq!(ok.message, "Formatted 3 files\nRun flake8 next.");

    let err = messages.apply(ToolResult::error("No such file"));
    assert_eq!(err.message, "No such file\nCheck the path.");

    let untouched = messages.apply(ToolResult::failure("black failed"));
    assert_eq!(untouched.message, "black failed");
}
