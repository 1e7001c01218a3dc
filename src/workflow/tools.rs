use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::result::{NextAction, StatusMessages, ToolResult, ToolStatus};
use crate::error::{ReportError, StorageError};
use crate::paths;
use crate::reports::{coverage, pytest};
use crate::storage::{CoverageIssueDetail, QaStore};

/// Names of the operations a [`NextAction`] can point at.
pub mod tool_names {
    pub const RUN_PYTEST: &str = "run_pytest";
    pub const NEXT_PYTEST_ERROR: &str = "next_pytest_error";
    pub const RESOLVE_PYTEST_ERROR: &str = "resolve_pytest_error";
    pub const NEXT_COLLECTION_ERROR: &str = "next_collection_error";
    pub const NEXT_COVERAGE_ISSUE: &str = "next_coverage_issue";
}

fn to_data<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Bad input is the caller's to fix; anything else is ours.
fn storage_failure(action: &str, err: StorageError) -> ToolResult {
    if err.is_validation() {
        warn!(action, error = %err, "Rejected input");
        ToolResult::error(format!("Invalid input for {}: {}", action, err))
    } else {
        error!(action, error = %err, "Storage failure");
        ToolResult::exception(format!("Error during {}: {}", action, err))
    }
}

fn report_failure(kind: &str, err: ReportError) -> ToolResult {
    warn!(kind, error = %err, "Unreadable report");
    ToolResult::error(format!("Error parsing {} report: {}", kind, err))
}

/// The tool boundary: every operation returns a [`ToolResult`] and never an error.
pub struct QaTools<S: QaStore> {
    store: Arc<S>,
}

impl<S: QaStore> QaTools<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record a pytest-json-report document for one test file.
    pub async fn record_pytest_report(&self, test_file: &str, report: &Value) -> ToolResult {
        let parsed = match pytest::parse_report(report) {
            Ok(parsed) => parsed.with_default_node_id(test_file),
            Err(err) => return report_failure("pytest", err),
        };

        let test_file_id = match self
            .store
            .save_pytest_run(
                test_file,
                &parsed.summary,
                &parsed.failed_tests,
                &parsed.collection_errors,
            )
            .await
        {
            Ok(id) => id,
            Err(err) => return storage_failure("run_pytest", err),
        };

        let errors_count = parsed.failed_tests.len();
        let collection_errors_count = parsed.collection_errors.len();
        info!(
            test_file = %test_file,
            errors = errors_count,
            collection_errors = collection_errors_count,
            "Pytest report recorded"
        );

        let result = if collection_errors_count > 0 {
            ToolResult::error(format!(
                "Collection failed for {}: {} collection error(s)",
                test_file, collection_errors_count
            ))
            .with_next_action(
                NextAction::new(tool_names::NEXT_COLLECTION_ERROR).with_instructions(format!(
                    "Call next_collection_error with test_file_path '{}' and fix the import or syntax error.",
                    test_file
                )),
            )
        } else if errors_count > 0 {
            ToolResult::continuing(format!(
                "{} failing test(s) in {}",
                errors_count, test_file
            ))
            .with_next_action(
                NextAction::new(tool_names::NEXT_PYTEST_ERROR).with_instructions(format!(
                    "Call next_pytest_error with test_file_path '{}' to fix failures one at a time.",
                    test_file
                )),
            )
        } else {
            ToolResult::success(format!("Successfully ran tests for {}", test_file))
        };

        result
            .with_data("test_file_path", test_file)
            .with_data("test_file_id", test_file_id.0)
            .with_data("summary", to_data(&parsed.summary))
            .with_data("errors_count", errors_count)
            .with_data("collection_errors_count", collection_errors_count)
    }

    /// Record a coverage.py JSON report, replacing each measured file's issues.
    pub async fn record_coverage_report(&self, report: &Value) -> ToolResult {
        let files = match coverage::parse_report(report) {
            Ok(files) => files,
            Err(err) => return report_failure("coverage", err),
        };

        let mut issues_count = 0usize;
        let mut files_with_issues = Vec::new();
        for file in &files {
            if let Err(err) = self
                .store
                .save_coverage_issues(&file.file_path, &file.entries)
                .await
            {
                return storage_failure("record_coverage", err);
            }
            if !file.is_clean() {
                issues_count += file.actionable();
                files_with_issues.push(json!({
                    "file_path": file.file_path,
                    "issues": file.actionable(),
                    "percent_covered": file.percent_covered,
                }));
            }
        }

        info!(
            files = files.len(),
            issues = issues_count,
            "Coverage report recorded"
        );

        let result = if issues_count > 0 {
            ToolResult::continuing(format!(
                "{} coverage issue(s) in {} file(s)",
                issues_count,
                files_with_issues.len()
            ))
            .with_next_action(
                NextAction::new(tool_names::NEXT_COVERAGE_ISSUE)
                    .with_instructions("Call next_coverage_issue to work through missing coverage."),
            )
        } else {
            ToolResult::success(format!("No coverage gaps in {} file(s)", files.len()))
        };

        result
            .with_data("coverage_issues_count", issues_count)
            .with_data("files", Value::Array(files_with_issues))
    }

    /// Hand out the earliest stored failure of a test file.
    pub async fn next_pytest_error(&self, test_file: &str) -> ToolResult {
        let next = match self.store.get_next_error(test_file).await {
            Ok(next) => next,
            Err(err) => return storage_failure(tool_names::NEXT_PYTEST_ERROR, err),
        };

        let messages = StatusMessages::new().on(
            ToolStatus::Success,
            "Re-run pytest on the file to confirm it is clean.",
        );

        let result = match next {
            Some(error) => ToolResult::continuing(format!(
                "Pytest error in {} ({}):\n{}",
                error.node_id, error.outcome, error.longrepr
            ))
            .with_next_action(
                NextAction::new(tool_names::RESOLVE_PYTEST_ERROR).with_instructions(format!(
                    "Fix the test, then call resolve_pytest_error with node_id '{}'.",
                    error.node_id
                )),
            )
            .with_data("node_id", error.node_id.clone())
            .with_data("error", to_data(&error)),
            None => ToolResult::success(format!("No pytest errors were found for {}", test_file))
                .with_next_action(NextAction::new(tool_names::RUN_PYTEST)),
        };

        messages.apply(result.with_data("test_file_path", test_file))
    }

    /// Hand out the earliest stored collection failure of a test file.
    pub async fn next_collection_error(&self, test_file: &str) -> ToolResult {
        let next = match self.store.get_next_collection_error(test_file).await {
            Ok(next) => next,
            Err(err) => return storage_failure(tool_names::NEXT_COLLECTION_ERROR, err),
        };

        let result = match next {
            Some(error) => ToolResult::continuing(format!(
                "Collection error in {} ({}):\n{}",
                error.node_id, error.error_type, error.longrepr
            ))
            .with_next_action(
                NextAction::new(tool_names::RESOLVE_PYTEST_ERROR).with_instructions(format!(
                    "Fix the module so it imports, then call resolve_pytest_error with node_id '{}'.",
                    error.node_id
                )),
            )
            .with_data("node_id", error.node_id.clone())
            .with_data("error", to_data(&error)),
            None => ToolResult::success(format!(
                "No collection errors were found for {}",
                test_file
            ))
            .with_next_action(NextAction::new(tool_names::RUN_PYTEST)),
        };

        result.with_data("test_file_path", test_file)
    }

    /// Drop every stored error for `node_id`. Zero matches is still a success.
    pub async fn resolve_pytest_error(&self, node_id: &str) -> ToolResult {
        let deleted = match self.store.delete_error_by_node_id(node_id).await {
            Ok(deleted) => deleted,
            Err(err) => return storage_failure(tool_names::RESOLVE_PYTEST_ERROR, err),
        };

        let messages = StatusMessages::new().on(
            ToolStatus::Success,
            "Call next_pytest_error to get the next failure.",
        );

        messages.apply(
            ToolResult::success(format!("Resolved {} error(s) for {}", deleted, node_id))
                .with_next_action(NextAction::new(tool_names::NEXT_PYTEST_ERROR))
                .with_data("node_id", node_id)
                .with_data("deleted", deleted),
        )
    }

    /// Hand out the earliest coverage issue, optionally for one file.
    pub async fn next_coverage_issue(&self, file_path: Option<&str>) -> ToolResult {
        let next = match self
            .store
            .get_next_coverage_issue(file_path.map(str::to_string))
            .await
        {
            Ok(next) => next,
            Err(err) => return storage_failure(tool_names::NEXT_COVERAGE_ISSUE, err),
        };

        match next {
            Some(detail) => ToolResult::continuing(describe_coverage_issue(&detail))
                .with_next_action(NextAction::new(tool_names::RUN_PYTEST).with_instructions(
                    "Add a test exercising this code, then re-run pytest with coverage.",
                ))
                .with_data("issue", to_data(&detail)),
            None => ToolResult::success("No coverage issues were found"),
        }
    }

    /// Link a test module to the source file it covers.
    pub async fn register_test_file(&self, test_file: &str, source_file: &str) -> ToolResult {
        match self.store.register_test_file(test_file, source_file).await {
            Ok((test_file_id, source_file_id)) => {
                ToolResult::success(format!("Registered {} for {}", test_file, source_file))
                    .with_data("test_file_path", test_file)
                    .with_data("source_file_path", source_file)
                    .with_data("test_file_id", test_file_id.0)
                    .with_data("source_file_id", source_file_id.0)
            }
            Err(err) => storage_failure("register_test_file", err),
        }
    }

    /// Register the conventional test module for a source file.
    pub async fn register_test_for_source(&self, source_file: &str, test_type: &str) -> ToolResult {
        match paths::source_to_test_path(source_file, test_type) {
            Ok(test_file) => self.register_test_file(&test_file, source_file).await,
            Err(err) => ToolResult::error(format!("Cannot derive a test path: {}", err)),
        }
    }

    /// Record a pytest report and, when given, a coverage report as one stage.
    pub async fn record_run(
        &self,
        test_file: &str,
        pytest_report: &Value,
        coverage_report: Option<&Value>,
    ) -> ToolResult {
        let mut steps = vec![(
            "pytest".to_string(),
            self.record_pytest_report(test_file, pytest_report).await,
        )];
        if let Some(report) = coverage_report {
            steps.push((
                "coverage".to_string(),
                self.record_coverage_report(report).await,
            ));
        }
        ToolResult::stage("run_pytest", steps).with_data("test_file_path", test_file)
    }
}

fn describe_coverage_issue(detail: &CoverageIssueDetail) -> String {
    let issue = &detail.issue;
    let mut message = format!(
        "Missing coverage in {} at line {}",
        issue.file_path, issue.line_number
    );
    for branch in &detail.branches {
        message.push_str(&format!(
            "\n  branch {} -> {} ({}): {}",
            branch.source_line, branch.end_line, branch.branch_type, branch.condition
        ));
    }
    message
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tools_tests;
