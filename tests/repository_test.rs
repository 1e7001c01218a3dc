//! Integration tests for the aggregate store operations
//!
//! Covers latest-run-only replacement, idempotent registration, cascades and
//! all-or-nothing writes against an in-memory SQLite database.

use pretty_assertions::assert_eq;
use serde_json::json;

use mcp_qa::storage::{
    BranchInput, CoverageEntry, LineIssueInput, Page, PytestSummary, QaStore, SqliteStore,
    TestErrorInput,
};

const TEST_FILE: &str = "src/tests/unit/test_models.py";
const SOURCE_FILE: &str = "src/pkg/models.py";

async fn create_test_store() -> SqliteStore {
    SqliteStore::in_memory()
        .await
        .expect("Failed to create in-memory store")
}

fn failure(name: &str, longrepr: &str) -> TestErrorInput {
    TestErrorInput::new(format!("{}::{}", TEST_FILE, name), longrepr)
}

fn branch(source_line: i64, end_line: i64) -> BranchInput {
    BranchInput {
        source_line,
        end_line,
        condition: format!("line {} didn't jump to line {}", source_line, end_line),
        branch_type: "jump".to_string(),
    }
}

#[cfg(test)]
mod test_result_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_save_then_walk_errors() {
        let store = create_test_store().await;
        let errors = vec![failure("test_a", "AssertionError"), failure("test_b", "KeyError")];

        let id = store
            .save_test_results(TEST_FILE, &PytestSummary::new(5, 2), &errors)
            .await
            .unwrap();

        let file = store.test_files().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(file.pytest_summary.failed, 2);

        let first = store.get_next_error(TEST_FILE).await.unwrap().unwrap();
        assert_eq!(first.node_id, format!("{}::test_a", TEST_FILE));
        assert_eq!(first.longrepr, "AssertionError");

        let deleted = store.delete_error_by_node_id(&first.node_id).await.unwrap();
        assert_eq!(deleted, 1);

        let second = store.get_next_error(TEST_FILE).await.unwrap().unwrap();
        assert_eq!(second.node_id, format!("{}::test_b", TEST_FILE));

        store.delete_error_by_node_id(&second.node_id).await.unwrap();
        assert!(store.get_next_error(TEST_FILE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rerun_replaces_previous_errors() {
        let store = create_test_store().await;
        let first_id = store
            .save_test_results(
                TEST_FILE,
                &PytestSummary::new(3, 3),
                &[failure("a", ""), failure("b", ""), failure("c", "")],
            )
            .await
            .unwrap();

        let second_id = store
            .save_test_results(TEST_FILE, &PytestSummary::new(3, 1), &[failure("b", "still")])
            .await
            .unwrap();

        assert_eq!(first_id, second_id, "Test file identity is stable");
        let errors = store.pytest_errors().list_by_test_file(second_id).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].longrepr, "still");

        let file = store.test_files().get_by_id(second_id).await.unwrap().unwrap();
        assert_eq!(file.pytest_summary.failed, 1);
        assert_eq!(store.test_files().list(Page::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_run_twice_is_idempotent() {
        let store = create_test_store().await;
        let errors = vec![failure("a", "x"), failure("b", "y")];

        store
            .save_test_results(TEST_FILE, &PytestSummary::new(2, 2), &errors)
            .await
            .unwrap();
        let id = store
            .save_test_results(TEST_FILE, &PytestSummary::new(2, 2), &errors)
            .await
            .unwrap();

        let stored = store.pytest_errors().list_by_test_file(id).await.unwrap();
        let nodes: Vec<_> = stored.iter().map(|e| e.node_id.clone()).collect();
        assert_eq!(
            nodes,
            vec![format!("{}::a", TEST_FILE), format!("{}::b", TEST_FILE)]
        );
    }

    #[tokio::test]
    async fn test_clean_run_clears_errors() {
        let store = create_test_store().await;
        store
            .save_test_results(TEST_FILE, &PytestSummary::new(1, 1), &[failure("a", "")])
            .await
            .unwrap();

        store
            .save_test_results(TEST_FILE, &PytestSummary::new(1, 0), &[])
            .await
            .unwrap();

        assert!(store.get_next_error(TEST_FILE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rerun_leaves_collection_errors_alone() {
        let store = create_test_store().await;
        store
            .save_collection_errors(TEST_FILE, &[TestErrorInput::new(TEST_FILE, "ImportError")])
            .await
            .unwrap();

        store
            .save_test_results(TEST_FILE, &PytestSummary::new(1, 1), &[failure("a", "")])
            .await
            .unwrap();

        let next = store.get_next_collection_error(TEST_FILE).await.unwrap();
        assert!(next.is_some());
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_whole_run() {
        let store = create_test_store().await;
        store
            .save_test_results(TEST_FILE, &PytestSummary::new(2, 1), &[failure("kept", "old")])
            .await
            .unwrap();

        // The empty node id violates a table constraint after the old rows are gone.
        let result = store
            .save_test_results(
                TEST_FILE,
                &PytestSummary::new(9, 9),
                &[failure("new", "fresh"), TestErrorInput::new("", "bad")],
            )
            .await;
        assert!(result.is_err());

        let file = store.test_files().get_by_path(TEST_FILE).await.unwrap().unwrap();
        assert_eq!(file.pytest_summary, PytestSummary::new(2, 1));
        let errors = store.pytest_errors().list_by_test_file(file.id).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].longrepr, "old");
    }

    #[tokio::test]
    async fn test_pytest_run_saves_errors_and_collection_errors() {
        let store = create_test_store().await;

        let id = store
            .save_pytest_run(
                TEST_FILE,
                &PytestSummary::new(1, 1),
                &[failure("a", "boom")],
                &[TestErrorInput::new(TEST_FILE, "ImportError")],
            )
            .await
            .unwrap();

        let detail = store.get_test_file_detail(TEST_FILE).await.unwrap().unwrap();
        assert_eq!(detail.file.id, id);
        assert_eq!(detail.errors.len(), 1);
        assert_eq!(detail.collection_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_pytest_run_with_bad_collection_error_keeps_previous_run() {
        let store = create_test_store().await;
        store
            .save_pytest_run(
                TEST_FILE,
                &PytestSummary::new(2, 1),
                &[failure("kept", "old")],
                &[TestErrorInput::new(TEST_FILE, "old ImportError")],
            )
            .await
            .unwrap();

        // The test errors are fine; the empty node id fails only in the second table.
        let result = store
            .save_pytest_run(
                TEST_FILE,
                &PytestSummary::new(9, 0),
                &[],
                &[TestErrorInput::new("", "bad")],
            )
            .await;
        assert!(result.is_err());

        let detail = store.get_test_file_detail(TEST_FILE).await.unwrap().unwrap();
        assert_eq!(detail.file.pytest_summary, PytestSummary::new(2, 1));
        assert_eq!(detail.errors.len(), 1);
        assert_eq!(detail.errors[0].longrepr, "old");
        assert_eq!(detail.collection_errors.len(), 1);
        assert_eq!(detail.collection_errors[0].longrepr, "old ImportError");
    }

    #[tokio::test]
    async fn test_empty_path_is_validation_error() {
        let store = create_test_store().await;

        let err = store
            .save_test_results("", &PytestSummary::default(), &[])
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(store.test_files().list(Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_next_error_for_unknown_file_is_none() {
        let store = create_test_store().await;

        assert!(store.get_next_error("tests/test_nope.py").await.unwrap().is_none());
        assert!(store
            .get_next_collection_error("tests/test_nope.py")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_error_result_round_trips() {
        let store = create_test_store().await;
        let input = failure("a", "boom")
            .with_result(json!({"file": TEST_FILE, "line": 3, "duration": 0.25}));

        store
            .save_test_results(TEST_FILE, &PytestSummary::new(1, 1), &[input])
            .await
            .unwrap();

        let error = store.get_next_error(TEST_FILE).await.unwrap().unwrap();
        assert_eq!(error.result["line"], json!(3));
        assert_eq!(error.result["duration"], json!(0.25));
    }
}

#[cfg(test)]
mod collection_error_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_collection_errors_replace_and_resolve() {
        let store = create_test_store().await;
        store
            .save_collection_errors(
                TEST_FILE,
                &[
                    TestErrorInput::new(TEST_FILE, "ImportError: no module named 'x'"),
                    TestErrorInput::new(format!("{}::Cls", TEST_FILE), "NameError"),
                ],
            )
            .await
            .unwrap();

        let first = store.get_next_collection_error(TEST_FILE).await.unwrap().unwrap();
        assert_eq!(first.node_id, TEST_FILE);
        assert_eq!(first.error_type, "collection_error");

        let id = store
            .save_collection_errors(TEST_FILE, &[TestErrorInput::new(TEST_FILE, "SyntaxError")])
            .await
            .unwrap();
        let remaining = store.collection_errors().list_by_test_file(id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].longrepr, "SyntaxError");

        assert_eq!(store.delete_error_by_node_id(TEST_FILE).await.unwrap(), 1);
        assert!(store.get_next_collection_error(TEST_FILE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_node_id_spans_both_tables() {
        let store = create_test_store().await;
        let node = format!("{}::test_a", TEST_FILE);
        store
            .save_test_results(TEST_FILE, &PytestSummary::new(1, 1), &[TestErrorInput::new(node.clone(), "")])
            .await
            .unwrap();
        store
            .save_collection_errors(TEST_FILE, &[TestErrorInput::new(node.clone(), "")])
            .await
            .unwrap();

        assert_eq!(store.delete_error_by_node_id(&node).await.unwrap(), 2);
        assert_eq!(store.delete_error_by_node_id(&node).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_by_empty_node_id_is_rejected() {
        let store = create_test_store().await;

        let err = store.delete_error_by_node_id(" ").await.unwrap_err();
        assert!(err.is_validation());
    }
}

#[cfg(test)]
mod coverage_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_save_coverage_with_nested_and_standalone_branches() {
        let store = create_test_store().await;
        let entries = vec![
            CoverageEntry::CoverageIssue(LineIssueInput {
                line_number: 10,
                is_excluded: false,
                branches: vec![branch(10, 12)],
            }),
            CoverageEntry::line(20),
            CoverageEntry::branch(branch(30, 0)),
        ];

        let source_id = store.save_coverage_issues(SOURCE_FILE, &entries).await.unwrap();

        let first = store.get_next_coverage_issue(None).await.unwrap().unwrap();
        assert_eq!(first.issue.line_number, 10);
        assert_eq!(first.issue.source_file_id, Some(source_id));
        assert_eq!(first.branches.len(), 1);
        assert_eq!(first.branches[0].end_line, 12);

        let detail = store.get_source_file_detail(SOURCE_FILE).await.unwrap().unwrap();
        let lines: Vec<_> = detail
            .coverage_issues
            .iter()
            .map(|d| (d.issue.line_number, d.branches.len()))
            .collect();
        assert_eq!(lines, vec![(10, 1), (20, 0), (30, 1)]);
    }

    #[tokio::test]
    async fn test_coverage_rerun_replaces_only_that_file() {
        let store = create_test_store().await;
        store
            .save_coverage_issues(SOURCE_FILE, &[CoverageEntry::line(1), CoverageEntry::line(2)])
            .await
            .unwrap();
        store
            .save_coverage_issues("src/pkg/other.py", &[CoverageEntry::line(7)])
            .await
            .unwrap();

        let first_id = store.get_or_create_source_file(SOURCE_FILE).await.unwrap();
        let second_id = store
            .save_coverage_issues(SOURCE_FILE, &[CoverageEntry::line(2)])
            .await
            .unwrap();
        assert_eq!(first_id, second_id);

        let issues = store.coverage_issues().list_by_file_path(SOURCE_FILE).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line_number, 2);

        let other = store
            .get_next_coverage_issue(Some("src/pkg/other.py".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other.issue.line_number, 7);
    }

    #[tokio::test]
    async fn test_clean_coverage_clears_issues_and_branches() {
        let store = create_test_store().await;
        store
            .save_coverage_issues(
                SOURCE_FILE,
                &[CoverageEntry::CoverageIssue(LineIssueInput {
                    line_number: 4,
                    is_excluded: false,
                    branches: vec![branch(4, 6)],
                })],
            )
            .await
            .unwrap();

        store.save_coverage_issues(SOURCE_FILE, &[]).await.unwrap();

        assert!(store.get_next_coverage_issue(None).await.unwrap().is_none());
        assert!(store
            .coverage_branches()
            .list(Page::default())
            .await
            .unwrap()
            .is_empty());
        assert!(store.source_files().get_by_path(SOURCE_FILE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_line_rolls_back_coverage_run() {
        let store = create_test_store().await;
        store
            .save_coverage_issues(SOURCE_FILE, &[CoverageEntry::line(5)])
            .await
            .unwrap();

        let result = store
            .save_coverage_issues(SOURCE_FILE, &[CoverageEntry::line(8), CoverageEntry::line(-3)])
            .await;
        assert!(result.is_err());

        let issues = store.coverage_issues().list_by_file_path(SOURCE_FILE).await.unwrap();
        let lines: Vec<_> = issues.iter().map(|i| i.line_number).collect();
        assert_eq!(lines, vec![5]);
    }

    #[tokio::test]
    async fn test_excluded_lines_are_stored_but_never_handed_out() {
        let store = create_test_store().await;
        let excluded = CoverageEntry::CoverageIssue(LineIssueInput {
            line_number: 3,
            is_excluded: true,
            branches: Vec::new(),
        });
        store
            .save_coverage_issues(SOURCE_FILE, &[excluded.clone()])
            .await
            .unwrap();

        assert!(store
            .get_next_coverage_issue(Some(SOURCE_FILE.to_string()))
            .await
            .unwrap()
            .is_none());
        assert!(store.get_next_coverage_issue(None).await.unwrap().is_none());

        let detail = store.get_source_file_detail(SOURCE_FILE).await.unwrap().unwrap();
        assert_eq!(detail.coverage_issues.len(), 1);
        assert!(detail.coverage_issues[0].issue.is_excluded);

        // A real gap after an excluded line is still found.
        store
            .save_coverage_issues(SOURCE_FILE, &[excluded, CoverageEntry::line(12)])
            .await
            .unwrap();
        let next = store.get_next_coverage_issue(None).await.unwrap().unwrap();
        assert_eq!(next.issue.line_number, 12);
    }

    #[tokio::test]
    async fn test_next_coverage_issue_rejects_empty_filter() {
        let store = create_test_store().await;

        let err = store
            .get_next_coverage_issue(Some(String::new()))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}

#[cfg(test)]
mod registration_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = create_test_store().await;

        let a = store.get_or_create_source_file(SOURCE_FILE).await.unwrap();
        let b = store.get_or_create_source_file(SOURCE_FILE).await.unwrap();
        assert_eq!(a, b);

        let t1 = store.get_or_create_test_file(TEST_FILE).await.unwrap();
        let t2 = store.get_or_create_test_file(TEST_FILE).await.unwrap();
        assert_eq!(t1, t2);
        assert_eq!(store.source_files().list(Page::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_links_test_to_source() {
        let store = create_test_store().await;

        let (test_id, source_id) = store.register_test_file(TEST_FILE, SOURCE_FILE).await.unwrap();
        let source = store.source_files().get_by_path(SOURCE_FILE).await.unwrap().unwrap();

        assert_eq!(source_id, source.id);
        let file = store.test_files().get_by_id(test_id).await.unwrap().unwrap();
        assert_eq!(file.source_file_id, Some(source.id));
    }

    #[tokio::test]
    async fn test_register_links_previously_unlinked_file() {
        let store = create_test_store().await;
        let test_id = store
            .save_test_results(TEST_FILE, &PytestSummary::new(1, 0), &[])
            .await
            .unwrap();

        let (registered, _) = store.register_test_file(TEST_FILE, SOURCE_FILE).await.unwrap();

        assert_eq!(registered, test_id);
        let file = store.test_files().get_by_id(test_id).await.unwrap().unwrap();
        assert!(file.source_file_id.is_some());
        assert_eq!(file.pytest_summary.total, 1);
    }

    #[tokio::test]
    async fn test_register_keeps_existing_link() {
        let store = create_test_store().await;
        store.register_test_file(TEST_FILE, SOURCE_FILE).await.unwrap();
        let original = store.source_files().get_by_path(SOURCE_FILE).await.unwrap().unwrap();

        let (_, elsewhere_id) = store
            .register_test_file(TEST_FILE, "src/pkg/elsewhere.py")
            .await
            .unwrap();

        let file = store.test_files().get_by_path(TEST_FILE).await.unwrap().unwrap();
        assert_eq!(file.source_file_id, Some(original.id));
        let elsewhere = store
            .source_files()
            .get_by_path("src/pkg/elsewhere.py")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(elsewhere_id, elsewhere.id);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_source() {
        let store = create_test_store().await;

        let err = store.register_test_file(TEST_FILE, "").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_test_file_detail_collects_everything() {
        let store = create_test_store().await;
        store
            .save_test_results(TEST_FILE, &PytestSummary::new(2, 1), &[failure("a", "x")])
            .await
            .unwrap();
        store
            .save_collection_errors(TEST_FILE, &[TestErrorInput::new(TEST_FILE, "y")])
            .await
            .unwrap();

        let detail = store.get_test_file_detail(TEST_FILE).await.unwrap().unwrap();
        assert_eq!(detail.file.file_path, TEST_FILE);
        assert_eq!(detail.errors.len(), 1);
        assert_eq!(detail.collection_errors.len(), 1);

        assert!(store
            .get_test_file_detail("tests/test_missing.py")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_deleting_test_file_cascades_to_errors() {
        let store = create_test_store().await;
        let id = store
            .save_test_results(TEST_FILE, &PytestSummary::new(1, 1), &[failure("a", "")])
            .await
            .unwrap();

        store.test_files().delete(id).await.unwrap();

        assert!(store.get_next_error(TEST_FILE).await.unwrap().is_none());
        assert!(store.pytest_errors().list(Page::default()).await.unwrap().is_empty());
    }
}
