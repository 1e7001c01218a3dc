//! Aggregate operations: record one tool run, hand out the next thing to fix.

use async_trait::async_trait;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::error_rows::{self, ErrorTable};
use super::{
    coverage_branches, coverage_issues, require_non_empty, source_files, test_files,
    CollectionError, CoverageEntry, CoverageIssueDetail, PytestError, PytestSummary, QaStore,
    SourceFileDetail, SourceFileId, SqliteStore, TestErrorInput, TestFileDetail, TestFileId,
    TestFileUpdate,
};
use crate::error::StorageResult;

/// Upsert the test file at `path`, replace the rows of `table` for it.
async fn replace_errors(
    conn: &mut SqliteConnection,
    table: ErrorTable,
    path: &str,
    summary: Option<&PytestSummary>,
    errors: &[TestErrorInput],
) -> StorageResult<TestFileId> {
    let test_file_id = match test_files::find_by_path(&mut *conn, path).await? {
        Some(existing) => {
            if let Some(summary) = summary {
                let changes = TestFileUpdate {
                    pytest_summary: Some(summary.clone()),
                    ..TestFileUpdate::default()
                };
                test_files::update(&mut *conn, existing.id, &changes).await?;
            }
            existing.id
        }
        None => {
            let initial = summary.cloned().unwrap_or_default();
            test_files::insert(&mut *conn, path, None, &initial).await?
        }
    };

    let removed = error_rows::delete_by_test_file(&mut *conn, table, test_file_id).await?;
    for error in errors {
        let error_type = error
            .error_type
            .as_deref()
            .unwrap_or(table.default_error_type());
        error_rows::insert(&mut *conn, table, test_file_id, error, error_type).await?;
    }

    debug!(
        table = table.name(),
        test_file_id = %test_file_id,
        removed,
        inserted = errors.len(),
        "Error rows replaced"
    );
    Ok(test_file_id)
}

async fn coverage_detail(
    conn: &mut SqliteConnection,
    issue: super::CoverageIssue,
) -> StorageResult<CoverageIssueDetail> {
    let branches = coverage_branches::list_by_issue(&mut *conn, issue.id).await?;
    Ok(CoverageIssueDetail { issue, branches })
}

#[async_trait]
impl QaStore for SqliteStore {
    async fn save_test_results(
        &self,
        test_file_path: &str,
        summary: &PytestSummary,
        errors: &[TestErrorInput],
    ) -> StorageResult<TestFileId> {
        require_non_empty("test_file_path", test_file_path)?;

        let mut scope = self.scope().await?;
        let test_file_id = replace_errors(
            &mut scope,
            ErrorTable::Test,
            test_file_path,
            Some(summary),
            errors,
        )
        .await?;
        scope.commit().await?;

        info!(
            path = %test_file_path,
            test_file_id = %test_file_id,
            errors = errors.len(),
            "Test results saved"
        );
        Ok(test_file_id)
    }

    async fn save_collection_errors(
        &self,
        test_file_path: &str,
        errors: &[TestErrorInput],
    ) -> StorageResult<TestFileId> {
        require_non_empty("test_file_path", test_file_path)?;

        let mut scope = self.scope().await?;
        let test_file_id = replace_errors(
            &mut scope,
            ErrorTable::Collection,
            test_file_path,
            None,
            errors,
        )
        .await?;
        scope.commit().await?;

        info!(
            path = %test_file_path,
            test_file_id = %test_file_id,
            errors = errors.len(),
            "Collection errors saved"
        );
        Ok(test_file_id)
    }

    async fn save_pytest_run(
        &self,
        test_file_path: &str,
        summary: &PytestSummary,
        errors: &[TestErrorInput],
        collection_errors: &[TestErrorInput],
    ) -> StorageResult<TestFileId> {
        require_non_empty("test_file_path", test_file_path)?;

        let mut scope = self.scope().await?;
        let test_file_id = replace_errors(
            &mut scope,
            ErrorTable::Test,
            test_file_path,
            Some(summary),
            errors,
        )
        .await?;
        replace_errors(
            &mut scope,
            ErrorTable::Collection,
            test_file_path,
            None,
            collection_errors,
        )
        .await?;
        scope.commit().await?;

        info!(
            path = %test_file_path,
            test_file_id = %test_file_id,
            errors = errors.len(),
            collection_errors = collection_errors.len(),
            "Pytest run saved"
        );
        Ok(test_file_id)
    }

    async fn save_coverage_issues(
        &self,
        source_file_path: &str,
        entries: &[CoverageEntry],
    ) -> StorageResult<SourceFileId> {
        require_non_empty("source_file_path", source_file_path)?;

        let mut scope = self.scope().await?;
        let source_file_id = source_files::get_or_create(&mut scope, source_file_path).await?;
        coverage_issues::delete_by_file_path(&mut scope, source_file_path).await?;

        let mut lines = Vec::new();
        let mut standalone = Vec::new();
        for entry in entries {
            match entry {
                CoverageEntry::CoverageIssue(line) => lines.push(line),
                CoverageEntry::CoverageBranch(branch) => standalone.push(branch),
            }
        }

        let mut branch_count = 0usize;
        for line in &lines {
            let issue_id = coverage_issues::insert(
                &mut scope,
                source_file_path,
                Some(source_file_id),
                line.line_number,
                line.is_excluded,
            )
            .await?;
            for branch in &line.branches {
                coverage_branches::insert(&mut scope, issue_id, branch).await?;
                branch_count += 1;
            }
        }

        // A standalone branch gets a parent issue of its own at its source line.
        for branch in &standalone {
            let issue_id = coverage_issues::insert(
                &mut scope,
                source_file_path,
                Some(source_file_id),
                branch.source_line,
                false,
            )
            .await?;
            coverage_branches::insert(&mut scope, issue_id, branch).await?;
            branch_count += 1;
        }

        scope.commit().await?;

        info!(
            path = %source_file_path,
            source_file_id = %source_file_id,
            issues = lines.len() + standalone.len(),
            branches = branch_count,
            "Coverage issues saved"
        );
        Ok(source_file_id)
    }

    async fn get_or_create_source_file(&self, file_path: &str) -> StorageResult<SourceFileId> {
        require_non_empty("file_path", file_path)?;
        let mut scope = self.scope().await?;
        let id = source_files::get_or_create(&mut scope, file_path).await?;
        scope.commit().await?;
        Ok(id)
    }

    async fn get_or_create_test_file(&self, file_path: &str) -> StorageResult<TestFileId> {
        require_non_empty("file_path", file_path)?;
        let mut scope = self.scope().await?;
        let id = test_files::get_or_create(&mut scope, file_path).await?;
        scope.commit().await?;
        Ok(id)
    }

    async fn register_test_file(
        &self,
        test_file_path: &str,
        source_file_path: &str,
    ) -> StorageResult<(TestFileId, SourceFileId)> {
        require_non_empty("test_file_path", test_file_path)?;
        require_non_empty("source_file_path", source_file_path)?;

        let mut scope = self.scope().await?;
        let source_file_id = source_files::get_or_create(&mut scope, source_file_path).await?;
        let test_file_id = match test_files::find_by_path(&mut scope, test_file_path).await? {
            Some(existing) => {
                // An existing link is kept.
                if existing.source_file_id.is_none() {
                    let changes = TestFileUpdate {
                        source_file_id: Some(source_file_id),
                        ..TestFileUpdate::default()
                    };
                    test_files::update(&mut scope, existing.id, &changes).await?;
                }
                existing.id
            }
            None => {
                test_files::insert(
                    &mut scope,
                    test_file_path,
                    Some(source_file_id),
                    &PytestSummary::default(),
                )
                .await?
            }
        };
        scope.commit().await?;

        info!(
            test_path = %test_file_path,
            source_path = %source_file_path,
            test_file_id = %test_file_id,
            source_file_id = %source_file_id,
            "Test file registered"
        );
        Ok((test_file_id, source_file_id))
    }

    async fn get_next_error(&self, test_file_path: &str) -> StorageResult<Option<PytestError>> {
        require_non_empty("test_file_path", test_file_path)?;
        let mut scope = self.scope().await?;
        let next = match test_files::find_by_path(&mut scope, test_file_path).await? {
            Some(file) => error_rows::first_for_test_file(&mut scope, ErrorTable::Test, file.id)
                .await?
                .map(PytestError::try_from)
                .transpose()?,
            None => None,
        };
        scope.commit().await?;
        Ok(next)
    }

    async fn get_next_collection_error(
        &self,
        test_file_path: &str,
    ) -> StorageResult<Option<CollectionError>> {
        require_non_empty("test_file_path", test_file_path)?;
        let mut scope = self.scope().await?;
        let next = match test_files::find_by_path(&mut scope, test_file_path).await? {
            Some(file) => {
                error_rows::first_for_test_file(&mut scope, ErrorTable::Collection, file.id)
                    .await?
                    .map(CollectionError::try_from)
                    .transpose()?
            }
            None => None,
        };
        scope.commit().await?;
        Ok(next)
    }

    async fn get_next_coverage_issue(
        &self,
        file_path: Option<String>,
    ) -> StorageResult<Option<CoverageIssueDetail>> {
        if let Some(path) = &file_path {
            require_non_empty("file_path", path)?;
        }
        let mut scope = self.scope().await?;
        let next = match coverage_issues::first(&mut scope, file_path.as_deref()).await? {
            Some(issue) => Some(coverage_detail(&mut scope, issue).await?),
            None => None,
        };
        scope.commit().await?;
        Ok(next)
    }

    async fn delete_error_by_node_id(&self, node_id: &str) -> StorageResult<u64> {
        require_non_empty("node_id", node_id)?;
        let mut scope = self.scope().await?;
        let tests = error_rows::delete_by_node_id(&mut scope, ErrorTable::Test, node_id).await?;
        let collection =
            error_rows::delete_by_node_id(&mut scope, ErrorTable::Collection, node_id).await?;
        scope.commit().await?;

        let total = tests + collection;
        info!(node_id = %node_id, deleted = total, "Errors resolved");
        Ok(total)
    }
}

impl SqliteStore {
    /// A test file with its current test and collection errors.
    pub async fn get_test_file_detail(
        &self,
        test_file_path: &str,
    ) -> StorageResult<Option<TestFileDetail>> {
        require_non_empty("test_file_path", test_file_path)?;
        let mut scope = self.scope().await?;
        let detail = match test_files::find_by_path(&mut scope, test_file_path).await? {
            Some(file) => {
                let errors = error_rows::list_by_test_file(&mut scope, ErrorTable::Test, file.id)
                    .await?
                    .into_iter()
                    .map(PytestError::try_from)
                    .collect::<StorageResult<Vec<_>>>()?;
                let collection_errors =
                    error_rows::list_by_test_file(&mut scope, ErrorTable::Collection, file.id)
                        .await?
                        .into_iter()
                        .map(CollectionError::try_from)
                        .collect::<StorageResult<Vec<_>>>()?;
                Some(TestFileDetail {
                    file,
                    errors,
                    collection_errors,
                })
            }
            None => None,
        };
        scope.commit().await?;
        Ok(detail)
    }

    /// A source file with its coverage issues and their branches.
    pub async fn get_source_file_detail(
        &self,
        source_file_path: &str,
    ) -> StorageResult<Option<SourceFileDetail>> {
        require_non_empty("source_file_path", source_file_path)?;
        let mut scope = self.scope().await?;
        let detail = match source_files::find_by_path(&mut scope, source_file_path).await? {
            Some(file) => {
                let issues = coverage_issues::list_by_file_path(&mut scope, source_file_path).await?;
                let mut coverage_issues = Vec::with_capacity(issues.len());
                for issue in issues {
                    coverage_issues.push(coverage_detail(&mut scope, issue).await?);
                }
                Some(SourceFileDetail {
                    file,
                    coverage_issues,
                })
            }
            None => None,
        };
        scope.commit().await?;
        Ok(detail)
    }
}
