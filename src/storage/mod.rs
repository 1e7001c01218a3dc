//! Storage layer for QA result tracking.
//!
//! This module provides SQLite-based persistence for tracked source files,
//! test files, pytest failures, collection errors, coverage issues and their
//! branches, plus the aggregate operations that record one tool run at a time.
//!
//! Every operation opens exactly one scope (a transaction) on the store, so a
//! failure partway through never leaves a half-written run behind.

mod collection_errors;
mod coverage_branches;
mod coverage_issues;
mod error_rows;
mod pytest_errors;
mod registry;
mod repository;
mod schema;
mod source_files;
mod sqlite;
mod test_files;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use collection_errors::CollectionErrorRepo;
pub use coverage_branches::CoverageBranchRepo;
pub use coverage_issues::CoverageIssueRepo;
pub use pytest_errors::PytestErrorRepo;
pub use registry::StoreRegistry;
pub use schema::{execute_schema, SCHEMA_STATEMENTS};
pub use source_files::SourceFileRepo;
pub use sqlite::{Scope, SqliteStore};
pub use test_files::TestFileRepo;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Error type recorded for failures coming from a test run.
pub const ERROR_TYPE_TEST: &str = "PyTestError";

/// Error type recorded for failures raised while collecting a test module.
pub const ERROR_TYPE_COLLECTION: &str = "collection_error";

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of a tracked source file.
    SourceFileId
);
record_id!(
    /// Identifier of a tracked test module.
    TestFileId
);
record_id!(
    /// Identifier of a stored test failure.
    PytestErrorId
);
record_id!(
    /// Identifier of a stored collection error.
    CollectionErrorId
);
record_id!(
    /// Identifier of a stored coverage issue.
    CoverageIssueId
);
record_id!(
    /// Identifier of a stored coverage branch.
    CoverageBranchId
);

// ============================================================================
// Records
// ============================================================================

/// A tracked production source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: SourceFileId,
    /// Natural key.
    pub file_path: String,
    pub file_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tracked test module and the summary of its latest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestFile {
    pub id: TestFileId,
    /// Natural key.
    pub file_path: String,
    /// Source file this module tests, if known.
    pub source_file_id: Option<SourceFileId>,
    pub pytest_summary: PytestSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One failing test case from the latest run of its test file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PytestError {
    pub id: PytestErrorId,
    pub node_id: String,
    pub test_file_id: TestFileId,
    pub outcome: String,
    pub error_type: String,
    /// Structured detail (location, duration, ...).
    pub result: serde_json::Value,
    /// Human-readable failure text.
    pub longrepr: String,
    pub created_at: DateTime<Utc>,
}

/// A failure raised while collecting (importing) a test module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionError {
    pub id: CollectionErrorId,
    pub node_id: String,
    pub test_file_id: TestFileId,
    pub outcome: String,
    pub error_type: String,
    pub result: serde_json::Value,
    pub longrepr: String,
    pub created_at: DateTime<Utc>,
}

/// A source position lacking coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageIssue {
    pub id: CoverageIssueId,
    pub file_path: String,
    pub source_file_id: Option<SourceFileId>,
    pub line_number: i64,
    pub is_excluded: bool,
    pub created_at: DateTime<Utc>,
}

/// A conditional that was never fully exercised, owned by a coverage issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageBranch {
    pub id: CoverageBranchId,
    pub coverage_issue_id: CoverageIssueId,
    pub source_line: i64,
    pub end_line: i64,
    pub condition: String,
    pub branch_type: String,
    pub created_at: DateTime<Utc>,
}

/// Summary counts of one pytest run.
///
/// Unknown keys reported by the runner are kept in `extra` so nothing the
/// runner said is lost on a round trip through the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PytestSummary {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub passed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default, alias = "error")]
    pub errors: u64,
    #[serde(default)]
    pub xfailed: u64,
    #[serde(default)]
    pub xpassed: u64,
    #[serde(default)]
    pub collected: u64,
    #[serde(default)]
    pub collection_failures: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PytestSummary {
    /// Summary with only `total` and `failed` set.
    pub fn new(total: u64, failed: u64) -> Self {
        Self {
            total,
            failed,
            ..Self::default()
        }
    }
}

// ============================================================================
// Composite views
// ============================================================================

/// A coverage issue together with its branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageIssueDetail {
    #[serde(flatten)]
    pub issue: CoverageIssue,
    pub branches: Vec<CoverageBranch>,
}

/// A test file together with everything its latest run left behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestFileDetail {
    #[serde(flatten)]
    pub file: TestFile,
    pub errors: Vec<PytestError>,
    pub collection_errors: Vec<CollectionError>,
}

/// A source file together with its coverage issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFileDetail {
    #[serde(flatten)]
    pub file: SourceFile,
    pub coverage_issues: Vec<CoverageIssueDetail>,
}

// ============================================================================
// Inputs supplied by tool runners
// ============================================================================

/// A test failure as reported by a test runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestErrorInput {
    #[serde(alias = "nodeid")]
    pub node_id: String,
    #[serde(default = "default_outcome")]
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default = "default_result")]
    pub result: serde_json::Value,
    #[serde(default)]
    pub longrepr: String,
}

fn default_outcome() -> String {
    "failed".to_string()
}

fn default_result() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}

impl TestErrorInput {
    /// Create a failed-test input with the given failure text.
    pub fn new(node_id: impl Into<String>, longrepr: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            outcome: default_outcome(),
            error_type: None,
            result: default_result(),
            longrepr: longrepr.into(),
        }
    }

    /// Override the outcome.
    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = outcome.into();
        self
    }

    /// Override the recorded error type.
    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    /// Attach structured detail.
    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = result;
        self
    }
}

/// A branch the coverage tool saw only partially exercised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchInput {
    #[serde(default)]
    pub source_line: i64,
    #[serde(default)]
    pub end_line: i64,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub branch_type: String,
}

/// A missing line, optionally carrying nested branches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineIssueInput {
    #[serde(default)]
    pub line_number: i64,
    #[serde(default)]
    pub is_excluded: bool,
    #[serde(default)]
    pub branches: Vec<BranchInput>,
}

/// One entry of a coverage run, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoverageEntry {
    /// Line-level issue.
    CoverageIssue(LineIssueInput),
    /// Standalone branch-level issue; stored under a parent issue created for it.
    CoverageBranch(BranchInput),
}

impl CoverageEntry {
    /// Line issue without branches.
    pub fn line(line_number: i64) -> Self {
        CoverageEntry::CoverageIssue(LineIssueInput {
            line_number,
            ..LineIssueInput::default()
        })
    }

    /// Standalone branch issue.
    pub fn branch(branch: BranchInput) -> Self {
        CoverageEntry::CoverageBranch(branch)
    }

    /// A line the coverage tool was told to ignore.
    pub fn is_excluded(&self) -> bool {
        matches!(self, CoverageEntry::CoverageIssue(line) if line.is_excluded)
    }
}

// ============================================================================
// Partial updates and paging
// ============================================================================

/// Fields of a source file that may be changed.
#[derive(Debug, Clone, Default)]
pub struct SourceFileUpdate {
    pub file_hash: Option<String>,
}

impl SourceFileUpdate {
    pub fn is_empty(&self) -> bool {
        self.file_hash.is_none()
    }
}

/// Fields of a test file that may be changed.
#[derive(Debug, Clone, Default)]
pub struct TestFileUpdate {
    pub source_file_id: Option<SourceFileId>,
    pub pytest_summary: Option<PytestSummary>,
}

impl TestFileUpdate {
    pub fn is_empty(&self) -> bool {
        self.source_file_id.is_none() && self.pytest_summary.is_none()
    }
}

/// Fields of a coverage issue that may be changed.
#[derive(Debug, Clone, Default)]
pub struct CoverageIssueUpdate {
    pub is_excluded: Option<bool>,
    pub source_file_id: Option<SourceFileId>,
}

impl CoverageIssueUpdate {
    pub fn is_empty(&self) -> bool {
        self.is_excluded.is_none() && self.source_file_id.is_none()
    }
}

/// Pagination window for listings, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

// ============================================================================
// Aggregate operations
// ============================================================================

/// The aggregate operations a tool run needs from the store.
///
/// Workflow tools depend on this trait rather than on [`SqliteStore`] so they
/// can be driven against any backing store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QaStore: Send + Sync {
    /// Record one pytest run: upsert the test file, replace its errors.
    async fn save_test_results(
        &self,
        test_file_path: &str,
        summary: &PytestSummary,
        errors: &[TestErrorInput],
    ) -> StorageResult<TestFileId>;

    /// Replace the collection errors recorded for a test file.
    async fn save_collection_errors(
        &self,
        test_file_path: &str,
        errors: &[TestErrorInput],
    ) -> StorageResult<TestFileId>;

    /// Record a whole pytest run in one scope: the summary, the failed tests
    /// and the collection errors. Either everything is replaced or nothing is.
    async fn save_pytest_run(
        &self,
        test_file_path: &str,
        summary: &PytestSummary,
        errors: &[TestErrorInput],
        collection_errors: &[TestErrorInput],
    ) -> StorageResult<TestFileId>;

    /// Record one coverage run for a source file, replacing its issues.
    async fn save_coverage_issues(
        &self,
        source_file_path: &str,
        entries: &[CoverageEntry],
    ) -> StorageResult<SourceFileId>;

    /// Idempotently register a source file.
    async fn get_or_create_source_file(&self, file_path: &str) -> StorageResult<SourceFileId>;

    /// Idempotently register a test file.
    async fn get_or_create_test_file(&self, file_path: &str) -> StorageResult<TestFileId>;

    /// Register a test file and link it to the source file it tests.
    ///
    /// Returns the test file id and the id of the source file at
    /// `source_file_path`, both read in the same scope.
    async fn register_test_file(
        &self,
        test_file_path: &str,
        source_file_path: &str,
    ) -> StorageResult<(TestFileId, SourceFileId)>;

    /// Lowest-id error stored for the test file, if any.
    async fn get_next_error(&self, test_file_path: &str) -> StorageResult<Option<PytestError>>;

    /// Lowest-id collection error stored for the test file, if any.
    async fn get_next_collection_error(
        &self,
        test_file_path: &str,
    ) -> StorageResult<Option<CollectionError>>;

    /// Lowest-id coverage issue still needing a test, optionally restricted to one file.
    /// Excluded lines are never returned.
    async fn get_next_coverage_issue(
        &self,
        file_path: Option<String>,
    ) -> StorageResult<Option<CoverageIssueDetail>>;

    /// Remove every error row sharing a node id; returns how many went.
    async fn delete_error_by_node_id(&self, node_id: &str) -> StorageResult<u64>;
}

// ============================================================================
// Helpers shared by the repositories
// ============================================================================

/// Current time as sortable RFC 3339 text with microsecond precision.
pub(crate) fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp. A value that is not RFC 3339 is a corrupt row.
pub(crate) fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Query {
            message: format!("invalid stored timestamp '{}': {}", raw, e),
        })
}

/// Reject empty natural keys before any statement runs.
pub(crate) fn require_non_empty(field: &str, value: &str) -> StorageResult<()> {
    if value.trim().is_empty() {
        return Err(StorageError::validation(field, "cannot be empty"));
    }
    Ok(())
}
