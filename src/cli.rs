//! Command-line surface over the workflow tools.
//!
//! Every command prints JSON on stdout: a tool result for workflow commands,
//! records for `list` and `show-*`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;

use crate::reports;
use crate::storage::{Page, SqliteStore};
use crate::workflow::{QaTools, ToolResult, ToolStatus};

/// Track pytest and coverage results and hand out one issue at a time.
#[derive(Parser, Debug)]
#[command(name = "mcp-qa", version, about)]
pub struct Cli {
    /// Logical database name (defaults to QA_DB_NAME)
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// QA subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create the database and its tables
    Init,

    /// Record a pytest-json-report file for one test module
    RecordPytest {
        /// Test module the report was produced for
        test_file: String,
        /// Path to the pytest JSON report
        report: PathBuf,
        /// Coverage JSON report produced by the same run
        #[arg(long)]
        coverage: Option<PathBuf>,
    },

    /// Record a coverage.py JSON report
    RecordCoverage {
        /// Path to the coverage JSON report
        report: PathBuf,
    },

    /// Show the next stored failure of a test module
    NextError { test_file: String },

    /// Show the next stored collection error of a test module
    NextCollectionError { test_file: String },

    /// Remove stored errors for a test node once it is fixed
    ResolveError { node_id: String },

    /// Show the next coverage issue
    NextCoverage {
        /// Restrict to one source file
        #[arg(long)]
        file: Option<String>,
    },

    /// Link a test module to the source file it tests
    RegisterTest {
        /// Test module; derived from the source path when omitted
        test_file: Option<String>,
        /// Source file under test
        #[arg(long)]
        source: String,
        /// Test type directory used when deriving the test path
        #[arg(long, default_value = "unit")]
        test_type: String,
    },

    /// List stored records, newest first
    List {
        entity: Entity,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Show a test module with its current errors
    ShowTest { test_file: String },

    /// Show a source file with its coverage issues
    ShowSource { source_file: String },
}

/// Record kinds accepted by `list`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    SourceFiles,
    TestFiles,
    PytestErrors,
    CollectionErrors,
    CoverageIssues,
    CoverageBranches,
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output printed on stdout
    pub message: String,
}

impl CliResult {
    /// Exit 0 for `Success`/`Continue`, 1 for `Failure`, 2 for `Error`/`Exception`.
    pub fn from_tool_result(result: &ToolResult) -> Self {
        let exit_code = match result.status {
            ToolStatus::Success | ToolStatus::Continue => 0,
            ToolStatus::Failure => 1,
            ToolStatus::Error | ToolStatus::Exception => 2,
        };
        let message = serde_json::to_string_pretty(&result.to_value())
            .unwrap_or_else(|_| result.message.clone());
        Self { exit_code, message }
    }

    fn records<T: Serialize>(records: &T) -> Self {
        match serde_json::to_string_pretty(records) {
            Ok(message) => Self {
                exit_code: 0,
                message,
            },
            Err(e) => Self::error(format!("Failed to encode records: {}", e)),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 2,
            message: message.into(),
        }
    }
}

fn load(path: &Path) -> Result<Value, ToolResult> {
    reports::load_report(path).map_err(|e| {
        ToolResult::error(format!("Cannot read report {}: {}", path.display(), e))
    })
}

/// Execute a CLI command against an open store.
pub async fn execute_command(
    command: Commands,
    tools: &QaTools<SqliteStore>,
    store: &SqliteStore,
    default_page_limit: u32,
) -> CliResult {
    let result = match command {
        Commands::Init => {
            let location = store
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string());
            ToolResult::success(format!("Database ready at {}", location))
                .with_data("database_path", location)
        }
        Commands::RecordPytest {
            test_file,
            report,
            coverage,
        } => {
            let pytest_report = match load(&report) {
                Ok(value) => value,
                Err(result) => return CliResult::from_tool_result(&result),
            };
            match coverage {
                Some(path) => {
                    let coverage_report = match load(&path) {
                        Ok(value) => value,
                        Err(result) => return CliResult::from_tool_result(&result),
                    };
                    tools
                        .record_run(&test_file, &pytest_report, Some(&coverage_report))
                        .await
                }
                None => tools.record_pytest_report(&test_file, &pytest_report).await,
            }
        }
        Commands::RecordCoverage { report } => match load(&report) {
            Ok(value) => tools.record_coverage_report(&value).await,
            Err(result) => result,
        },
        Commands::NextError { test_file } => tools.next_pytest_error(&test_file).await,
        Commands::NextCollectionError { test_file } => {
            tools.next_collection_error(&test_file).await
        }
        Commands::ResolveError { node_id } => tools.resolve_pytest_error(&node_id).await,
        Commands::NextCoverage { file } => tools.next_coverage_issue(file.as_deref()).await,
        Commands::RegisterTest {
            test_file,
            source,
            test_type,
        } => match test_file {
            Some(test_file) => tools.register_test_file(&test_file, &source).await,
            None => tools.register_test_for_source(&source, &test_type).await,
        },
        Commands::List {
            entity,
            limit,
            offset,
        } => {
            let page = Page::new(limit.unwrap_or(default_page_limit), offset);
            return list_records(store, entity, page).await;
        }
        Commands::ShowTest { test_file } => {
            return match store.get_test_file_detail(&test_file).await {
                Ok(detail) => CliResult::records(&detail),
                Err(e) => CliResult::error(e.to_string()),
            };
        }
        Commands::ShowSource { source_file } => {
            return match store.get_source_file_detail(&source_file).await {
                Ok(detail) => CliResult::records(&detail),
                Err(e) => CliResult::error(e.to_string()),
            };
        }
    };

    CliResult::from_tool_result(&result)
}

async fn list_records(store: &SqliteStore, entity: Entity, page: Page) -> CliResult {
    let listed = match entity {
        Entity::SourceFiles => store
            .source_files()
            .list(page)
            .await
            .map(|r| CliResult::records(&r)),
        Entity::TestFiles => store
            .test_files()
            .list(page)
            .await
            .map(|r| CliResult::records(&r)),
        Entity::PytestErrors => store
            .pytest_errors()
            .list(page)
            .await
            .map(|r| CliResult::records(&r)),
        Entity::CollectionErrors => store
            .collection_errors()
            .list(page)
            .await
            .map(|r| CliResult::records(&r)),
        Entity::CoverageIssues => store
            .coverage_issues()
            .list(page)
            .await
            .map(|r| CliResult::records(&r)),
        Entity::CoverageBranches => store
            .coverage_branches()
            .list(page)
            .await
            .map(|r| CliResult::records(&r)),
    };

    listed.unwrap_or_else(|e| CliResult::error(e.to_string()))
}
