use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// DDL applied to every database on open. Each statement is idempotent.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS source_files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL UNIQUE CHECK (file_path <> ''),
        file_hash TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pytest_files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL UNIQUE CHECK (file_path <> ''),
        source_file_id INTEGER REFERENCES source_files(id) ON DELETE SET NULL,
        pytest_summary TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pytest_errors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        node_id TEXT NOT NULL CHECK (node_id <> ''),
        test_file_id INTEGER NOT NULL REFERENCES pytest_files(id) ON DELETE CASCADE,
        outcome TEXT NOT NULL DEFAULT 'failed',
        error_type TEXT NOT NULL,
        result TEXT NOT NULL DEFAULT '[]',
        longrepr TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pytest_collection_errors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        node_id TEXT NOT NULL CHECK (node_id <> ''),
        test_file_id INTEGER NOT NULL REFERENCES pytest_files(id) ON DELETE CASCADE,
        outcome TEXT NOT NULL DEFAULT 'failed',
        error_type TEXT NOT NULL DEFAULT 'collection_error',
        result TEXT NOT NULL DEFAULT '[]',
        longrepr TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS coverage_issues (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL CHECK (file_path <> ''),
        source_file_id INTEGER REFERENCES source_files(id) ON DELETE SET NULL,
        line_number INTEGER NOT NULL CHECK (line_number >= 0),
        is_excluded INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS coverage_branches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        coverage_issue_id INTEGER NOT NULL REFERENCES coverage_issues(id) ON DELETE CASCADE,
        source_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        condition TEXT NOT NULL DEFAULT '',
        branch_type TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pytest_files_source ON pytest_files(source_file_id)",
    "CREATE INDEX IF NOT EXISTS idx_pytest_errors_file ON pytest_errors(test_file_id)",
    "CREATE INDEX IF NOT EXISTS idx_pytest_errors_node ON pytest_errors(node_id)",
    "CREATE INDEX IF NOT EXISTS idx_collection_errors_file ON pytest_collection_errors(test_file_id)",
    "CREATE INDEX IF NOT EXISTS idx_collection_errors_node ON pytest_collection_errors(node_id)",
    "CREATE INDEX IF NOT EXISTS idx_coverage_issues_path ON coverage_issues(file_path)",
    "CREATE INDEX IF NOT EXISTS idx_coverage_issues_source ON coverage_issues(source_file_id)",
    "CREATE INDEX IF NOT EXISTS idx_coverage_branches_issue ON coverage_branches(coverage_issue_id)",
];

/// Apply [`SCHEMA_STATEMENTS`] on `conn`, stopping at the first failure.
pub async fn execute_schema(conn: &mut SqliteConnection) -> StorageResult<()> {
    for (index, statement) in SCHEMA_STATEMENTS.iter().enumerate() {
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| StorageError::Schema {
                message: format!("statement {} failed: {}", index, e),
            })?;
    }
    debug!(statements = SCHEMA_STATEMENTS.len(), "Schema applied");
    Ok(())
}
