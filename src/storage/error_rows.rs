//! Statements shared by the two error tables, which have the same shape.

use sqlx::SqliteConnection;
use tracing::debug;

use super::{timestamp_now, Page, TestErrorInput, TestFileId, ERROR_TYPE_COLLECTION, ERROR_TYPE_TEST};
use crate::error::StorageResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorTable {
    Test,
    Collection,
}

impl ErrorTable {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ErrorTable::Test => "pytest_errors",
            ErrorTable::Collection => "pytest_collection_errors",
        }
    }

    pub(crate) fn default_error_type(self) -> &'static str {
        match self {
            ErrorTable::Test => ERROR_TYPE_TEST,
            ErrorTable::Collection => ERROR_TYPE_COLLECTION,
        }
    }

    fn select(self) -> String {
        format!(
            "SELECT id, node_id, test_file_id, outcome, error_type, result, longrepr, created_at FROM {}",
            self.name()
        )
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ErrorRow {
    pub id: i64,
    pub node_id: String,
    pub test_file_id: i64,
    pub outcome: String,
    pub error_type: String,
    pub result: String,
    pub longrepr: String,
    pub created_at: String,
}

impl ErrorRow {
    pub(crate) fn result_value(&self) -> StorageResult<serde_json::Value> {
        Ok(serde_json::from_str(&self.result)?)
    }
}

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    table: ErrorTable,
    test_file_id: TestFileId,
    input: &TestErrorInput,
    error_type: &str,
) -> StorageResult<i64> {
    let result_json = serde_json::to_string(&input.result)?;
    let result = sqlx::query(&format!(
        "INSERT INTO {} (node_id, test_file_id, outcome, error_type, result, longrepr, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        table.name()
    ))
    .bind(&input.node_id)
    .bind(test_file_id.0)
    .bind(&input.outcome)
    .bind(error_type)
    .bind(&result_json)
    .bind(&input.longrepr)
    .bind(timestamp_now())
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();
    debug!(table = table.name(), id, node_id = %input.node_id, "Error row created");
    Ok(id)
}

pub(crate) async fn fetch(
    conn: &mut SqliteConnection,
    table: ErrorTable,
    id: i64,
) -> StorageResult<Option<ErrorRow>> {
    let row: Option<ErrorRow> = sqlx::query_as(&format!("{} WHERE id = ?", table.select()))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Lowest-id row with `node_id`; node ids may repeat across test files.
pub(crate) async fn find_by_node_id(
    conn: &mut SqliteConnection,
    table: ErrorTable,
    node_id: &str,
) -> StorageResult<Option<ErrorRow>> {
    let row: Option<ErrorRow> = sqlx::query_as(&format!(
        "{} WHERE node_id = ? ORDER BY id LIMIT 1",
        table.select()
    ))
    .bind(node_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub(crate) async fn first_for_test_file(
    conn: &mut SqliteConnection,
    table: ErrorTable,
    test_file_id: TestFileId,
) -> StorageResult<Option<ErrorRow>> {
    let row: Option<ErrorRow> = sqlx::query_as(&format!(
        "{} WHERE test_file_id = ? ORDER BY id LIMIT 1",
        table.select()
    ))
    .bind(test_file_id.0)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub(crate) async fn list_by_test_file(
    conn: &mut SqliteConnection,
    table: ErrorTable,
    test_file_id: TestFileId,
) -> StorageResult<Vec<ErrorRow>> {
    let rows: Vec<ErrorRow> = sqlx::query_as(&format!(
        "{} WHERE test_file_id = ? ORDER BY id",
        table.select()
    ))
    .bind(test_file_id.0)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub(crate) async fn delete(
    conn: &mut SqliteConnection,
    table: ErrorTable,
    id: i64,
) -> StorageResult<bool> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table.name()))
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_by_test_file(
    conn: &mut SqliteConnection,
    table: ErrorTable,
    test_file_id: TestFileId,
) -> StorageResult<u64> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE test_file_id = ?", table.name()))
        .bind(test_file_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_by_node_id(
    conn: &mut SqliteConnection,
    table: ErrorTable,
    node_id: &str,
) -> StorageResult<u64> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE node_id = ?", table.name()))
        .bind(node_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn list(
    conn: &mut SqliteConnection,
    table: ErrorTable,
    page: Page,
) -> StorageResult<Vec<ErrorRow>> {
    let rows: Vec<ErrorRow> = sqlx::query_as(&format!(
        "{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        table.select()
    ))
    .bind(i64::from(page.limit))
    .bind(i64::from(page.offset))
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}
