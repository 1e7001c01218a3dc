use sqlx::SqliteConnection;
use tracing::debug;

use super::{
    parse_timestamp, require_non_empty, timestamp_now, Page, PytestSummary, SourceFileId,
    SqliteStore, TestFile, TestFileId, TestFileUpdate,
};
use crate::error::{StorageError, StorageResult};

#[derive(Debug, sqlx::FromRow)]
struct TestFileRow {
    id: i64,
    file_path: String,
    source_file_id: Option<i64>,
    pytest_summary: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TestFileRow> for TestFile {
    type Error = StorageError;

    fn try_from(row: TestFileRow) -> StorageResult<Self> {
        Ok(Self {
            id: TestFileId(row.id),
            file_path: row.file_path,
            source_file_id: row.source_file_id.map(SourceFileId),
            pytest_summary: serde_json::from_str(&row.pytest_summary)?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, file_path, source_file_id, pytest_summary, created_at, updated_at FROM pytest_files";

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    file_path: &str,
    source_file_id: Option<SourceFileId>,
    summary: &PytestSummary,
) -> StorageResult<TestFileId> {
    let now = timestamp_now();
    let summary_json = serde_json::to_string(summary)?;
    let result = sqlx::query(
        r#"
        INSERT INTO pytest_files (file_path, source_file_id, pytest_summary, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(file_path)
    .bind(source_file_id.map(|id| id.0))
    .bind(&summary_json)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    let id = TestFileId(result.last_insert_rowid());
    debug!(id = %id, path = %file_path, "Test file created");
    Ok(id)
}

pub(crate) async fn fetch(
    conn: &mut SqliteConnection,
    id: TestFileId,
) -> StorageResult<Option<TestFile>> {
    let row: Option<TestFileRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(TestFile::try_from).transpose()
}

pub(crate) async fn find_by_path(
    conn: &mut SqliteConnection,
    file_path: &str,
) -> StorageResult<Option<TestFile>> {
    let row: Option<TestFileRow> =
        sqlx::query_as(&format!("{} WHERE file_path = ?", SELECT_COLUMNS))
            .bind(file_path)
            .fetch_optional(&mut *conn)
            .await?;
    row.map(TestFile::try_from).transpose()
}

pub(crate) async fn get_or_create(
    conn: &mut SqliteConnection,
    file_path: &str,
) -> StorageResult<TestFileId> {
    match find_by_path(&mut *conn, file_path).await? {
        Some(existing) => Ok(existing.id),
        None => insert(conn, file_path, None, &PytestSummary::default()).await,
    }
}

pub(crate) async fn list_by_source_file(
    conn: &mut SqliteConnection,
    source_file_id: SourceFileId,
) -> StorageResult<Vec<TestFile>> {
    let rows: Vec<TestFileRow> = sqlx::query_as(&format!(
        "{} WHERE source_file_id = ? ORDER BY id",
        SELECT_COLUMNS
    ))
    .bind(source_file_id.0)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(TestFile::try_from).collect()
}

pub(crate) async fn update(
    conn: &mut SqliteConnection,
    id: TestFileId,
    changes: &TestFileUpdate,
) -> StorageResult<bool> {
    if changes.is_empty() {
        return Ok(false);
    }

    let summary_json = changes
        .pytest_summary
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let result = sqlx::query(
        r#"
        UPDATE pytest_files
        SET source_file_id = COALESCE(?, source_file_id),
            pytest_summary = COALESCE(?, pytest_summary),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(changes.source_file_id.map(|id| id.0))
    .bind(summary_json)
    .bind(timestamp_now())
    .bind(id.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete(conn: &mut SqliteConnection, id: TestFileId) -> StorageResult<bool> {
    let result = sqlx::query("DELETE FROM pytest_files WHERE id = ?")
        .bind(id.0)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list(conn: &mut SqliteConnection, page: Page) -> StorageResult<Vec<TestFile>> {
    let rows: Vec<TestFileRow> = sqlx::query_as(&format!(
        "{} ORDER BY updated_at DESC, id DESC LIMIT ? OFFSET ?",
        SELECT_COLUMNS
    ))
    .bind(i64::from(page.limit))
    .bind(i64::from(page.offset))
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(TestFile::try_from).collect()
}

/// Operations on tracked test modules.
pub struct TestFileRepo<'a> {
    store: &'a SqliteStore,
}

impl<'a> TestFileRepo<'a> {
    pub(crate) fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Insert a row without checking for an existing path.
    pub async fn create(
        &self,
        file_path: &str,
        source_file_id: Option<SourceFileId>,
        summary: &PytestSummary,
    ) -> StorageResult<TestFileId> {
        require_non_empty("file_path", file_path)?;
        let mut scope = self.store.scope().await?;
        let id = insert(&mut scope, file_path, source_file_id, summary).await?;
        scope.commit().await?;
        Ok(id)
    }

    pub async fn get_by_id(&self, id: TestFileId) -> StorageResult<Option<TestFile>> {
        let mut scope = self.store.scope().await?;
        let file = fetch(&mut scope, id).await?;
        scope.commit().await?;
        Ok(file)
    }

    pub async fn get_by_path(&self, file_path: &str) -> StorageResult<Option<TestFile>> {
        require_non_empty("file_path", file_path)?;
        let mut scope = self.store.scope().await?;
        let file = find_by_path(&mut scope, file_path).await?;
        scope.commit().await?;
        Ok(file)
    }

    /// Test modules linked to a source file, oldest first.
    pub async fn list_by_source_file(
        &self,
        source_file_id: SourceFileId,
    ) -> StorageResult<Vec<TestFile>> {
        let mut scope = self.store.scope().await?;
        let files = list_by_source_file(&mut scope, source_file_id).await?;
        scope.commit().await?;
        Ok(files)
    }

    pub async fn update(&self, id: TestFileId, changes: &TestFileUpdate) -> StorageResult<bool> {
        if changes.is_empty() {
            return Ok(false);
        }
        let mut scope = self.store.scope().await?;
        let updated = update(&mut scope, id, changes).await?;
        scope.commit().await?;
        Ok(updated)
    }

    /// Delete the row together with its test and collection errors.
    pub async fn delete(&self, id: TestFileId) -> StorageResult<bool> {
        let mut scope = self.store.scope().await?;
        let deleted = delete(&mut scope, id).await?;
        scope.commit().await?;
        Ok(deleted)
    }

    pub async fn list(&self, page: Page) -> StorageResult<Vec<TestFile>> {
        let mut scope = self.store.scope().await?;
        let files = list(&mut scope, page).await?;
        scope.commit().await?;
        Ok(files)
    }
}
