use sqlx::SqliteConnection;
use tracing::debug;

use super::{
    parse_timestamp, require_non_empty, timestamp_now, CoverageIssue, CoverageIssueId,
    CoverageIssueUpdate, Page, SourceFileId, SqliteStore,
};
use crate::error::{StorageError, StorageResult};

#[derive(Debug, sqlx::FromRow)]
struct CoverageIssueRow {
    id: i64,
    file_path: String,
    source_file_id: Option<i64>,
    line_number: i64,
    is_excluded: bool,
    created_at: String,
}

impl TryFrom<CoverageIssueRow> for CoverageIssue {
    type Error = StorageError;

    fn try_from(row: CoverageIssueRow) -> StorageResult<Self> {
        Ok(Self {
            id: CoverageIssueId(row.id),
            file_path: row.file_path,
            source_file_id: row.source_file_id.map(SourceFileId),
            line_number: row.line_number,
            is_excluded: row.is_excluded,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, file_path, source_file_id, line_number, is_excluded, created_at FROM coverage_issues";

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    file_path: &str,
    source_file_id: Option<SourceFileId>,
    line_number: i64,
    is_excluded: bool,
) -> StorageResult<CoverageIssueId> {
    let result = sqlx::query(
        r#"
        INSERT INTO coverage_issues (file_path, source_file_id, line_number, is_excluded, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(file_path)
    .bind(source_file_id.map(|id| id.0))
    .bind(line_number)
    .bind(is_excluded)
    .bind(timestamp_now())
    .execute(&mut *conn)
    .await?;

    Ok(CoverageIssueId(result.last_insert_rowid()))
}

pub(crate) async fn fetch(
    conn: &mut SqliteConnection,
    id: CoverageIssueId,
) -> StorageResult<Option<CoverageIssue>> {
    let row: Option<CoverageIssueRow> =
        sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await?;
    row.map(CoverageIssue::try_from).transpose()
}

/// Lowest-id issue that is not excluded, optionally restricted to one file path.
pub(crate) async fn first(
    conn: &mut SqliteConnection,
    file_path: Option<&str>,
) -> StorageResult<Option<CoverageIssue>> {
    let row: Option<CoverageIssueRow> = match file_path {
        Some(path) => {
            sqlx::query_as(&format!(
                "{} WHERE file_path = ? AND is_excluded = 0 ORDER BY id LIMIT 1",
                SELECT_COLUMNS
            ))
            .bind(path)
            .fetch_optional(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as(&format!(
                "{} WHERE is_excluded = 0 ORDER BY id LIMIT 1",
                SELECT_COLUMNS
            ))
                .fetch_optional(&mut *conn)
                .await?
        }
    };
    row.map(CoverageIssue::try_from).transpose()
}

pub(crate) async fn list_by_file_path(
    conn: &mut SqliteConnection,
    file_path: &str,
) -> StorageResult<Vec<CoverageIssue>> {
    let rows: Vec<CoverageIssueRow> =
        sqlx::query_as(&format!("{} WHERE file_path = ? ORDER BY id", SELECT_COLUMNS))
            .bind(file_path)
            .fetch_all(&mut *conn)
            .await?;
    rows.into_iter().map(CoverageIssue::try_from).collect()
}

pub(crate) async fn list_by_source_file(
    conn: &mut SqliteConnection,
    source_file_id: SourceFileId,
) -> StorageResult<Vec<CoverageIssue>> {
    let rows: Vec<CoverageIssueRow> = sqlx::query_as(&format!(
        "{} WHERE source_file_id = ? ORDER BY id",
        SELECT_COLUMNS
    ))
    .bind(source_file_id.0)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(CoverageIssue::try_from).collect()
}

pub(crate) async fn update(
    conn: &mut SqliteConnection,
    id: CoverageIssueId,
    changes: &CoverageIssueUpdate,
) -> StorageResult<bool> {
    if changes.is_empty() {
        return Ok(false);
    }

    let result = sqlx::query(
        r#"
        UPDATE coverage_issues
        SET is_excluded = COALESCE(?, is_excluded),
            source_file_id = COALESCE(?, source_file_id)
        WHERE id = ?
        "#,
    )
    .bind(changes.is_excluded)
    .bind(changes.source_file_id.map(|id| id.0))
    .bind(id.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete(conn: &mut SqliteConnection, id: CoverageIssueId) -> StorageResult<bool> {
    let result = sqlx::query("DELETE FROM coverage_issues WHERE id = ?")
        .bind(id.0)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_by_file_path(
    conn: &mut SqliteConnection,
    file_path: &str,
) -> StorageResult<u64> {
    let result = sqlx::query("DELETE FROM coverage_issues WHERE file_path = ?")
        .bind(file_path)
        .execute(&mut *conn)
        .await?;
    debug!(path = %file_path, removed = result.rows_affected(), "Coverage issues cleared");
    Ok(result.rows_affected())
}

pub(crate) async fn delete_by_source_file(
    conn: &mut SqliteConnection,
    source_file_id: SourceFileId,
) -> StorageResult<u64> {
    let result = sqlx::query("DELETE FROM coverage_issues WHERE source_file_id = ?")
        .bind(source_file_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn list(
    conn: &mut SqliteConnection,
    page: Page,
) -> StorageResult<Vec<CoverageIssue>> {
    let rows: Vec<CoverageIssueRow> = sqlx::query_as(&format!(
        "{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        SELECT_COLUMNS
    ))
    .bind(i64::from(page.limit))
    .bind(i64::from(page.offset))
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(CoverageIssue::try_from).collect()
}

/// Operations on coverage issues.
///
/// Deleting an issue removes its branches with it.
pub struct CoverageIssueRepo<'a> {
    store: &'a SqliteStore,
}

impl<'a> CoverageIssueRepo<'a> {
    pub(crate) fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        file_path: &str,
        source_file_id: Option<SourceFileId>,
        line_number: i64,
        is_excluded: bool,
    ) -> StorageResult<CoverageIssueId> {
        require_non_empty("file_path", file_path)?;
        let mut scope = self.store.scope().await?;
        let id = insert(&mut scope, file_path, source_file_id, line_number, is_excluded).await?;
        scope.commit().await?;
        Ok(id)
    }

    pub async fn get_by_id(&self, id: CoverageIssueId) -> StorageResult<Option<CoverageIssue>> {
        let mut scope = self.store.scope().await?;
        let issue = fetch(&mut scope, id).await?;
        scope.commit().await?;
        Ok(issue)
    }

    pub async fn list_by_file_path(&self, file_path: &str) -> StorageResult<Vec<CoverageIssue>> {
        require_non_empty("file_path", file_path)?;
        let mut scope = self.store.scope().await?;
        let issues = list_by_file_path(&mut scope, file_path).await?;
        scope.commit().await?;
        Ok(issues)
    }

    pub async fn list_by_source_file(
        &self,
        source_file_id: SourceFileId,
    ) -> StorageResult<Vec<CoverageIssue>> {
        let mut scope = self.store.scope().await?;
        let issues = list_by_source_file(&mut scope, source_file_id).await?;
        scope.commit().await?;
        Ok(issues)
    }

    /// Apply the supplied fields. Issues carry no `updated_at`, so only the
    /// fields themselves change.
    pub async fn update(
        &self,
        id: CoverageIssueId,
        changes: &CoverageIssueUpdate,
    ) -> StorageResult<bool> {
        if changes.is_empty() {
            return Ok(false);
        }
        let mut scope = self.store.scope().await?;
        let updated = update(&mut scope, id, changes).await?;
        scope.commit().await?;
        Ok(updated)
    }

    pub async fn delete(&self, id: CoverageIssueId) -> StorageResult<bool> {
        let mut scope = self.store.scope().await?;
        let deleted = delete(&mut scope, id).await?;
        scope.commit().await?;
        Ok(deleted)
    }

    pub async fn delete_by_file_path(&self, file_path: &str) -> StorageResult<u64> {
        require_non_empty("file_path", file_path)?;
        let mut scope = self.store.scope().await?;
        let count = delete_by_file_path(&mut scope, file_path).await?;
        scope.commit().await?;
        Ok(count)
    }

    pub async fn delete_by_source_file(&self, source_file_id: SourceFileId) -> StorageResult<u64> {
        let mut scope = self.store.scope().await?;
        let count = delete_by_source_file(&mut scope, source_file_id).await?;
        scope.commit().await?;
        Ok(count)
    }

    pub async fn list(&self, page: Page) -> StorageResult<Vec<CoverageIssue>> {
        let mut scope = self.store.scope().await?;
        let issues = list(&mut scope, page).await?;
        scope.commit().await?;
        Ok(issues)
    }
}
