use sqlx::SqliteConnection;

use super::{
    parse_timestamp, timestamp_now, BranchInput, CoverageBranch, CoverageBranchId,
    CoverageIssueId, Page, SqliteStore,
};
use crate::error::{StorageError, StorageResult};

#[derive(Debug, sqlx::FromRow)]
struct CoverageBranchRow {
    id: i64,
    coverage_issue_id: i64,
    source_line: i64,
    end_line: i64,
    condition: String,
    branch_type: String,
    created_at: String,
}

impl TryFrom<CoverageBranchRow> for CoverageBranch {
    type Error = StorageError;

    fn try_from(row: CoverageBranchRow) -> StorageResult<Self> {
        Ok(Self {
            id: CoverageBranchId(row.id),
            coverage_issue_id: CoverageIssueId(row.coverage_issue_id),
            source_line: row.source_line,
            end_line: row.end_line,
            condition: row.condition,
            branch_type: row.branch_type,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, coverage_issue_id, source_line, end_line, condition, branch_type, created_at FROM coverage_branches";

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    coverage_issue_id: CoverageIssueId,
    branch: &BranchInput,
) -> StorageResult<CoverageBranchId> {
    let result = sqlx::query(
        r#"
        INSERT INTO coverage_branches
            (coverage_issue_id, source_line, end_line, condition, branch_type, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(coverage_issue_id.0)
    .bind(branch.source_line)
    .bind(branch.end_line)
    .bind(&branch.condition)
    .bind(&branch.branch_type)
    .bind(timestamp_now())
    .execute(&mut *conn)
    .await?;

    Ok(CoverageBranchId(result.last_insert_rowid()))
}

pub(crate) async fn fetch(
    conn: &mut SqliteConnection,
    id: CoverageBranchId,
) -> StorageResult<Option<CoverageBranch>> {
    let row: Option<CoverageBranchRow> =
        sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await?;
    row.map(CoverageBranch::try_from).transpose()
}

pub(crate) async fn list_by_issue(
    conn: &mut SqliteConnection,
    coverage_issue_id: CoverageIssueId,
) -> StorageResult<Vec<CoverageBranch>> {
    let rows: Vec<CoverageBranchRow> = sqlx::query_as(&format!(
        "{} WHERE coverage_issue_id = ? ORDER BY id",
        SELECT_COLUMNS
    ))
    .bind(coverage_issue_id.0)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(CoverageBranch::try_from).collect()
}

pub(crate) async fn delete(conn: &mut SqliteConnection, id: CoverageBranchId) -> StorageResult<bool> {
    let result = sqlx::query("DELETE FROM coverage_branches WHERE id = ?")
        .bind(id.0)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_by_issue(
    conn: &mut SqliteConnection,
    coverage_issue_id: CoverageIssueId,
) -> StorageResult<u64> {
    let result = sqlx::query("DELETE FROM coverage_branches WHERE coverage_issue_id = ?")
        .bind(coverage_issue_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn list(
    conn: &mut SqliteConnection,
    page: Page,
) -> StorageResult<Vec<CoverageBranch>> {
    let rows: Vec<CoverageBranchRow> = sqlx::query_as(&format!(
        "{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        SELECT_COLUMNS
    ))
    .bind(i64::from(page.limit))
    .bind(i64::from(page.offset))
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(CoverageBranch::try_from).collect()
}

/// Operations on coverage branches. A branch always belongs to an issue.
pub struct CoverageBranchRepo<'a> {
    store: &'a SqliteStore,
}

impl<'a> CoverageBranchRepo<'a> {
    pub(crate) fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        coverage_issue_id: CoverageIssueId,
        branch: &BranchInput,
    ) -> StorageResult<CoverageBranchId> {
        let mut scope = self.store.scope().await?;
        let id = insert(&mut scope, coverage_issue_id, branch).await?;
        scope.commit().await?;
        Ok(id)
    }

    pub async fn get_by_id(&self, id: CoverageBranchId) -> StorageResult<Option<CoverageBranch>> {
        let mut scope = self.store.scope().await?;
        let branch = fetch(&mut scope, id).await?;
        scope.commit().await?;
        Ok(branch)
    }

    pub async fn list_by_issue(
        &self,
        coverage_issue_id: CoverageIssueId,
    ) -> StorageResult<Vec<CoverageBranch>> {
        let mut scope = self.store.scope().await?;
        let branches = list_by_issue(&mut scope, coverage_issue_id).await?;
        scope.commit().await?;
        Ok(branches)
    }

    pub async fn delete(&self, id: CoverageBranchId) -> StorageResult<bool> {
        let mut scope = self.store.scope().await?;
        let deleted = delete(&mut scope, id).await?;
        scope.commit().await?;
        Ok(deleted)
    }

    pub async fn delete_by_issue(&self, coverage_issue_id: CoverageIssueId) -> StorageResult<u64> {
        let mut scope = self.store.scope().await?;
        let count = delete_by_issue(&mut scope, coverage_issue_id).await?;
        scope.commit().await?;
        Ok(count)
    }

    pub async fn list(&self, page: Page) -> StorageResult<Vec<CoverageBranch>> {
        let mut scope = self.store.scope().await?;
        let branches = list(&mut scope, page).await?;
        scope.commit().await?;
        Ok(branches)
    }
}
