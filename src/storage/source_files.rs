use sqlx::SqliteConnection;
use tracing::debug;

use super::{
    parse_timestamp, require_non_empty, timestamp_now, Page, SourceFile, SourceFileId,
    SourceFileUpdate, SqliteStore,
};
use crate::error::{StorageError, StorageResult};

#[derive(Debug, sqlx::FromRow)]
struct SourceFileRow {
    id: i64,
    file_path: String,
    file_hash: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SourceFileRow> for SourceFile {
    type Error = StorageError;

    fn try_from(row: SourceFileRow) -> StorageResult<Self> {
        Ok(Self {
            id: SourceFileId(row.id),
            file_path: row.file_path,
            file_hash: row.file_hash,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, file_path, file_hash, created_at, updated_at FROM source_files";

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    file_path: &str,
    file_hash: &str,
) -> StorageResult<SourceFileId> {
    let now = timestamp_now();
    let result = sqlx::query(
        r#"
        INSERT INTO source_files (file_path, file_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(file_path)
    .bind(file_hash)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    let id = SourceFileId(result.last_insert_rowid());
    debug!(id = %id, path = %file_path, "Source file created");
    Ok(id)
}

pub(crate) async fn fetch(
    conn: &mut SqliteConnection,
    id: SourceFileId,
) -> StorageResult<Option<SourceFile>> {
    let row: Option<SourceFileRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(SourceFile::try_from).transpose()
}

pub(crate) async fn find_by_path(
    conn: &mut SqliteConnection,
    file_path: &str,
) -> StorageResult<Option<SourceFile>> {
    let row: Option<SourceFileRow> =
        sqlx::query_as(&format!("{} WHERE file_path = ?", SELECT_COLUMNS))
            .bind(file_path)
            .fetch_optional(&mut *conn)
            .await?;
    row.map(SourceFile::try_from).transpose()
}

pub(crate) async fn get_or_create(
    conn: &mut SqliteConnection,
    file_path: &str,
) -> StorageResult<SourceFileId> {
    match find_by_path(&mut *conn, file_path).await? {
        Some(existing) => Ok(existing.id),
        None => insert(conn, file_path, "").await,
    }
}

pub(crate) async fn update(
    conn: &mut SqliteConnection,
    id: SourceFileId,
    changes: &SourceFileUpdate,
) -> StorageResult<bool> {
    if changes.is_empty() {
        return Ok(false);
    }

    let result = sqlx::query(
        r#"
        UPDATE source_files
        SET file_hash = COALESCE(?, file_hash),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(changes.file_hash.as_deref())
    .bind(timestamp_now())
    .bind(id.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete(conn: &mut SqliteConnection, id: SourceFileId) -> StorageResult<bool> {
    let result = sqlx::query("DELETE FROM source_files WHERE id = ?")
        .bind(id.0)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list(conn: &mut SqliteConnection, page: Page) -> StorageResult<Vec<SourceFile>> {
    let rows: Vec<SourceFileRow> = sqlx::query_as(&format!(
        "{} ORDER BY updated_at DESC, id DESC LIMIT ? OFFSET ?",
        SELECT_COLUMNS
    ))
    .bind(i64::from(page.limit))
    .bind(i64::from(page.offset))
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(SourceFile::try_from).collect()
}

/// Operations on tracked source files.
pub struct SourceFileRepo<'a> {
    store: &'a SqliteStore,
}

impl<'a> SourceFileRepo<'a> {
    pub(crate) fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Insert a row without checking for an existing path.
    pub async fn create(&self, file_path: &str, file_hash: &str) -> StorageResult<SourceFileId> {
        require_non_empty("file_path", file_path)?;
        let mut scope = self.store.scope().await?;
        let id = insert(&mut scope, file_path, file_hash).await?;
        scope.commit().await?;
        Ok(id)
    }

    pub async fn get_by_id(&self, id: SourceFileId) -> StorageResult<Option<SourceFile>> {
        let mut scope = self.store.scope().await?;
        let file = fetch(&mut scope, id).await?;
        scope.commit().await?;
        Ok(file)
    }

    pub async fn get_by_path(&self, file_path: &str) -> StorageResult<Option<SourceFile>> {
        require_non_empty("file_path", file_path)?;
        let mut scope = self.store.scope().await?;
        let file = find_by_path(&mut scope, file_path).await?;
        scope.commit().await?;
        Ok(file)
    }

    /// Apply the supplied fields. `false` when nothing was supplied or the row is gone.
    pub async fn update(&self, id: SourceFileId, changes: &SourceFileUpdate) -> StorageResult<bool> {
        if changes.is_empty() {
            return Ok(false);
        }
        let mut scope = self.store.scope().await?;
        let updated = update(&mut scope, id, changes).await?;
        scope.commit().await?;
        Ok(updated)
    }

    /// Delete the row. Test files and coverage issues pointing at it are detached.
    pub async fn delete(&self, id: SourceFileId) -> StorageResult<bool> {
        let mut scope = self.store.scope().await?;
        let deleted = delete(&mut scope, id).await?;
        scope.commit().await?;
        Ok(deleted)
    }

    pub async fn list(&self, page: Page) -> StorageResult<Vec<SourceFile>> {
        let mut scope = self.store.scope().await?;
        let files = list(&mut scope, page).await?;
        scope.commit().await?;
        Ok(files)
    }
}
