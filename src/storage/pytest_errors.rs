use super::error_rows::{self, ErrorRow, ErrorTable};
use super::{
    parse_timestamp, Page, PytestError, PytestErrorId, SqliteStore, TestErrorInput, TestFileId,
};
use crate::error::{StorageError, StorageResult};

const TABLE: ErrorTable = ErrorTable::Test;

impl TryFrom<ErrorRow> for PytestError {
    type Error = StorageError;

    fn try_from(row: ErrorRow) -> StorageResult<Self> {
        let result = row.result_value()?;
        Ok(Self {
            id: PytestErrorId(row.id),
            node_id: row.node_id,
            test_file_id: TestFileId(row.test_file_id),
            outcome: row.outcome,
            error_type: row.error_type,
            result,
            longrepr: row.longrepr,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

/// Operations on failing test cases. Rows are observations and are never edited.
pub struct PytestErrorRepo<'a> {
    store: &'a SqliteStore,
}

impl<'a> PytestErrorRepo<'a> {
    pub(crate) fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Store one failure. The error type defaults to [`ERROR_TYPE_TEST`](super::ERROR_TYPE_TEST).
    pub async fn create(
        &self,
        test_file_id: TestFileId,
        input: &TestErrorInput,
    ) -> StorageResult<PytestErrorId> {
        let error_type = input
            .error_type
            .as_deref()
            .unwrap_or(TABLE.default_error_type());
        let mut scope = self.store.scope().await?;
        let id = error_rows::insert(&mut scope, TABLE, test_file_id, input, error_type).await?;
        scope.commit().await?;
        Ok(PytestErrorId(id))
    }

    pub async fn get_by_id(&self, id: PytestErrorId) -> StorageResult<Option<PytestError>> {
        let mut scope = self.store.scope().await?;
        let row = error_rows::fetch(&mut scope, TABLE, id.0).await?;
        scope.commit().await?;
        row.map(PytestError::try_from).transpose()
    }

    pub async fn get_by_node_id(&self, node_id: &str) -> StorageResult<Option<PytestError>> {
        let mut scope = self.store.scope().await?;
        let row = error_rows::find_by_node_id(&mut scope, TABLE, node_id).await?;
        scope.commit().await?;
        row.map(PytestError::try_from).transpose()
    }

    /// Failures of one test file in insertion order.
    pub async fn list_by_test_file(
        &self,
        test_file_id: TestFileId,
    ) -> StorageResult<Vec<PytestError>> {
        let mut scope = self.store.scope().await?;
        let rows = error_rows::list_by_test_file(&mut scope, TABLE, test_file_id).await?;
        scope.commit().await?;
        rows.into_iter().map(PytestError::try_from).collect()
    }

    pub async fn delete(&self, id: PytestErrorId) -> StorageResult<bool> {
        let mut scope = self.store.scope().await?;
        let deleted = error_rows::delete(&mut scope, TABLE, id.0).await?;
        scope.commit().await?;
        Ok(deleted)
    }

    pub async fn delete_by_test_file(&self, test_file_id: TestFileId) -> StorageResult<u64> {
        let mut scope = self.store.scope().await?;
        let count = error_rows::delete_by_test_file(&mut scope, TABLE, test_file_id).await?;
        scope.commit().await?;
        Ok(count)
    }

    pub async fn list(&self, page: Page) -> StorageResult<Vec<PytestError>> {
        let mut scope = self.store.scope().await?;
        let rows = error_rows::list(&mut scope, TABLE, page).await?;
        scope.commit().await?;
        rows.into_iter().map(PytestError::try_from).collect()
    }
}
