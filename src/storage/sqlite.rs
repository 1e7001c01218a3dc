use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::schema::execute_schema;
use super::{
    CollectionErrorRepo, CoverageBranchRepo, CoverageIssueRepo, PytestErrorRepo, SourceFileRepo,
    TestFileRepo,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// A unit of work on the store.
///
/// Dropping a scope without calling `commit` rolls back everything done
/// through it, including when the holder returns early with an error.
pub type Scope = Transaction<'static, Sqlite>;

/// SQLite-backed QA result store.
///
/// The pool holds a single connection, so scopes are serialized and a write
/// can never observe another writer's half-finished work.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open the default database described by `config`, creating it if needed.
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        Self::open(
            &config.default_path(),
            Duration::from_millis(config.busy_timeout_ms),
        )
        .await
    }

    /// Open (or create) the database file at `path` and apply the schema.
    pub async fn open(path: &Path, busy_timeout: Duration) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::Unavailable {
                    message: format!("Failed to create database directory: {}", e),
                })?;
            }
        }

        // Passed as a filename, never as a URL, so `?`, `#` and `%` stay literal.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable {
                message: format!("Failed to open {}: {}", path.display(), e),
            })?;

        let store = Self {
            pool,
            path: Some(path.to_path_buf()),
        };
        store.initialize().await?;

        info!(path = %path.display(), "QA store opened");
        Ok(store)
    }

    /// Create a private in-memory database, mostly for tests.
    ///
    /// The single connection is never recycled; an in-memory database
    /// disappears together with its connection.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Unavailable {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let store = Self { pool, path: None };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> StorageResult<()> {
        let mut conn = self.pool.acquire().await?;
        execute_schema(&mut conn).await
    }

    /// Begin a scope. Commit it to keep its writes.
    pub async fn scope(&self) -> StorageResult<Scope> {
        let scope = self.pool.begin().await?;
        debug!("Scope opened");
        Ok(scope)
    }

    /// Location of the database file; `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close the pool, waiting for open scopes to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub fn source_files(&self) -> SourceFileRepo<'_> {
        SourceFileRepo::new(self)
    }

    pub fn test_files(&self) -> TestFileRepo<'_> {
        TestFileRepo::new(self)
    }

    pub fn pytest_errors(&self) -> PytestErrorRepo<'_> {
        PytestErrorRepo::new(self)
    }

    pub fn collection_errors(&self) -> CollectionErrorRepo<'_> {
        CollectionErrorRepo::new(self)
    }

    pub fn coverage_issues(&self) -> CoverageIssueRepo<'_> {
        CoverageIssueRepo::new(self)
    }

    pub fn coverage_branches(&self) -> CoverageBranchRepo<'_> {
        CoverageBranchRepo::new(self)
    }
}
