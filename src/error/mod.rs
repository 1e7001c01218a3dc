use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing directory or database file could not be created or opened.
    #[error("Database unavailable: {message}")]
    Unavailable { message: String },

    #[error("Schema initialization failed: {message}")]
    Schema { message: String },

    /// Structurally invalid input, rejected before any statement runs.
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    /// Shorthand for a validation failure on `field`.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller supplied bad input, as opposed to the store failing.
    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation { .. })
    }
}

/// Errors raised while reading tool reports (pytest-json-report, coverage.py JSON)
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Invalid report format: {message}")]
    InvalidFormat { message: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read report: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the pure source/test path helpers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("{kind} path cannot be empty")]
    Empty { kind: &'static str },

    #[error("Path does not contain 'src' directory: {path}")]
    MissingSrc { path: String },

    #[error("Path does not follow expected layout: {path} ({reason})")]
    Layout { path: String, reason: String },

    #[error("File must be a Python file (.py extension), got '{file_name}'")]
    NotPython { file_name: String },
}

impl From<PathError> for AppError {
    fn from(err: PathError) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for report parsing
pub type ReportResult<T> = Result<T, ReportError>;
