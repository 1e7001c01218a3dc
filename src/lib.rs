//! # MCP QA
//!
//! Result tracking and "fix one issue at a time" workflow state for Python
//! code-quality tools.
//!
//! Test runs and coverage runs are recorded into a local SQLite database with
//! latest-run-only semantics: re-recording a file replaces what an earlier run
//! left behind. Workflow tools then hand out the next failing test or the next
//! uncovered line, wrapped in a [`workflow::ToolResult`] that tells a driving
//! agent what to call next.
//!
//! ## Architecture
//!
//! ```text
//! pytest / coverage JSON → reports → workflow::QaTools → storage (QaStore)
//!                                          ↓                    ↓
//!                                     ToolResult           SQLite file
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mcp_qa::storage::SqliteStore;
//! use mcp_qa::workflow::QaTools;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::in_memory().await?);
//!     let tools = QaTools::new(store);
//!     let next = tools.next_pytest_error("src/tests/unit/test_models.py").await;
//!     println!("{}", next.to_value());
//!     Ok(())
//! }
//! ```

/// Command-line surface.
pub mod cli;
/// Configuration loaded from environment variables.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Source, test and module path translation.
pub mod paths;
/// pytest and coverage report readers.
pub mod reports;
/// SQLite storage layer for QA results.
pub mod storage;
/// Tool result protocol and workflow tools.
pub mod workflow;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use storage::{QaStore, SqliteStore};
pub use workflow::{NextAction, QaTools, ToolResult, ToolStatus};
