use std::env;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub listing: ListingConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Directory holding one `<name>.sqlite` file per logical database.
    pub data_dir: PathBuf,
    /// Logical database name used when none is given explicitly.
    pub name: String,
    pub busy_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Listing defaults for paginated queries
#[derive(Debug, Clone)]
pub struct ListingConfig {
    pub page_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let name = env::var("QA_DB_NAME").unwrap_or_else(|_| "mcp_qa".to_string());
        if name.trim().is_empty() {
            return Err(AppError::Config {
                message: "QA_DB_NAME cannot be empty".to_string(),
            });
        }

        let database = DatabaseConfig {
            data_dir: PathBuf::from(
                env::var("QA_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            ),
            name,
            busy_timeout_ms: env::var("QA_DB_BUSY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let listing = ListingConfig {
            page_limit: env::var("QA_PAGE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
        };

        Ok(Config {
            database,
            logging,
            listing,
        })
    }
}

impl DatabaseConfig {
    /// On-disk location of the logical database `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite", name))
    }

    /// On-disk location of the default database.
    pub fn default_path(&self) -> PathBuf {
        self.path_for(&self.name)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            name: "mcp_qa".to_string(),
            busy_timeout_ms: 10_000,
        }
    }
}
