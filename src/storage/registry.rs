use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use super::SqliteStore;
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Process-wide cache of open stores keyed by logical database name.
///
/// Every caller asking for the same name shares one store, and therefore
/// one connection.
pub struct StoreRegistry {
    config: DatabaseConfig,
    stores: Mutex<HashMap<String, Arc<SqliteStore>>>,
}

impl StoreRegistry {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Store for `name`, opening `<data_dir>/<name>.sqlite` on first use.
    pub async fn get(&self, name: &str) -> StorageResult<Arc<SqliteStore>> {
        if name.trim().is_empty() {
            return Err(StorageError::validation("name", "cannot be empty"));
        }

        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(name) {
            return Ok(Arc::clone(store));
        }

        let path = self.config.path_for(name);
        let store = Arc::new(
            SqliteStore::open(&path, Duration::from_millis(self.config.busy_timeout_ms)).await?,
        );
        stores.insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Store for the configured default name.
    pub async fn get_default(&self) -> StorageResult<Arc<SqliteStore>> {
        let name = self.config.name.clone();
        self.get(&name).await
    }

    /// Number of stores currently open.
    pub async fn open_count(&self) -> usize {
        self.stores.lock().await.len()
    }

    /// Close every cached store and forget it.
    pub async fn close_all(&self) {
        let mut stores = self.stores.lock().await;
        for (name, store) in stores.drain() {
            store.close().await;
            info!(name = %name, "QA store closed");
        }
    }
}
