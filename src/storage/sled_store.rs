//! Sled-based storage implementation for the note collection.
//!
//! Values live in a single dedicated tree. Every `set` is a single-key
//! insert, so a write is either fully visible or not at all.

use async_trait::async_trait;
use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{PersistenceGateway, StorageConfig, StorageError, StorageResult};

/// Tree holding the notepad keys
const TREE_NOTEPAD: &str = "notepad";

/// Sled-backed persistence gateway
#[derive(Clone)]
pub struct SledGateway {
    db: Arc<Db>,
    values: Tree,
    config: StorageConfig,
}

impl SledGateway {
    /// Open or create a store at the configured path
    pub fn open(config: StorageConfig) -> StorageResult<Self> {
        let path = Path::new(&config.path);

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::InitFailed(format!("Failed to create directory: {}", e))
            })?;
        }

        let db = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_size)
            .flush_every_ms(if config.flush_interval_ms > 0 {
                Some(config.flush_interval_ms)
            } else {
                None
            })
            .open()?;

        let values = db.open_tree(TREE_NOTEPAD)?;

        Ok(Self {
            db: Arc::new(db),
            values,
            config,
        })
    }

    /// Force flush all pending writes to disk
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of keys currently stored
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

#[async_trait]
impl PersistenceGateway for SledGateway {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.values.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let size = value.len();
        self.values.insert(key.as_bytes(), value)?;
        if self.config.flush_on_write {
            self.values.flush_async().await?;
        }
        debug!("Stored {} ({} bytes)", key, size);
        Ok(())
    }
}

impl Drop for SledGateway {
    fn drop(&mut self) {
        // Only the last handle flushes
        if Arc::strong_count(&self.db) == 1 {
            if let Err(e) = self.flush() {
                warn!("Failed to flush storage on drop: {}", e);
            }
        }
    }
}
