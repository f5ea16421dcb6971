//! Storage module for persisting the note collection.
//!
//! The sync engine only ever talks to storage through `PersistenceGateway`, an
//! opaque asynchronous key-value store. Each write fully replaces the stored
//! value for a key; there is no partial merge. Two backends are provided:
//! - `SledGateway`: Sled embedded database on disk
//! - `MemoryGateway`: process-local map for ephemeral sessions and tests

mod memory;
mod sled_store;

pub use memory::MemoryGateway;
pub use sled_store::SledGateway;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Sled database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Storage initialization failed: {0}")]
    InitFailed(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Asynchronous key-value store holding serialized values.
///
/// Latency and failure are outside the engine's control; callers must
/// tolerate both.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Read the value stored under `key`, if any
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Overwrite the value stored under `key`
    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;
}

/// Configuration for the on-disk storage layer
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the Sled database directory
    pub path: String,
    /// Cache size in bytes (default: 64MB)
    pub cache_size: u64,
    /// Background flush interval in milliseconds (0 = only explicit flushes)
    pub flush_interval_ms: u64,
    /// Flush to disk after every write before reporting success
    pub flush_on_write: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./data/notepad.sled".to_string(),
            cache_size: 64 * 1024 * 1024, // 64MB
            flush_interval_ms: 500,
            flush_on_write: true,
        }
    }
}

impl StorageConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_cache_size(mut self, size: u64) -> Self {
        self.cache_size = size;
        self
    }

    pub fn with_flush_on_write(mut self, enabled: bool) -> Self {
        self.flush_on_write = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert!(config.flush_on_write);
        assert_eq!(config.cache_size, 64 * 1024 * 1024);
        assert_eq!(config.path, "./data/notepad.sled");
    }

    #[test]
    fn test_storage_config_builder() {
        let config = StorageConfig::new("/tmp/notes.sled")
            .with_cache_size(1024)
            .with_flush_on_write(false);

        assert_eq!(config.path, "/tmp/notes.sled");
        assert_eq!(config.cache_size, 1024);
        assert!(!config.flush_on_write);
        assert_eq!(config.flush_interval_ms, 500);
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Unavailable("quota exceeded".into());
        assert_eq!(err.to_string(), "Storage backend unavailable: quota exceeded");
    }
}
