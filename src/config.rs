//! Server configuration read from the environment.
//!
//! `.env` files are loaded by `main` through dotenvy before this runs.
//! Unparseable values fall back to their defaults with a warning.

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::storage::StorageConfig;
use crate::sync::SyncConfig;

/// Which persistence backend to run against
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Sled database on disk
    Sled(StorageConfig),
    /// Nothing survives the process
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub storage: StorageBackend,
    pub sync: SyncConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            storage: StorageBackend::Sled(StorageConfig::default()),
            sync: SyncConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = parse_var(&lookup, "PORT") {
            config.port = port;
        }

        config.storage = match lookup("NOTEPAD_STORAGE").as_deref() {
            None | Some("sled") => StorageBackend::Sled(sled_config(&lookup)),
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                warn!("Unknown NOTEPAD_STORAGE '{}', using sled", other);
                StorageBackend::Sled(sled_config(&lookup))
            }
        };

        if let Some(ms) = parse_var::<u64, _>(&lookup, "NOTEPAD_DEBOUNCE_MS") {
            config.sync = config.sync.with_debounce(Duration::from_millis(ms));
        }
        if let Some(flush) = parse_var(&lookup, "NOTEPAD_FLUSH_ON_SHUTDOWN") {
            config.sync = config.sync.with_flush_on_shutdown(flush);
        }

        config
    }
}

fn sled_config<F>(lookup: &F) -> StorageConfig
where
    F: Fn(&str) -> Option<String>,
{
    let path = lookup("STORAGE_PATH").unwrap_or_else(|| StorageConfig::default().path);
    let mut storage = StorageConfig::new(path);
    if let Some(bytes) = parse_var(lookup, "STORAGE_CACHE_BYTES") {
        storage = storage.with_cache_size(bytes);
    }
    if let Some(flush) = parse_var(lookup, "STORAGE_FLUSH_ON_WRITE") {
        storage = storage.with_flush_on_write(flush);
    }
    storage
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}
