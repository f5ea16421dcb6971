//! In-process storage backend.
//!
//! Used for ephemeral sessions (`NOTEPAD_STORAGE=memory`) and as the test
//! double for the sync engine. Writes can be made to fail on demand to
//! exercise transient storage errors.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{PersistenceGateway, StorageError, StorageResult};

#[derive(Default)]
pub struct MemoryGateway {
    values: Mutex<HashMap<String, Vec<u8>>>,
    writes: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without counting it as a write
    #[cfg(test)]
    pub fn with_value(self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.values.lock().insert(key.into(), value.into());
        self
    }

    /// Number of successful `set` calls so far
    #[cfg(test)]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current raw value for a key
    #[cfg(test)]
    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.values.lock().get(key).cloned()
    }

    #[cfg(test)]
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("read of {} rejected", key)));
        }
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("write of {} rejected", key)));
        }
        self.values.lock().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
