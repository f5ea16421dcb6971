//! Synchronization between the in-memory note store and persistent storage.
//!
//! This module implements:
//! - Startup hydration from a single persisted value
//! - Debounced autosave of the full store state
//! - Batched deletion reconciliation
//! - The saving/saved status exposed to the presentation layer

pub mod autosave;
pub mod engine;
pub mod snapshot;

pub use autosave::SaveStatus;
pub use engine::{SessionView, SyncEngine};

use std::time::Duration;
use thiserror::Error;

use crate::storage::StorageError;

/// Storage key holding the notes and the selection
pub const STATE_KEY: &str = "notepad-data";

/// Key used by older builds to store the last opened note separately
pub const LEGACY_SELECTION_KEY: &str = "notepad-last-opened";

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during synchronization
#[derive(Error, Debug)]
pub enum SyncError {
    /// Reading or writing the backend failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The stored value could not be decoded
    #[error("Stored state under {key} is unreadable: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory state could not be encoded
    #[error("Failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Configuration for sync behavior
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last mutation before a save fires
    pub debounce_interval: Duration,
    /// Key the full state is written under
    pub state_key: String,
    /// Separate selection key consulted on load only
    pub legacy_selection_key: String,
    /// Write the latest state once when the engine shuts down
    pub flush_on_shutdown: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_interval: Duration::from_millis(300),
            state_key: STATE_KEY.to_string(),
            legacy_selection_key: LEGACY_SELECTION_KEY.to_string(),
            flush_on_shutdown: false,
        }
    }
}

impl SyncConfig {
    pub fn with_debounce(mut self, interval: Duration) -> Self {
        self.debounce_interval = interval;
        self
    }

    pub fn with_flush_on_shutdown(mut self, enabled: bool) -> Self {
        self.flush_on_shutdown = enabled;
        self
    }
}
