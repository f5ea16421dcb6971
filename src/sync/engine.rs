//! Composition root for the note session.
//!
//! `SyncEngine` owns the `NoteStore`, the pending deletion batch and the
//! autosave scheduler, and is the only component that talks to the
//! persistence gateway. An engine only exists after hydration succeeded, so
//! no mutation can run against a store that has not been loaded yet.
//!
//! All mutations are synchronous and take the store lock briefly; the lock is
//! never held across a storage call.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::autosave::{AutosaveScheduler, SaveStatus};
use super::snapshot::{decode_legacy_selection, decode_state, encode_state, StoredState};
use super::{SyncConfig, SyncResult};
use crate::notes::{Note, NoteId, NotePatch, NoteStore, PendingDeletion, SelectionHint, StoreSnapshot};
use crate::storage::PersistenceGateway;

/// Everything the presentation layer needs to render a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub notes: Vec<Note>,
    pub selected_id: Option<NoteId>,
    pub saving: bool,
    /// Note whose title is being edited in place
    pub renaming: Option<NoteId>,
    pub pending_deletion: Vec<NoteId>,
}

pub struct SyncEngine {
    store: Arc<Mutex<NoteStore>>,
    pending: Mutex<PendingDeletion>,
    renaming: Mutex<Option<NoteId>>,
    gateway: Arc<dyn PersistenceGateway>,
    config: SyncConfig,
    autosave: AutosaveScheduler,
}

impl SyncEngine {
    /// Read the stored state and hydrate a new session from it.
    ///
    /// Fails if the backend cannot be read or the stored value is unreadable,
    /// so that an empty session never overwrites data it could not load.
    pub async fn load_on_start(
        gateway: Arc<dyn PersistenceGateway>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        let stored = match gateway.get(&config.state_key).await? {
            Some(bytes) => decode_state(&config.state_key, &bytes)?,
            None => {
                info!("No stored notes under {}, starting empty", config.state_key);
                StoredState {
                    notes: Vec::new(),
                    selection: SelectionHint::Unknown,
                }
            }
        };

        let mut selection = stored.selection;
        if selection == SelectionHint::Unknown {
            if let Some(bytes) = gateway.get(&config.legacy_selection_key).await? {
                match decode_legacy_selection(&config.legacy_selection_key, &bytes) {
                    Ok(id) => selection = SelectionHint::Note(id),
                    Err(e) => warn!("Ignoring legacy selection: {}", e),
                }
            }
        }

        let (store, report) = NoteStore::hydrate(stored.notes, selection);
        if !report.is_clean() {
            for id in &report.duplicate_ids {
                warn!("Duplicate note id {} in stored state, keeping the later entry", id);
            }
            if let Some(id) = report.dangling_selection {
                warn!("Stored selection {} does not match any note, ignoring it", id);
            }
        }
        if store.is_empty() {
            info!("Hydrated an empty note collection");
        } else {
            info!(
                "Hydrated {} notes (selected: {:?})",
                store.len(),
                store.selected_id()
            );
        }

        Ok(Self::with_store(store, gateway, config))
    }

    fn with_store(store: NoteStore, gateway: Arc<dyn PersistenceGateway>, config: SyncConfig) -> Self {
        let store = Arc::new(Mutex::new(store));

        let autosave = {
            let store = store.clone();
            let gateway = gateway.clone();
            let key = config.state_key.clone();
            AutosaveScheduler::start(config.debounce_interval, move || {
                write_state(store.clone(), gateway.clone(), key.clone())
            })
        };

        Self {
            store,
            pending: Mutex::new(PendingDeletion::new()),
            renaming: Mutex::new(None),
            gateway,
            config,
            autosave,
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Append a new default note and select it; `None` once ids are exhausted
    pub fn create(&self) -> Option<Note> {
        let created = self.store.lock().create().cloned();
        let Some(note) = created else {
            warn!("Cannot create a note: no id left above the highest stored id");
            return None;
        };
        debug!("Created note {}", note.id);
        self.autosave.touch();
        Some(note)
    }

    /// Merge `patch` into a note; no-op returning `None` if the id is absent
    pub fn update(&self, id: NoteId, patch: NotePatch) -> Option<Note> {
        let note = self.store.lock().update(id, patch).cloned()?;
        self.autosave.touch();
        Some(note)
    }

    /// Live title edit from the rename-in-place control
    pub fn rename(&self, id: NoteId, title: impl Into<String>) -> Option<Note> {
        let note = self.store.lock().rename(id, title).cloned()?;
        self.autosave.touch();
        Some(note)
    }

    /// Make `id` the note being renamed in place
    pub fn begin_rename(&self, id: NoteId) -> bool {
        if !self.store.lock().contains(id) {
            return false;
        }
        *self.renaming.lock() = Some(id);
        true
    }

    /// Commit the in-place rename (focus lost or confirm key)
    pub fn end_rename(&self) -> Option<NoteId> {
        self.renaming.lock().take()
    }

    /// Remove the given notes immediately
    pub fn remove(&self, ids: &BTreeSet<NoteId>) -> Vec<NoteId> {
        let removed = self.store.lock().remove(ids);
        if removed.is_empty() {
            return removed;
        }

        {
            let mut renaming = self.renaming.lock();
            if renaming.is_some_and(|id| ids.contains(&id)) {
                *renaming = None;
            }
        }
        self.pending.lock().discard(ids);

        info!("Removed notes {:?}", removed);
        self.autosave.touch();
        removed
    }

    /// Point the selection at `id` if it exists
    pub fn select(&self, id: NoteId) -> bool {
        let (found, changed) = {
            let mut store = self.store.lock();
            let before = store.selected_id();
            let found = store.select(id);
            (found, found && before != Some(id))
        };
        if changed {
            self.autosave.touch();
        }
        found
    }

    /// Queue a note for the next reconciliation pass
    pub fn mark_for_deletion(&self, id: NoteId) -> bool {
        if !self.store.lock().contains(id) {
            return false;
        }
        self.pending.lock().mark(id);
        true
    }

    /// Apply the pending deletion batch in one pass and clear it
    pub fn reconcile_deletions(&self) -> Vec<NoteId> {
        let batch = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return Vec::new();
            }
            pending.take()
        };
        debug!("Reconciling {} pending deletions", batch.len());
        self.remove(&batch)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.lock().snapshot()
    }

    pub fn note(&self, id: NoteId) -> Option<Note> {
        self.store.lock().get(id).cloned()
    }

    pub fn note_count(&self) -> usize {
        self.store.lock().len()
    }

    pub fn pending_deletion(&self) -> Vec<NoteId> {
        self.pending.lock().ids().collect()
    }

    pub fn view(&self) -> SessionView {
        let StoreSnapshot { notes, selected_id } = self.snapshot();
        SessionView {
            notes,
            selected_id,
            saving: self.autosave.is_saving(),
            renaming: *self.renaming.lock(),
            pending_deletion: self.pending_deletion(),
        }
    }

    pub fn save_status(&self) -> SaveStatus {
        self.autosave.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SaveStatus> {
        self.autosave.subscribe()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the current notes and selection as one value
    pub async fn persist(&self) -> SyncResult<()> {
        write_state(
            self.store.clone(),
            self.gateway.clone(),
            self.config.state_key.clone(),
        )
        .await
    }

    /// Stop autosaving. Unsaved changes are dropped unless `flush_on_shutdown`
    /// is configured.
    pub async fn shutdown(&self) {
        let unsaved = self.autosave.is_saving();
        self.autosave.shutdown().await;

        if unsaved && self.config.flush_on_shutdown {
            match self.autosave.flush(self.persist()).await {
                Ok(()) => info!("Flushed unsaved notes on shutdown"),
                Err(e) => error!("Failed to flush notes on shutdown: {}", e),
            }
        } else if unsaved {
            warn!("Shutting down with unsaved changes");
        }
    }
}

async fn write_state(
    store: Arc<Mutex<NoteStore>>,
    gateway: Arc<dyn PersistenceGateway>,
    key: String,
) -> SyncResult<()> {
    let snapshot = store.lock().snapshot();
    let bytes = encode_state(&snapshot)?;
    gateway.set(&key, bytes).await?;
    debug!(
        "Persisted {} notes (selected: {:?})",
        snapshot.notes.len(),
        snapshot.selected_id
    );
    Ok(())
}
