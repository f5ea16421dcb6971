//! Debounced autosave.
//!
//! Every observed mutation (re)starts a single countdown. A save fires only
//! when the countdown elapses without another mutation, so a burst of edits
//! collapses into one write. The save callback reads the state at the moment
//! it runs, never the state from when the countdown started.
//!
//! Writes are not retried: the next mutation's countdown writes the full
//! latest state again, which supersedes any failed attempt.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use super::SyncResult;

/// Saving/saved indicator published to the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveStatus {
    /// True from the moment a countdown (re)starts until the write covering
    /// the latest mutation has been attempted
    pub saving: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub failed_writes: u64,
}

/// Background debounce timer driving a save callback
pub struct AutosaveScheduler {
    trigger: Arc<Notify>,
    /// Bumped on every mutation
    generation: Arc<AtomicU64>,
    status: Arc<watch::Sender<SaveStatus>>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutosaveScheduler {
    /// Spawn the countdown task. Must be called from within a tokio runtime.
    pub fn start<F, Fut>(interval: Duration, save: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SyncResult<()>> + Send + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let generation = Arc::new(AtomicU64::new(0));
        let (status_tx, _) = watch::channel(SaveStatus::default());
        let status = Arc::new(status_tx);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(run_countdown(
            interval,
            trigger.clone(),
            generation.clone(),
            status.clone(),
            shutdown_rx,
            save,
        ));

        Self {
            trigger,
            generation,
            status,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Record a mutation and restart the countdown
    pub fn touch(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.status
            .send_if_modified(|status| !std::mem::replace(&mut status.saving, true));
        self.trigger.notify_one();
    }

    /// Whether a mutation is waiting to be written
    pub fn is_saving(&self) -> bool {
        self.status.borrow().saving
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    /// Receive every change of the saving indicator
    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.subscribe()
    }

    /// Run `save` outside the countdown and publish its outcome like an
    /// autosave. The indicator only clears if no mutation arrived meanwhile.
    pub async fn flush<Fut>(&self, save: Fut) -> SyncResult<()>
    where
        Fut: Future<Output = SyncResult<()>>,
    {
        let covered = self.generation.load(Ordering::SeqCst);
        let outcome = save.await;
        publish_outcome(&self.status, &self.generation, covered, &outcome);
        outcome
    }

    /// Stop the countdown task. A pending countdown is abandoned; a write that
    /// is already in flight completes first.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Autosave task ended abnormally: {}", e);
            }
        }
    }
}

async fn run_countdown<F, Fut>(
    interval: Duration,
    trigger: Arc<Notify>,
    generation: Arc<AtomicU64>,
    status: Arc<watch::Sender<SaveStatus>>,
    mut shutdown: broadcast::Receiver<()>,
    save: F,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SyncResult<()>> + Send + 'static,
{
    loop {
        // Idle until the first mutation of a burst
        tokio::select! {
            _ = trigger.notified() => {}
            _ = shutdown.recv() => {
                info!("Autosave task shutting down");
                return;
            }
        }

        // Quiet period; any further mutation restarts it
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => break,
                _ = trigger.notified() => {
                    trace!("Autosave countdown restarted");
                }
                _ = shutdown.recv() => {
                    if status.borrow().saving {
                        info!("Autosave task shutting down, abandoning pending save");
                    }
                    return;
                }
            }
        }

        let covered = generation.load(Ordering::SeqCst);
        let outcome = save().await;
        publish_outcome(&status, &generation, covered, &outcome);
    }
}

/// Record a finished write. `covered` is the generation the write read.
fn publish_outcome(
    status: &watch::Sender<SaveStatus>,
    generation: &AtomicU64,
    covered: u64,
    outcome: &SyncResult<()>,
) {
    status.send_modify(|status| {
        match outcome {
            Ok(()) => {
                debug!("Saved state (generation {})", covered);
                status.last_saved_at = Some(Utc::now());
            }
            Err(e) => {
                error!(
                    "Save failed, not retrying; the next change writes the latest state: {}",
                    e
                );
                status.failed_writes += 1;
            }
        }
        if generation.load(Ordering::SeqCst) == covered {
            status.saving = false;
        }
    });
}
