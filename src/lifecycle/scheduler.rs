use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use super::{remove_object, LifecycleError};
use crate::blob_store::BlobStore;
use crate::storage::Database;

/// Arms and fires the one-shot deletion of committed objects.
///
/// The in-process [`TimerScheduler`] loses its timers on exit, which is fine
/// because [`recover`] re-arms everything from the store. A durable timer
/// wheel can stand in for it behind this trait.
#[async_trait]
pub trait ExpiryScheduler: Send + Sync {
    /// Schedule deletion at `expiry`. An expiry at or before now deletes
    /// immediately, before returning. Re-arming an id replaces its timer.
    async fn arm(&self, id: &str, expiry: DateTime<Utc>);

    /// Stop a timer that has not fired yet. Returns whether one was stopped.
    fn cancel(&self, id: &str) -> bool;

    /// Delete the object's blob and row. Failures are logged, never returned.
    async fn on_fire(&self, id: &str);

    /// Number of timers currently armed
    fn armed(&self) -> usize;
}

struct ArmedTimer {
    ticket: u64,
    handle: JoinHandle<()>,
}

/// Tokio-task backed scheduler: one sleeping task per committed object.
#[derive(Clone)]
pub struct TimerScheduler {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    timers: Arc<Mutex<HashMap<String, ArmedTimer>>>,
    next_ticket: Arc<AtomicU64>,
}

impl TimerScheduler {
    pub fn new(db: Database, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            db,
            blobs,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: Arc::new(AtomicU64::new(0)),
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<String, ArmedTimer>> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take ownership of the firing for `id`. Only the task holding the
    /// current ticket wins; a cancelled or replaced timer gets false.
    fn claim(&self, id: &str, ticket: u64) -> bool {
        let mut timers = self.timers();
        match timers.get(id) {
            Some(timer) if timer.ticket == ticket => {
                timers.remove(id);
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ExpiryScheduler for TimerScheduler {
    async fn arm(&self, id: &str, expiry: DateTime<Utc>) {
        let now = Utc::now();
        if expiry <= now {
            self.on_fire(id).await;
            return;
        }

        let delay = (expiry - now).to_std().unwrap_or_default();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let scheduler = self.clone();
        let key = id.to_string();

        // Register before the task can possibly try to claim its ticket
        let mut timers = self.timers();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if scheduler.claim(&key, ticket) {
                scheduler.on_fire(&key).await;
            }
        });
        if let Some(previous) = timers.insert(id.to_string(), ArmedTimer { ticket, handle }) {
            previous.handle.abort();
        }
        drop(timers);

        tracing::debug!(object_id = %id, expiry = %expiry, "Armed expiry timer");
    }

    fn cancel(&self, id: &str) -> bool {
        match self.timers().remove(id) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    async fn on_fire(&self, id: &str) {
        // Whatever happens below, this id has fired.
        if let Some(timer) = self.timers().remove(id) {
            timer.handle.abort();
        }

        tracing::info!(object_id = %id, "Object expired, deleting");
        if let Err(e) = remove_object(&self.db, self.blobs.as_ref(), id).await {
            tracing::error!(
                object_id = %id,
                error = %e,
                "Failed to delete expired object, manual cleanup may be required"
            );
        }
    }

    fn armed(&self) -> usize {
        self.timers().len()
    }
}

/// Counts from a startup recovery pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Pending uploads that could not survive the restart
    pub reclaimed: u64,
    /// Committed objects whose expiry passed while the process was down
    pub expired: u64,
    /// Committed objects with a timer armed
    pub armed: u64,
    /// Blob files with no row
    pub orphaned_blobs: u64,
    /// Committed rows with no blob
    pub missing_blobs: u64,
}

/// Rebuild all timer state from the store: reclaim every pending upload, arm
/// every committed object, then bring blobs and rows back into lockstep.
///
/// Only failing to read the store itself is an error. Blob and delete
/// failures are logged and skipped.
pub async fn recover(
    scheduler: &dyn ExpiryScheduler,
    db: &Database,
    blobs: &dyn BlobStore,
) -> Result<RecoveryStats, LifecycleError> {
    let mut stats = RecoveryStats::default();

    for id in db.all_pending()? {
        tracing::info!(object_id = %id, "Upload is unfinished, reclaiming");
        match remove_object(db, blobs, &id).await {
            Ok(()) => stats.reclaimed += 1,
            Err(e) => {
                tracing::error!(object_id = %id, error = %e, "Failed to reclaim unfinished upload")
            }
        }
    }

    let now = Utc::now();
    for (id, expiry) in db.all_committed()? {
        match blobs.exists(&id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(object_id = %id, "Committed object has no blob, deleting row");
                match db.delete(&id) {
                    Ok(_) => stats.missing_blobs += 1,
                    Err(e) => {
                        tracing::error!(object_id = %id, error = %e, "Failed to delete row with no blob")
                    }
                }
                continue;
            }
            // Still arm it; expiry will remove whatever is there
            Err(e) => {
                tracing::error!(object_id = %id, error = %e, "Failed to check blob, arming anyway")
            }
        }

        if expiry <= now {
            stats.expired += 1;
        } else {
            stats.armed += 1;
        }
        scheduler.arm(&id, expiry).await;
    }

    let keys = match blobs.list().await {
        Ok(keys) => keys,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list blobs, skipping orphan sweep");
            Vec::new()
        }
    };
    for key in keys {
        // Only files named like object ids are ours to judge
        if uuid::Uuid::parse_str(&key).is_err() {
            continue;
        }
        if db.get_object(&key)?.is_some() {
            continue;
        }
        tracing::warn!(object_id = %key, "Removing blob with no row");
        match blobs.delete(&key).await {
            Ok(()) => stats.orphaned_blobs += 1,
            Err(e) => tracing::error!(object_id = %key, error = %e, "Failed to remove orphaned blob"),
        }
    }

    Ok(stats)
}
