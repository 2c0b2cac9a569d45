use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::scheduler::ExpiryScheduler;
use super::{remove_object, validate_expiry, LifecycleError};
use crate::blob_store::BlobStore;
use crate::config::UploadConfig;
use crate::storage::{Database, NewObject, ObjectRecord, ObjectStatus};

/// Where an in-flight upload is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadPhase {
    Pending,
    Committed,
    Reclaimed,
}

struct SlotState {
    phase: UploadPhase,
    /// Bumped on every arm. A timer only acts if its generation is current.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Per-upload critical section. Append, finish and the inactivity timeout all
/// run under `state`, so none of them overlap for the same id.
struct UploadSlot {
    state: tokio::sync::Mutex<SlotState>,
}

impl UploadSlot {
    fn new() -> Self {
        Self {
            state: tokio::sync::Mutex::new(SlotState {
                phase: UploadPhase::Pending,
                generation: 0,
                timer: None,
            }),
        }
    }
}

fn stop_timer(state: &mut SlotState) {
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
}

/// Assembles pending uploads chunk by chunk and reclaims the ones that go
/// quiet for longer than the inactivity timeout.
#[derive(Clone)]
pub struct ChunkAssembler {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    scheduler: Arc<dyn ExpiryScheduler>,
    slots: Arc<Mutex<HashMap<String, Arc<UploadSlot>>>>,
    inactivity_timeout: Duration,
    max_chunk_size: u64,
    max_lifetime: Duration,
}

impl ChunkAssembler {
    pub fn new(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        scheduler: Arc<dyn ExpiryScheduler>,
        uploads: &UploadConfig,
    ) -> Self {
        Self {
            db,
            blobs,
            scheduler,
            slots: Arc::new(Mutex::new(HashMap::new())),
            inactivity_timeout: uploads.inactivity_timeout,
            max_chunk_size: uploads.max_chunk_size,
            max_lifetime: uploads.max_lifetime,
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Arc<UploadSlot>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, id: &str) -> Option<Arc<UploadSlot>> {
        self.slots().get(id).cloned()
    }

    /// Number of uploads currently pending in memory
    pub fn pending_count(&self) -> usize {
        self.slots().len()
    }

    /// Create a pending object with an empty blob and start its inactivity timer.
    pub async fn begin(&self, new: NewObject) -> Result<String, LifecycleError> {
        validate_expiry(new.expiry, self.max_lifetime)?;

        let id = self.db.create_pending(&new)?;
        if let Err(e) = self.blobs.put(&id, Bytes::new()).await {
            if let Err(cleanup) = remove_object(&self.db, self.blobs.as_ref(), &id).await {
                tracing::warn!(object_id = %id, error = %cleanup, "Failed to clean up pending upload");
            }
            return Err(e.into());
        }

        let slot = Arc::new(UploadSlot::new());
        self.slots().insert(id.clone(), Arc::clone(&slot));
        {
            let mut state = slot.state.lock().await;
            self.arm_inactivity(&id, &slot, &mut state);
        }

        tracing::debug!(object_id = %id, owner_id = new.owner_id, "Began upload");
        Ok(id)
    }

    /// Append one chunk to a pending upload. Returns the blob length after
    /// the append.
    pub async fn append(
        &self,
        id: &str,
        owner_id: u64,
        chunk: &[u8],
    ) -> Result<u64, LifecycleError> {
        let size = chunk.len() as u64;
        if size > self.max_chunk_size {
            return Err(LifecycleError::ChunkTooLarge {
                size,
                max: self.max_chunk_size,
            });
        }

        let slot = self.slot(id).ok_or(LifecycleError::InvalidTarget)?;
        let mut state = slot.state.lock().await;
        self.check_target(id, owner_id, &state)?;

        // Replace the idle timer with one that still bounds the upload if
        // this future is dropped mid-write. It cannot act before we release
        // the slot, and re-arming below invalidates it.
        stop_timer(&mut state);
        self.arm_inactivity(id, &slot, &mut state);

        let result = self.blobs.append(id, chunk).await;
        stop_timer(&mut state);
        self.arm_inactivity(id, &slot, &mut state);

        let len = result?;
        tracing::debug!(object_id = %id, chunk = size, total = len, "Appended chunk");
        Ok(len)
    }

    /// Commit a pending upload and hand it to the expiry scheduler. Fails
    /// with `LifetimeExceeded` when the expiry passed during the upload; the
    /// object is deleted in that case.
    pub async fn finish(&self, id: &str, owner_id: u64) -> Result<ObjectRecord, LifecycleError> {
        let slot = self.slot(id).ok_or(LifecycleError::InvalidTarget)?;
        let mut state = slot.state.lock().await;
        self.check_target(id, owner_id, &state)?;

        let object = self
            .db
            .commit(id, owner_id)?
            .ok_or(LifecycleError::InvalidTarget)?;

        stop_timer(&mut state);
        state.phase = UploadPhase::Committed;
        self.slots().remove(id);
        drop(state);

        tracing::debug!(object_id = %id, expiry = %object.expiry, "Committed upload");
        // An expiry that passed mid-upload is deleted by `arm` right here
        let expired = object.is_expired_at(Utc::now());
        self.scheduler.arm(&object.id, object.expiry).await;
        if expired {
            return Err(LifecycleError::LifetimeExceeded);
        }
        Ok(object)
    }

    fn check_target(&self, id: &str, owner_id: u64, state: &SlotState) -> Result<(), LifecycleError> {
        if state.phase != UploadPhase::Pending {
            return Err(LifecycleError::InvalidTarget);
        }
        match self.db.get_owned(id, owner_id)? {
            Some(object) if object.status == ObjectStatus::Pending => Ok(()),
            _ => Err(LifecycleError::InvalidTarget),
        }
    }

    fn arm_inactivity(&self, id: &str, slot: &Arc<UploadSlot>, state: &mut SlotState) {
        state.generation += 1;
        let generation = state.generation;
        let assembler = self.clone();
        let slot = Arc::clone(slot);
        let id = id.to_string();
        let timeout = self.inactivity_timeout;

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            assembler.reclaim(&id, &slot, generation).await;
        }));
    }

    async fn reclaim(&self, id: &str, slot: &UploadSlot, generation: u64) {
        let mut state = slot.state.lock().await;
        if state.phase != UploadPhase::Pending || state.generation != generation {
            return;
        }

        // Dropping our own handle detaches it; the task keeps running.
        state.timer = None;
        state.phase = UploadPhase::Reclaimed;
        self.slots().remove(id);

        tracing::info!(object_id = %id, "Upload timed out, reclaiming");
        if let Err(e) = remove_object(&self.db, self.blobs.as_ref(), id).await {
            tracing::error!(object_id = %id, error = %e, "Failed to reclaim timed out upload");
        }
    }
}
