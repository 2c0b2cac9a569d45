//! The ephemeral-object lifecycle: chunked assembly of pending uploads,
//! expiry timers for committed objects, and recovery of both after a restart.
//!
//! Every object is one row in [`Database`] plus one blob in a [`BlobStore`],
//! both keyed by the object id. Nothing in this module persists timer state;
//! on startup [`Lifecycle::recover`] re-derives it from the rows.

mod assembler;
mod scheduler;

pub use assembler::ChunkAssembler;
pub use scheduler::{recover, ExpiryScheduler, RecoveryStats, TimerScheduler};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::blob_store::{BlobReader, BlobStore, BlobStoreError};
use crate::config::UploadConfig;
use crate::storage::{Database, DatabaseError, NewObject, ObjectRecord};

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Absent, or not visible to the caller. Never distinguishes the two.
    #[error("Object not found")]
    NotFound,
    #[error("Object is not a pending upload owned by the caller")]
    InvalidTarget,
    #[error("Chunk of {size} bytes exceeds the maximum of {max} bytes")]
    ChunkTooLarge { size: u64, max: u64 },
    #[error("Requested expiry is outside the allowed lifetime")]
    LifetimeExceeded,
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
    #[error("Blob IO error: {0}")]
    BlobIo(#[from] BlobStoreError),
}

/// Reject an expiry that is not strictly in the future or lies beyond
/// `now + max_lifetime`.
pub fn validate_expiry(
    expiry: DateTime<Utc>,
    max_lifetime: Duration,
) -> Result<(), LifecycleError> {
    let now = Utc::now();
    let limit = chrono::Duration::from_std(max_lifetime)
        .ok()
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    if expiry <= now || expiry > limit {
        return Err(LifecycleError::LifetimeExceeded);
    }
    Ok(())
}

/// Delete an object's blob and then its row. Both are attempted even when
/// the first fails; the first error is returned. Missing blobs and rows
/// count as deleted.
pub(crate) async fn remove_object(
    db: &Database,
    blobs: &dyn BlobStore,
    id: &str,
) -> Result<(), LifecycleError> {
    let blob_result = blobs.delete(id).await;
    let row_result = db.delete(id);
    blob_result?;
    row_result?;
    Ok(())
}

/// The operations the HTTP layer drives.
pub struct Lifecycle {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    scheduler: Arc<dyn ExpiryScheduler>,
    assembler: ChunkAssembler,
    max_lifetime: Duration,
}

impl Lifecycle {
    /// Build a lifecycle with the in-process timer scheduler.
    pub fn new(db: Database, blobs: Arc<dyn BlobStore>, uploads: &UploadConfig) -> Self {
        let scheduler = Arc::new(TimerScheduler::new(db.clone(), Arc::clone(&blobs)));
        Self::with_scheduler(db, blobs, scheduler, uploads)
    }

    pub fn with_scheduler(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        scheduler: Arc<dyn ExpiryScheduler>,
        uploads: &UploadConfig,
    ) -> Self {
        let assembler = ChunkAssembler::new(
            db.clone(),
            Arc::clone(&blobs),
            Arc::clone(&scheduler),
            uploads,
        );
        Self {
            db,
            blobs,
            scheduler,
            assembler,
            max_lifetime: uploads.max_lifetime,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn scheduler(&self) -> &Arc<dyn ExpiryScheduler> {
        &self.scheduler
    }

    pub fn assembler(&self) -> &ChunkAssembler {
        &self.assembler
    }

    /// Reclaim pending uploads and re-arm expiry timers. Must run before any
    /// request is served.
    pub async fn recover(&self) -> Result<RecoveryStats, LifecycleError> {
        recover(self.scheduler.as_ref(), &self.db, self.blobs.as_ref()).await
    }

    // ========================================================================
    // Upload paths
    // ========================================================================

    pub async fn begin_upload(&self, new: NewObject) -> Result<String, LifecycleError> {
        self.assembler.begin(new).await
    }

    pub async fn append_chunk(
        &self,
        id: &str,
        owner_id: u64,
        chunk: &[u8],
    ) -> Result<u64, LifecycleError> {
        self.assembler.append(id, owner_id, chunk).await
    }

    pub async fn finish_upload(
        &self,
        id: &str,
        owner_id: u64,
    ) -> Result<ObjectRecord, LifecycleError> {
        self.assembler.finish(id, owner_id).await
    }

    /// Store a complete blob as a committed object and arm its expiry.
    pub async fn direct_upload(
        &self,
        new: NewObject,
        data: Bytes,
    ) -> Result<ObjectRecord, LifecycleError> {
        validate_expiry(new.expiry, self.max_lifetime)?;

        // Pending until the blob is in place, so nothing lists or serves a
        // row without content. A crash in between is reclaimed on startup.
        let id = self.db.create_pending(&new)?;
        if let Err(e) = self.blobs.put(&id, data).await {
            if let Err(cleanup) = remove_object(&self.db, self.blobs.as_ref(), &id).await {
                tracing::warn!(object_id = %id, error = %cleanup, "Failed to clean up after blob write failure");
            }
            return Err(e.into());
        }

        let object = self
            .db
            .commit(&id, new.owner_id)?
            .ok_or(LifecycleError::NotFound)?;
        self.scheduler.arm(&object.id, object.expiry).await;

        tracing::debug!(object_id = %id, owner_id = new.owner_id, "Stored object");
        Ok(object)
    }

    // ========================================================================
    // Committed objects
    // ========================================================================

    pub fn rename(
        &self,
        id: &str,
        owner_id: u64,
        display_name: &str,
    ) -> Result<ObjectRecord, LifecycleError> {
        if !self.db.rename(id, owner_id, display_name)? {
            return Err(LifecycleError::NotFound);
        }
        self.db
            .get_owned(id, owner_id)?
            .ok_or(LifecycleError::NotFound)
    }

    pub fn list_for_owner(&self, owner_id: u64) -> Result<Vec<ObjectRecord>, LifecycleError> {
        Ok(self.db.list_committed(owner_id)?)
    }

    /// The owner's view of one of their committed objects.
    pub fn get_owned(&self, id: &str, owner_id: u64) -> Result<ObjectRecord, LifecycleError> {
        self.db
            .get_owned(id, owner_id)?
            .filter(ObjectRecord::is_committed)
            .ok_or(LifecycleError::NotFound)
    }

    pub fn get_for_download(&self, id: &str) -> Result<ObjectRecord, LifecycleError> {
        self.db.get_for_download(id)?.ok_or(LifecycleError::NotFound)
    }

    pub async fn open_blob(&self, id: &str) -> Result<BlobReader, LifecycleError> {
        match self.blobs.open(id).await {
            Ok(reader) => Ok(reader),
            Err(BlobStoreError::NotFound(_)) => Err(LifecycleError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a committed object before its expiry.
    pub async fn delete_now(&self, id: &str, owner_id: u64) -> Result<(), LifecycleError> {
        self.get_owned(id, owner_id)?;
        self.scheduler.cancel(id);
        remove_object(&self.db, self.blobs.as_ref(), id).await?;
        tracing::debug!(object_id = %id, owner_id, "Deleted object");
        Ok(())
    }
}
