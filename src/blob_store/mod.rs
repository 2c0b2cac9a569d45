mod local;

pub use local::LocalStore;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("Invalid blob key: {0}")]
    InvalidKey(String),
}

/// A readable blob together with its length in bytes.
pub struct BlobReader {
    pub len: u64,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

/// One blob per object, keyed by the object id.
/// The raw blobs are meaningless without the metadata DB.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a whole blob, replacing any previous content.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobStoreError>;
    /// Append to a blob, creating it if absent. Returns the new length.
    async fn append(&self, key: &str, data: &[u8]) -> Result<u64, BlobStoreError>;
    async fn open(&self, key: &str) -> Result<BlobReader, BlobStoreError>;
    /// Remove a blob. A blob that is already absent counts as removed.
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError>;
    /// Keys of every blob currently stored.
    async fn list(&self) -> Result<Vec<String>, BlobStoreError>;
}
