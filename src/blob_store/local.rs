use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::{BlobReader, BlobStore, BlobStoreError};

/// Blob files stored flat in one directory, named by key.
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf, BlobStoreError> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(BlobStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(key))
    }
}

fn not_found(key: &str, e: std::io::Error) -> BlobStoreError {
    if e.kind() == ErrorKind::NotFound {
        BlobStoreError::NotFound(key.to_string())
    } else {
        BlobStoreError::Io(e)
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobStoreError> {
        let path = self.blob_path(key)?;
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn append(&self, key: &str, data: &[u8]) -> Result<u64, BlobStoreError> {
        let path = self.blob_path(key)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(data).await?;
        // tokio::fs::File completes writes in the background until flushed
        file.flush().await?;
        Ok(file.metadata().await?.len())
    }

    async fn open(&self, key: &str) -> Result<BlobReader, BlobStoreError> {
        let path = self.blob_path(key)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| not_found(key, e))?;
        let len = file.metadata().await?.len();
        Ok(BlobReader {
            len,
            reader: Box::new(file),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        let path = self.blob_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        let path = self.blob_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn list(&self) -> Result<Vec<String>, BlobStoreError> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(name.to_string());
            }
        }
        Ok(keys)
    }
}
