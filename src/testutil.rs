//! Shared test helpers for handler tests.

use std::sync::Arc;

use crate::blob_store::LocalStore;
use crate::config::{Config, DownloadConfig, NodeConfig, StorageConfig, UploadConfig};
use crate::lifecycle::Lifecycle;
use crate::storage::Database;
use crate::AppState;

/// Create a test AppState with a temporary database and local blob store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        storage: StorageConfig {
            local_storage_path: files_dir.to_string_lossy().to_string(),
        },
        uploads: UploadConfig {
            max_upload_size: 1024 * 1024,
            max_chunk_size: 1024,
            ..Default::default()
        },
        downloads: DownloadConfig {
            inline_types: vec!["image/png".to_string()],
        },
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let blobs = LocalStore::new(&files_dir).expect("Failed to create test blob store");
    let lifecycle = Lifecycle::new(db, Arc::new(blobs), &config.uploads);

    Arc::new(AppState { config, lifecycle })
}
