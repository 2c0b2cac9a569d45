//! tempshare - temporary, link-shareable file storage
//!
//! Every stored object carries an expiry and is deleted, blob and metadata
//! together, at or shortly after it. The crate provides:
//! - A redb-backed registry of objects (pending or committed)
//! - Chunked uploads that are reclaimed after a period of inactivity
//! - One expiry timer per committed object, re-derived from the registry on startup
//! - A REST API for uploading, listing, renaming, deleting and downloading

pub mod access;
pub mod api;
pub mod blob_store;
pub mod config;
pub mod lifecycle;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use config::Config;
use lifecycle::Lifecycle;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub lifecycle: Lifecycle,
}
