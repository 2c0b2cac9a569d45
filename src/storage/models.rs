use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an object's upload has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    /// Upload in progress. Invisible to listing and download.
    Pending,
    /// Upload finished. Servable until expiry.
    Committed,
}

/// An object row stored in redb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    // System fields
    pub id: String,
    pub owner_id: u64,
    pub status: ObjectStatus,
    pub expiry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub display_name: String,
    /// Opaque hash produced by the access module. `None` means anyone holding
    /// the id may download.
    #[serde(default)]
    pub access_secret: Option<String>,
}

impl ObjectRecord {
    pub fn is_committed(&self) -> bool {
        self.status == ObjectStatus::Committed
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// Caller-supplied fields for a new object row.
#[derive(Debug, Clone)]
pub struct NewObject {
    pub owner_id: u64,
    pub display_name: String,
    pub expiry: DateTime<Utc>,
    pub access_secret: Option<String>,
}
