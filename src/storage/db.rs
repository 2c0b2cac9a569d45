use redb::{Database as RedbDatabase, ReadTransaction, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::{OBJECTS, OWNER_OBJECTS};

const DB_FILE: &str = "tempshare.redb";

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("Object id collision: {0}")]
    IdCollision(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
}

// redb's error types are large, so they are held boxed
macro_rules! boxed_redb_errors {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for DatabaseError {
                fn from(e: $source) -> Self {
                    DatabaseError::$variant(Box::new(e))
                }
            }
        )*
    };
}

boxed_redb_errors! {
    redb::CommitError => Commit,
    redb::DatabaseError => RedbDatabase,
    redb::Error => Redb,
    redb::StorageError => Storage,
    redb::TableError => Table,
    redb::TransactionError => Transaction,
}

/// The durable object registry. Cheap to clone; all clones share one redb
/// handle, and redb serializes write transactions.
#[derive(Clone)]
pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Database {
    /// Open (creating if needed) the registry under `data_dir`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let db = RedbDatabase::create(data_dir.join(DB_FILE))?;

        // Tables must exist before the first read transaction opens them
        let txn = db.begin_write()?;
        txn.open_table(OBJECTS)?;
        txn.open_table(OWNER_OBJECTS)?;
        txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }
}
