use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::models::{NewObject, ObjectRecord, ObjectStatus};
use super::tables::*;

impl Database {
    // ========================================================================
    // Creation
    // ========================================================================

    /// Insert a row for an upload that will arrive in chunks. Returns the new id.
    pub fn create_pending(&self, new: &NewObject) -> Result<String, DatabaseError> {
        self.create_object(new, ObjectStatus::Pending)
    }

    /// Insert a row for a blob that is already fully stored. Returns the new id.
    pub fn create_committed(&self, new: &NewObject) -> Result<String, DatabaseError> {
        self.create_object(new, ObjectStatus::Committed)
    }

    fn create_object(&self, new: &NewObject, status: ObjectStatus) -> Result<String, DatabaseError> {
        let now = Utc::now();
        let record = ObjectRecord {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: new.owner_id,
            status,
            expiry: new.expiry,
            created_at: now,
            updated_at: now,
            display_name: new.display_name.clone(),
            access_secret: new.access_secret.clone(),
        };
        self.put_object(&record)?;
        Ok(record.id)
    }

    /// Store a fully formed row and index it by owner. Refuses to overwrite
    /// an existing id.
    pub fn put_object(&self, record: &ObjectRecord) -> Result<(), DatabaseError> {
        debug_assert!(!record.id.is_empty(), "object id must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(OBJECTS)?;
            if table.get(record.id.as_str())?.is_some() {
                return Err(DatabaseError::IdCollision(record.id.clone()));
            }
            let data = rmp_serde::to_vec_named(record)?;
            table.insert(record.id.as_str(), data.as_slice())?;
        }
        index_owner(&write_txn, record.owner_id, &record.id)?;
        write_txn.commit()?;
        Ok(())
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Flip a pending row owned by `owner_id` to committed. Returns the
    /// committed row, or `None` when no such pending row exists.
    pub fn commit(&self, id: &str, owner_id: u64) -> Result<Option<ObjectRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let committed = {
            let mut table = write_txn.open_table(OBJECTS)?;
            let existing: Option<ObjectRecord> = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };

            match existing {
                Some(mut object)
                    if object.owner_id == owner_id && object.status == ObjectStatus::Pending =>
                {
                    object.status = ObjectStatus::Committed;
                    object.updated_at = Utc::now();
                    let data = rmp_serde::to_vec_named(&object)?;
                    table.insert(id, data.as_slice())?;
                    Some(object)
                }
                _ => None,
            }
        };
        write_txn.commit()?;
        Ok(committed)
    }

    /// Change the display name of an object owned by `owner_id`. Returns
    /// false when the id/owner pair does not match.
    pub fn rename(&self, id: &str, owner_id: u64, display_name: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let renamed = {
            let mut table = write_txn.open_table(OBJECTS)?;
            let existing: Option<ObjectRecord> = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };

            match existing {
                Some(mut object) if object.owner_id == owner_id => {
                    object.display_name = display_name.to_string();
                    object.updated_at = Utc::now();
                    let data = rmp_serde::to_vec_named(&object)?;
                    table.insert(id, data.as_slice())?;
                    true
                }
                _ => false,
            }
        };
        write_txn.commit()?;
        Ok(renamed)
    }

    /// Remove a row and its owner index entry. Deleting a missing id is not
    /// an error; the return value reports whether a row was removed.
    pub fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let owner_id: Option<u64> = {
            let table = write_txn.open_table(OBJECTS)?;
            let result = match table.get(id)? {
                Some(data) => {
                    let object: ObjectRecord = rmp_serde::from_slice(data.value())?;
                    Some(object.owner_id)
                }
                None => None,
            };
            result
        };

        let deleted = match owner_id {
            Some(owner_id) => {
                {
                    let mut table = write_txn.open_table(OBJECTS)?;
                    table.remove(id)?;
                }
                unindex_owner(&write_txn, owner_id, id)?;
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(deleted)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Get a row regardless of status or owner
    pub fn get_object(&self, id: &str) -> Result<Option<ObjectRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(OBJECTS)?;

        match table.get(id)? {
            Some(data) => {
                let object: ObjectRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(object))
            }
            None => Ok(None),
        }
    }

    /// Get a row in any status, but only when `owner_id` owns it
    pub fn get_owned(&self, id: &str, owner_id: u64) -> Result<Option<ObjectRecord>, DatabaseError> {
        Ok(self.get_object(id)?.filter(|o| o.owner_id == owner_id))
    }

    /// Get a committed, unexpired row. Pending and expired rows are invisible.
    pub fn get_for_download(&self, id: &str) -> Result<Option<ObjectRecord>, DatabaseError> {
        let now = Utc::now();
        Ok(self
            .get_object(id)?
            .filter(|o| o.is_committed() && !o.is_expired_at(now)))
    }

    /// All committed rows belonging to an owner
    pub fn list_committed(&self, owner_id: u64) -> Result<Vec<ObjectRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let owner_table = read_txn.open_table(OWNER_OBJECTS)?;
        let objects_table = read_txn.open_table(OBJECTS)?;

        let ids: Vec<String> = match owner_table.get(owner_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut objects = Vec::new();
        for id in ids {
            if let Some(data) = objects_table.get(id.as_str())? {
                let object: ObjectRecord = rmp_serde::from_slice(data.value())?;
                if object.is_committed() {
                    objects.push(object);
                }
            }
        }

        Ok(objects)
    }

    /// Every committed row as (id, expiry), for re-arming timers at startup
    pub fn all_committed(&self) -> Result<Vec<(String, DateTime<Utc>)>, DatabaseError> {
        Ok(self
            .all_objects()?
            .into_iter()
            .filter(ObjectRecord::is_committed)
            .map(|o| (o.id, o.expiry))
            .collect())
    }

    /// Every pending row id, for reclaiming abandoned uploads at startup
    pub fn all_pending(&self) -> Result<Vec<String>, DatabaseError> {
        Ok(self
            .all_objects()?
            .into_iter()
            .filter(|o| o.status == ObjectStatus::Pending)
            .map(|o| o.id)
            .collect())
    }

    fn all_objects(&self) -> Result<Vec<ObjectRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(OBJECTS)?;

        let mut objects = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let object: ObjectRecord = rmp_serde::from_slice(value.value())?;
            objects.push(object);
        }

        Ok(objects)
    }
}

// ============================================================================
// Owner index maintenance
// ============================================================================

fn index_owner(write_txn: &WriteTransaction, owner_id: u64, id: &str) -> Result<(), DatabaseError> {
    let mut owner_table = write_txn.open_table(OWNER_OBJECTS)?;
    let mut ids: Vec<String> = match owner_table.get(owner_id)? {
        Some(data) => rmp_serde::from_slice(data.value())?,
        None => Vec::new(),
    };

    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
        let data = rmp_serde::to_vec_named(&ids)?;
        owner_table.insert(owner_id, data.as_slice())?;
    }
    Ok(())
}

fn unindex_owner(write_txn: &WriteTransaction, owner_id: u64, id: &str) -> Result<(), DatabaseError> {
    let mut owner_table = write_txn.open_table(OWNER_OBJECTS)?;
    let ids: Option<Vec<String>> = match owner_table.get(owner_id)? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };

    if let Some(mut ids) = ids {
        ids.retain(|existing| existing != id);
        if ids.is_empty() {
            owner_table.remove(owner_id)?;
        } else {
            let data = rmp_serde::to_vec_named(&ids)?;
            owner_table.insert(owner_id, data.as_slice())?;
        }
    }
    Ok(())
}
