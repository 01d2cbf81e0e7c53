//! In-memory stores for embedding and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{SnapshotStore, StorageError, VersionStore};
use crate::cursor::{SyncKey, VersionCursor};
use crate::record::{BookDataset, Dataset, DatasetKind, MasterDataset};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
}

/// Cursors held in a map.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    cursors: Mutex<HashMap<SyncKey, VersionCursor>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionStore for MemoryVersionStore {
    fn get(&self, key: &SyncKey) -> VersionCursor {
        lock(&self.cursors)
            .ok()
            .and_then(|cursors| cursors.get(key).copied())
            .unwrap_or_else(|| key.zero_cursor())
    }

    fn set(&self, key: &SyncKey, cursor: VersionCursor) -> Result<(), StorageError> {
        lock(&self.cursors)?.insert(*key, cursor);
        Ok(())
    }
}

/// Snapshots held as cloned datasets.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    master: Mutex<Option<MasterDataset>>,
    books: Mutex<BTreeMap<i64, BookDataset>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose master snapshot is already `master`.
    pub fn with_master(master: MasterDataset) -> Self {
        Self {
            master: Mutex::new(Some(master)),
            books: Mutex::default(),
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load_master(&self) -> Result<MasterDataset, StorageError> {
        Ok(lock(&self.master)?
            .clone()
            .unwrap_or_else(|| Dataset::empty(DatasetKind::Master)))
    }

    fn save_master(&self, dataset: &MasterDataset) -> Result<(), StorageError> {
        *lock(&self.master)? = Some(dataset.clone());
        Ok(())
    }

    fn load_book(&self, book_id: i64) -> Result<Option<BookDataset>, StorageError> {
        Ok(lock(&self.books)?.get(&book_id).cloned())
    }

    fn save_book(&self, book_id: i64, dataset: &BookDataset) -> Result<(), StorageError> {
        lock(&self.books)?.insert(book_id, dataset.clone());
        Ok(())
    }

    fn list_books(&self) -> Result<Vec<i64>, StorageError> {
        Ok(lock(&self.books)?.keys().copied().collect())
    }
}
