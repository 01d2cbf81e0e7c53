//! Durable state: version cursors and dataset snapshots.
//!
//! Both stores are injected into the orchestrator rather than reached through
//! global paths, so tests can swap in the in-memory variants.

mod file;
mod memory;

pub use file::{FileSnapshotStore, FileVersionStore};
pub use memory::{MemorySnapshotStore, MemoryVersionStore};

use std::io;
use std::path::PathBuf;

use crate::cursor::{SyncKey, VersionCursor};
use crate::record::{BookDataset, MasterDataset};

/// Errors that can occur while reading or writing persisted state.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error reading or writing a file.
    #[error("I/O error for {}: {1}", .0.display())]
    Io(PathBuf, #[source] io::Error),
    /// A persisted file exists but cannot be decoded.
    #[error("failed to decode {}: {1}", .0.display())]
    Decode(PathBuf, #[source] serde_json::Error),
    /// A dataset could not be serialized.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    /// The store refused the write.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Last applied version per sync key.
pub trait VersionStore: Send + Sync {
    /// Returns the stored cursor, or the zero cursor for `key` if nothing
    /// usable is stored.
    fn get(&self, key: &SyncKey) -> VersionCursor;

    /// Durably replaces the cursor for `key`.
    fn set(&self, key: &SyncKey, cursor: VersionCursor) -> Result<(), StorageError>;
}

/// Whole-dataset snapshots.
///
/// Every save is all-or-nothing: a failed or interrupted save leaves the
/// previous snapshot readable.
pub trait SnapshotStore: Send + Sync {
    /// The master dataset, or an empty one if none was saved yet.
    fn load_master(&self) -> Result<MasterDataset, StorageError>;

    fn save_master(&self, dataset: &MasterDataset) -> Result<(), StorageError>;

    /// The dataset of a book, or `None` if it was never downloaded.
    fn load_book(&self, book_id: i64) -> Result<Option<BookDataset>, StorageError>;

    fn save_book(&self, book_id: i64, dataset: &BookDataset) -> Result<(), StorageError>;

    /// Ids of every book with a local snapshot, ascending.
    fn list_books(&self) -> Result<Vec<i64>, StorageError>;

    fn has_book(&self, book_id: i64) -> Result<bool, StorageError> {
        Ok(self.list_books()?.binary_search(&book_id).is_ok())
    }
}
