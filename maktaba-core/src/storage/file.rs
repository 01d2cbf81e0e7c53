//! Filesystem-backed stores.
//!
//! Layout under the data directory:
//! ```text
//! <DATA_DIR>/
//!   master.json
//!   books/
//!     <book_id>.json
//!   versions/
//!     master.json
//!     book_<book_id>.json
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{SnapshotStore, StorageError, VersionStore};
use crate::cursor::{SyncKey, VersionCursor};
use crate::record::{BookDataset, Dataset, DatasetKind, MasterDataset};

/// Writes `bytes` to `path` through a temp file and a rename, so readers see
/// either the old content or the new one.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::Io(parent.to_path_buf(), e))?;
    }

    let temp_path = path.with_extension("json.tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::Io(temp_path.clone(), e))?;
    file.write_all(bytes)
        .map_err(|e| StorageError::Io(temp_path.clone(), e))?;
    file.sync_all()
        .map_err(|e| StorageError::Io(temp_path.clone(), e))?;

    fs::rename(&temp_path, path).map_err(|e| StorageError::Io(path.to_path_buf(), e))?;

    Ok(())
}

/// Reads and decodes a JSON file; `Ok(None)` if it does not exist.
fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::Decode(path.to_path_buf(), e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(path.to_path_buf(), e)),
    }
}

/// On-disk cursor record.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCursor {
    #[serde(flatten)]
    cursor: VersionCursor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

/// One small JSON file per sync key.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    dir: PathBuf,
}

impl FileVersionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the file holding the cursor for `key`.
    pub fn path(&self, key: &SyncKey) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn read(&self, key: &SyncKey) -> Result<Option<VersionCursor>, StorageError> {
        let stored: Option<StoredCursor> = read_json(&self.path(key))?;
        // A cursor of the wrong shape for its key is as good as none.
        Ok(stored
            .map(|s| s.cursor)
            .filter(|c| std::mem::discriminant(c) == std::mem::discriminant(&key.zero_cursor())))
    }
}

impl VersionStore for FileVersionStore {
    fn get(&self, key: &SyncKey) -> VersionCursor {
        match self.read(key) {
            Ok(Some(cursor)) => cursor,
            Ok(None) => key.zero_cursor(),
            Err(e) => {
                // Starting over is safe: re-applying patches is idempotent.
                tracing::warn!(%key, error = %e, "unreadable version cursor, starting from zero");
                key.zero_cursor()
            }
        }
    }

    fn set(&self, key: &SyncKey, cursor: VersionCursor) -> Result<(), StorageError> {
        let stored = StoredCursor {
            cursor,
            updated_at: Some(Utc::now()),
        };
        let bytes = serde_json::to_vec_pretty(&stored)?;
        write_atomic(&self.path(key), &bytes)
    }
}

/// Snapshots as JSON files.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    data_dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn master_path(&self) -> PathBuf {
        self.data_dir.join("master.json")
    }

    fn books_dir(&self) -> PathBuf {
        self.data_dir.join("books")
    }

    fn book_path(&self, book_id: i64) -> PathBuf {
        self.books_dir().join(format!("{}.json", book_id))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load_master(&self) -> Result<MasterDataset, StorageError> {
        let mut dataset: Dataset = read_json(&self.master_path())?.unwrap_or_default();
        dataset.ensure_tables(DatasetKind::Master);
        Ok(dataset)
    }

    fn save_master(&self, dataset: &MasterDataset) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(dataset)?;
        write_atomic(&self.master_path(), &bytes)
    }

    fn load_book(&self, book_id: i64) -> Result<Option<BookDataset>, StorageError> {
        let dataset: Option<Dataset> = read_json(&self.book_path(book_id))?;
        Ok(dataset.map(|mut d| {
            d.ensure_tables(DatasetKind::Book);
            d
        }))
    }

    fn save_book(&self, book_id: i64, dataset: &BookDataset) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(dataset)?;
        write_atomic(&self.book_path(book_id), &bytes)
    }

    fn list_books(&self) -> Result<Vec<i64>, StorageError> {
        let dir = self.books_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::Io(dir.clone(), e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn has_book(&self, book_id: i64) -> Result<bool, StorageError> {
        Ok(self.book_path(book_id).exists())
    }
}
