//! Test doubles and fixture builders shared by the unit tests.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, SqliteConnection};
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Write};
use std::sync::Mutex;
use zip::write::SimpleFileOptions;

use crate::cursor::{SyncKey, VersionCursor};
use crate::extract::{ExtractionError, RawRow, RawValue, TableReader};
use crate::record::{BookDataset, MasterDataset};
use crate::storage::{MemorySnapshotStore, MemoryVersionStore, SnapshotStore, StorageError, VersionStore};
use crate::sync::{BookPatch, MasterPatch, PatchSource, RemoteError};

pub fn raw_row(cells: &[(&str, RawValue)]) -> RawRow {
    cells
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Builds a zip archive with one deflated entry per `(name, bytes)` pair.
pub fn zip_archive<B: AsRef<[u8]>>(entries: &[(&str, B)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes.as_ref()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Creates a SQLite database file from a schema and insert statements and
/// returns its bytes.
pub async fn sqlite_extract(schema: &str, inserts: &[&str]) -> Vec<u8> {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("extract.db");

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
    sqlx::query(schema).execute(&mut conn).await.unwrap();
    for insert in inserts {
        sqlx::query(insert).execute(&mut conn).await.unwrap();
    }
    conn.close().await.unwrap();

    std::fs::read(&path).unwrap()
}

/// Table reader whose "extracts" are labels mapped to canned rows.
#[derive(Default)]
pub struct FakeTableReader {
    rows: HashMap<Vec<u8>, Vec<RawRow>>,
}

impl FakeTableReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: &str, rows: Vec<RawRow>) -> Self {
        self.rows.insert(label.as_bytes().to_vec(), rows);
        self
    }
}

#[async_trait]
impl TableReader for FakeTableReader {
    async fn read_table(&self, table: &str, extract: &[u8]) -> Result<Vec<RawRow>, ExtractionError> {
        self.rows
            .get(extract)
            .cloned()
            .ok_or_else(|| ExtractionError::Table {
                table: table.to_string(),
                reason: "unknown extract".to_string(),
            })
    }
}

/// Patch source answering from queued responses and a map of archives.
#[derive(Default)]
pub struct ScriptedPatchSource {
    master: Mutex<VecDeque<Result<MasterPatch, RemoteError>>>,
    books: Mutex<VecDeque<Result<BookPatch, RemoteError>>>,
    archives: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedPatchSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_master(&self, response: Result<MasterPatch, RemoteError>) {
        self.master.lock().unwrap().push_back(response);
    }

    pub fn push_book(&self, response: Result<BookPatch, RemoteError>) {
        self.books.lock().unwrap().push_back(response);
    }

    pub fn archive(&self, url: &str, bytes: Vec<u8>) {
        self.archives.lock().unwrap().insert(url.to_string(), bytes);
    }

    /// Every call made so far, as `master?version=V`, `book/ID?M.N` or the
    /// downloaded URL.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: String) {
        self.requests.lock().unwrap().push(request);
    }
}

#[async_trait]
impl PatchSource for ScriptedPatchSource {
    async fn master_patch(&self, version: u64) -> Result<MasterPatch, RemoteError> {
        self.record(format!("master?version={}", version));
        // Lets a concurrent sync run up to its own lock before this one
        // proceeds.
        tokio::task::yield_now().await;
        self.master
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(MasterPatch::UpToDate))
    }

    async fn book_patch(&self, book_id: i64, major: u64, minor: u64) -> Result<BookPatch, RemoteError> {
        self.record(format!("book/{}?{}.{}", book_id, major, minor));
        self.books
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(BookPatch::UpToDate))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        self.record(url.to_string());
        self.archives
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| RemoteError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Snapshot store that refuses saves while `failing` is set.
#[derive(Default)]
pub struct FlakySnapshotStore {
    pub inner: MemorySnapshotStore,
    pub failing: Mutex<bool>,
}

impl FlakySnapshotStore {
    pub fn failing() -> Self {
        Self {
            inner: MemorySnapshotStore::new(),
            failing: Mutex::new(true),
        }
    }

    pub fn recover(&self) {
        *self.failing.lock().unwrap() = false;
    }

    fn check(&self) -> Result<(), StorageError> {
        if *self.failing.lock().unwrap() {
            Err(StorageError::Unavailable("disk full".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SnapshotStore for FlakySnapshotStore {
    fn load_master(&self) -> Result<MasterDataset, StorageError> {
        self.inner.load_master()
    }

    fn save_master(&self, dataset: &MasterDataset) -> Result<(), StorageError> {
        self.check()?;
        self.inner.save_master(dataset)
    }

    fn load_book(&self, book_id: i64) -> Result<Option<BookDataset>, StorageError> {
        self.inner.load_book(book_id)
    }

    fn save_book(&self, book_id: i64, dataset: &BookDataset) -> Result<(), StorageError> {
        self.check()?;
        self.inner.save_book(book_id, dataset)
    }

    fn list_books(&self) -> Result<Vec<i64>, StorageError> {
        self.inner.list_books()
    }
}

/// Version store that refuses writes while `failing` is set.
#[derive(Default)]
pub struct FlakyVersionStore {
    pub inner: MemoryVersionStore,
    pub failing: Mutex<bool>,
}

impl FlakyVersionStore {
    pub fn failing() -> Self {
        Self {
            inner: MemoryVersionStore::new(),
            failing: Mutex::new(true),
        }
    }

    pub fn recover(&self) {
        *self.failing.lock().unwrap() = false;
    }
}

impl VersionStore for FlakyVersionStore {
    fn get(&self, key: &SyncKey) -> VersionCursor {
        self.inner.get(key)
    }

    fn set(&self, key: &SyncKey, cursor: VersionCursor) -> Result<(), StorageError> {
        if *self.failing.lock().unwrap() {
            return Err(StorageError::Unavailable("cursor file locked".to_string()));
        }
        self.inner.set(key, cursor)
    }
}

/// Patch source whose master check never answers.
pub struct StalledPatchSource;

#[async_trait]
impl PatchSource for StalledPatchSource {
    async fn master_patch(&self, _version: u64) -> Result<MasterPatch, RemoteError> {
        std::future::pending().await
    }

    async fn book_patch(&self, _book_id: i64, _major: u64, _minor: u64) -> Result<BookPatch, RemoteError> {
        std::future::pending().await
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>, RemoteError> {
        std::future::pending().await
    }
}
