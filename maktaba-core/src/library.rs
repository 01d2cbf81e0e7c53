//! The library as seen by the CLI and the HTTP API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cursor::{SyncKey, VersionCursor};
use crate::extract::{ArchiveTableExtractor, SqliteTableReader, TableReader};
use crate::outline::{self, TitleNode};
use crate::record::{tables, BookDataset, MasterDataset};
use crate::storage::{FileSnapshotStore, FileVersionStore, SnapshotStore, VersionStore};
use crate::sync::{HttpPatchSource, PatchSource, SyncOrchestrator, SyncOutcome, SyncResult, SyncStatus};

/// Local mirror of the remote library.
///
/// Reads are served from the last persisted snapshots. Book content that was
/// never downloaded is synced on first request.
pub struct Library {
    orchestrator: SyncOrchestrator,
    snapshots: Arc<dyn SnapshotStore>,
    data_dir: Option<PathBuf>,
}

impl Library {
    pub fn new(
        source: Arc<dyn PatchSource>,
        reader: Arc<dyn TableReader>,
        versions: Arc<dyn VersionStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        let orchestrator = SyncOrchestrator::new(
            source,
            ArchiveTableExtractor::new(reader),
            versions,
            snapshots.clone(),
        );
        Self {
            orchestrator,
            snapshots,
            data_dir: None,
        }
    }

    /// A library persisted under `data_dir` and synced over HTTP.
    pub fn open(data_dir: impl AsRef<Path>, base_url: &str, api_key: &str) -> Self {
        let data_dir = data_dir.as_ref();
        let mut library = Self::new(
            Arc::new(HttpPatchSource::new(base_url, api_key)),
            Arc::new(SqliteTableReader::new()),
            Arc::new(FileVersionStore::new(data_dir.join("versions"))),
            Arc::new(FileSnapshotStore::new(data_dir)),
        );
        library.data_dir = Some(data_dir.to_path_buf());
        library
    }

    /// Directory of the file stores, if the library was opened on one.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub async fn sync_master(&self) -> SyncResult<SyncOutcome> {
        self.orchestrator.sync_master().await
    }

    pub async fn sync_book(&self, book_id: i64) -> SyncResult<SyncOutcome> {
        self.orchestrator.sync_book(book_id).await
    }

    /// The catalog; empty before the first master sync.
    pub fn get_master(&self) -> SyncResult<MasterDataset> {
        Ok(self.snapshots.load_master()?)
    }

    /// The local copy of a book, without going to the network.
    pub fn local_book(&self, book_id: i64) -> SyncResult<Option<BookDataset>> {
        Ok(self.snapshots.load_book(book_id)?)
    }

    /// The content of a book, syncing it first if there is no local copy.
    ///
    /// `Ok(None)` means the remote has nothing for this book either.
    pub async fn get_book_content(&self, book_id: i64) -> SyncResult<Option<BookDataset>> {
        if let Some(book) = self.snapshots.load_book(book_id)? {
            return Ok(Some(book));
        }
        tracing::info!(book_id, "no local copy, syncing book");
        self.orchestrator.sync_book(book_id).await?;
        Ok(self.snapshots.load_book(book_id)?)
    }

    /// The outline of a book; empty if the book is not available.
    pub async fn get_outline(&self, book_id: i64) -> SyncResult<Vec<TitleNode>> {
        match self.get_book_content(book_id).await? {
            Some(book) => Ok(outline::build(book.table(tables::TITLE))?),
            None => Ok(Vec::new()),
        }
    }

    /// Ids of the books with a local copy.
    pub fn downloaded_books(&self) -> SyncResult<Vec<i64>> {
        Ok(self.snapshots.list_books()?)
    }

    pub fn cursor(&self, key: &SyncKey) -> VersionCursor {
        self.orchestrator.cursor(key)
    }

    pub async fn status(&self, key: &SyncKey) -> SyncStatus {
        self.orchestrator.status(key).await
    }
}
