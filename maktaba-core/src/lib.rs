//! Maktaba Core Library
//!
//! Incremental synchronization of a versioned bibliographic dataset: version
//! cursors, patch archive extraction, delta merge and durable snapshots, plus
//! the read-side queries built on them.

pub mod catalog;
pub mod cursor;
pub mod extract;
pub mod library;
pub mod merge;
pub mod outline;
pub mod record;
pub mod storage;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use cursor::{SyncKey, VersionCursor};
pub use extract::{ArchiveTableExtractor, Extraction, ExtractionError, SqliteTableReader, TableReader};
pub use library::Library;
pub use merge::{apply_patch, merge, PatchMode};
pub use outline::{OutlineError, TitleNode};
pub use record::{
    BookDataset, Cell, Dataset, DatasetKind, MasterDataset, PatchRecord, Record, Table, Value,
};
pub use storage::{
    FileSnapshotStore, FileVersionStore, MemorySnapshotStore, MemoryVersionStore, SnapshotStore,
    StorageError, VersionStore,
};
pub use sync::{
    BookPatch, HttpPatchSource, MasterPatch, PatchSource, RemoteError, SyncError, SyncOrchestrator,
    SyncOutcome, SyncPhase, SyncResult, SyncStatus,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
