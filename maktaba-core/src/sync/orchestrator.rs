//! Per-key sync state machine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::Mutex;

use super::error::SyncResult;
use super::remote::{BookPatch, MasterPatch, PatchSource};
use crate::cursor::{SyncKey, VersionCursor};
use crate::extract::{ArchiveTableExtractor, PatchTables};
use crate::merge::{apply_patch, PatchMode};
use crate::record::{Dataset, DatasetKind};
use crate::storage::{SnapshotStore, VersionStore};

/// Where a sync key is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Fetching,
    UpToDate,
    Extracting,
    Merging,
    Persisting,
    Failed,
}

impl SyncPhase {
    /// Returns true while a sync holds the key.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncPhase::Fetching | SyncPhase::Extracting | SyncPhase::Merging | SyncPhase::Persisting
        )
    }
}

/// Observable state of one sync key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// Message of the last failed attempt; cleared by the next success.
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            last_error: None,
            updated_at: None,
        }
    }
}

/// What a successful sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote had nothing new; nothing was written.
    UpToDate { cursor: VersionCursor },
    /// A patch was applied and persisted.
    Updated {
        cursor: VersionCursor,
        /// Live records per table after the merge.
        counts: BTreeMap<String, usize>,
    },
}

impl SyncOutcome {
    pub fn cursor(&self) -> VersionCursor {
        match self {
            SyncOutcome::UpToDate { cursor } | SyncOutcome::Updated { cursor, .. } => *cursor,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, SyncOutcome::Updated { .. })
    }
}

/// Coordinates cursor, remote, extraction, merge and persistence.
///
/// Syncs on the same key are serialized; different keys run independently.
pub struct SyncOrchestrator {
    source: Arc<dyn PatchSource>,
    extractor: ArchiveTableExtractor,
    versions: Arc<dyn VersionStore>,
    snapshots: Arc<dyn SnapshotStore>,
    locks: Mutex<HashMap<SyncKey, Arc<Mutex<()>>>>,
    status: StdMutex<HashMap<SyncKey, SyncStatus>>,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn PatchSource>,
        extractor: ArchiveTableExtractor,
        versions: Arc<dyn VersionStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            source,
            extractor,
            versions,
            snapshots,
            locks: Mutex::new(HashMap::new()),
            status: StdMutex::new(HashMap::new()),
        }
    }

    pub fn snapshots(&self) -> &Arc<dyn SnapshotStore> {
        &self.snapshots
    }

    /// The last applied cursor of `key`.
    pub fn cursor(&self, key: &SyncKey) -> VersionCursor {
        self.versions.get(key)
    }

    pub async fn status(&self, key: &SyncKey) -> SyncStatus {
        lock_status(&self.status).get(key).cloned().unwrap_or_default()
    }

    /// Brings the master dataset up to the remote's latest version.
    pub async fn sync_master(&self) -> SyncResult<SyncOutcome> {
        self.run(SyncKey::Master).await
    }

    /// Brings one book up to the remote's latest release, downloading it
    /// first if there is no local copy.
    pub async fn sync_book(&self, book_id: i64) -> SyncResult<SyncOutcome> {
        self.run(SyncKey::Book(book_id)).await
    }

    async fn run(&self, key: SyncKey) -> SyncResult<SyncOutcome> {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;
        let _attempt = AttemptGuard {
            status: &self.status,
            key,
        };

        let result = match key {
            SyncKey::Master => self.run_master().await,
            SyncKey::Book(id) => self.run_book(id).await,
        };

        match &result {
            Ok(SyncOutcome::UpToDate { cursor }) => {
                tracing::info!(%key, %cursor, "already up to date");
                self.set_phase(key, SyncPhase::UpToDate);
                self.finish(key, None);
            }
            Ok(SyncOutcome::Updated { cursor, counts }) => {
                tracing::info!(%key, %cursor, ?counts, "sync applied");
                self.finish(key, None);
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "sync failed");
                self.set_phase(key, SyncPhase::Failed);
                self.finish(key, Some(e.to_string()));
            }
        }
        result
    }

    async fn run_master(&self) -> SyncResult<SyncOutcome> {
        let key = SyncKey::Master;
        let cursor = self.versions.get(&key);
        let version = match cursor {
            VersionCursor::Master { version } => version,
            VersionCursor::Book { .. } => 0,
        };

        self.set_phase(key, SyncPhase::Fetching);
        let (patch_url, next) = match self.source.master_patch(version).await? {
            MasterPatch::UpToDate => return Ok(SyncOutcome::UpToDate { cursor }),
            MasterPatch::Available { patch_url, version } => (patch_url, version),
        };

        let patch = match patch_url {
            Some(url) => self.fetch_tables(key, &url).await?,
            None => PatchTables::new(),
        };

        self.set_phase(key, SyncPhase::Merging);
        let base = self.snapshots.load_master()?;
        let merged = apply_patch(base, DatasetKind::Master, &patch, PatchMode::Delta);

        self.set_phase(key, SyncPhase::Persisting);
        self.snapshots.save_master(&merged)?;
        let next = cursor.advance(VersionCursor::Master { version: next });
        self.versions.set(&key, next)?;

        Ok(SyncOutcome::Updated {
            cursor: next,
            counts: merged.counts(),
        })
    }

    async fn run_book(&self, book_id: i64) -> SyncResult<SyncOutcome> {
        let key = SyncKey::Book(book_id);
        let cursor = self.versions.get(&key);
        let (major, minor) = match cursor {
            VersionCursor::Book { major, minor } => (major, minor),
            VersionCursor::Master { .. } => (0, 0),
        };

        self.set_phase(key, SyncPhase::Fetching);
        let (major_url, minor_url, next) = match self.source.book_patch(book_id, major, minor).await? {
            BookPatch::UpToDate => return Ok(SyncOutcome::UpToDate { cursor }),
            BookPatch::Available {
                major_release_url,
                minor_release_url,
                major,
                minor,
            } => (
                major_release_url,
                minor_release_url,
                VersionCursor::Book { major, minor },
            ),
        };

        // Both archives are fetched before anything is merged.
        let major_patch = match major_url {
            Some(url) => Some(self.fetch_tables(key, &url).await?),
            None => None,
        };
        let minor_patch = match minor_url {
            Some(url) => Some(self.fetch_tables(key, &url).await?),
            None => None,
        };

        self.set_phase(key, SyncPhase::Merging);
        let mut dataset = self
            .snapshots
            .load_book(book_id)?
            .unwrap_or_else(|| Dataset::empty(DatasetKind::Book));
        if let Some(patch) = &major_patch {
            dataset = apply_patch(dataset, DatasetKind::Book, patch, PatchMode::Replace);
        }
        if let Some(patch) = &minor_patch {
            dataset = apply_patch(dataset, DatasetKind::Book, patch, PatchMode::Delta);
        }

        self.set_phase(key, SyncPhase::Persisting);
        self.snapshots.save_book(book_id, &dataset)?;
        let next = cursor.advance(next);
        self.versions.set(&key, next)?;

        Ok(SyncOutcome::Updated {
            cursor: next,
            counts: dataset.counts(),
        })
    }

    async fn fetch_tables(&self, key: SyncKey, url: &str) -> SyncResult<PatchTables> {
        let archive = self.source.download(url).await?;
        self.set_phase(key, SyncPhase::Extracting);
        let tables = self.extractor.extract(&archive).await?.into_tables()?;
        Ok(tables)
    }

    async fn key_lock(&self, key: SyncKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key).or_default().clone()
    }

    fn set_phase(&self, key: SyncKey, phase: SyncPhase) {
        tracing::debug!(%key, ?phase, "sync phase");
        let mut status = lock_status(&self.status);
        let entry = status.entry(key).or_default();
        entry.phase = phase;
        entry.updated_at = Some(Utc::now());
    }

    /// Returns the key to idle, recording the error of a failed attempt.
    fn finish(&self, key: SyncKey, error: Option<String>) {
        let mut status = lock_status(&self.status);
        let entry = status.entry(key).or_default();
        entry.phase = SyncPhase::Idle;
        entry.last_error = error;
        entry.updated_at = Some(Utc::now());
    }
}

fn lock_status(
    status: &StdMutex<HashMap<SyncKey, SyncStatus>>,
) -> MutexGuard<'_, HashMap<SyncKey, SyncStatus>> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Returns the key to idle if the attempt is dropped before it finishes.
struct AttemptGuard<'a> {
    status: &'a StdMutex<HashMap<SyncKey, SyncStatus>>,
    key: SyncKey,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let mut status = lock_status(self.status);
        if let Some(entry) = status.get_mut(&self.key) {
            if entry.phase.is_active() {
                tracing::warn!(key = %self.key, phase = ?entry.phase, "sync abandoned");
                entry.phase = SyncPhase::Idle;
                entry.updated_at = Some(Utc::now());
            }
        }
    }
}
