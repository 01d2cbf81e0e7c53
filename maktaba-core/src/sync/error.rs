//! Error types for sync operations.

use crate::extract::ExtractionError;
use crate::outline::OutlineError;
use crate::storage::StorageError;

use super::remote::RemoteError;

/// Why a sync attempt failed. None of these are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The patch API was unreachable or answered with an error.
    #[error("network error: {0}")]
    Network(#[from] RemoteError),

    /// A patch archive or one of its tables could not be read.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// The title graph of a book is not a tree.
    #[error("malformed outline: {0}")]
    MalformedOutline(#[from] OutlineError),

    /// A snapshot or cursor could not be read or written.
    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
