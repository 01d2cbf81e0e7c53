//! Incremental synchronization with the remote patch API.
//!
//! [`SyncOrchestrator`] drives one sync per key: read the cursor, ask the
//! [`PatchSource`] for updates, extract and merge the patch archives, then
//! persist the snapshot followed by the new cursor.

mod error;
mod orchestrator;
mod remote;

pub use error::{SyncError, SyncResult};
pub use orchestrator::{SyncOrchestrator, SyncOutcome, SyncPhase, SyncStatus};
pub use remote::{BookPatch, HttpPatchSource, MasterPatch, PatchSource, RemoteError};
