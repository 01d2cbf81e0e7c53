//! Sync keys and the version cursors tracked for them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one independently versioned dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SyncKey {
    Master,
    Book(i64),
}

impl SyncKey {
    /// Parses the `master` / `book_<id>` form.
    pub fn parse(s: &str) -> Option<Self> {
        if s == "master" {
            return Some(SyncKey::Master);
        }
        s.strip_prefix("book_")
            .and_then(|id| id.parse().ok())
            .map(SyncKey::Book)
    }

    /// The cursor a key starts from before anything was applied.
    pub fn zero_cursor(&self) -> VersionCursor {
        match self {
            SyncKey::Master => VersionCursor::Master { version: 0 },
            SyncKey::Book(_) => VersionCursor::Book { major: 0, minor: 0 },
        }
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncKey::Master => write!(f, "master"),
            SyncKey::Book(id) => write!(f, "book_{}", id),
        }
    }
}

/// Last applied remote version of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionCursor {
    Master { version: u64 },
    Book { major: u64, minor: u64 },
}

impl VersionCursor {
    /// Returns the later of `self` and `next`.
    ///
    /// Cursors never move backwards; a remote that reports an older version
    /// than the one already applied leaves the cursor where it is.
    pub fn advance(self, next: VersionCursor) -> VersionCursor {
        let ahead = match (self, next) {
            (VersionCursor::Master { version: a }, VersionCursor::Master { version: b }) => b >= a,
            (
                VersionCursor::Book { major: a, minor: b },
                VersionCursor::Book { major: c, minor: d },
            ) => (c, d) >= (a, b),
            _ => true,
        };
        if ahead {
            next
        } else {
            tracing::warn!(current = %self, reported = %next, "remote reported an older version");
            self
        }
    }
}

impl fmt::Display for VersionCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionCursor::Master { version } => write!(f, "v{}", version),
            VersionCursor::Book { major, minor } => write!(f, "{}.{}", major, minor),
        }
    }
}
