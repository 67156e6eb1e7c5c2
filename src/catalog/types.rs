//! Types for the catalog store.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::identity::ContentIdentity;

/// Synchronization status of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Indexed but never successfully uploaded.
    Pending,
    /// Accepted by the remote service. Terminal for the synchronizer.
    Uploaded,
    /// Last attempt failed; picked up again by the next sync.
    Failed,
}

impl EntryStatus {
    /// Convert to the string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::Failed => "failed",
        }
    }

    /// Parse from the string stored in the database.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "uploaded" => Some(Self::Uploaded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One row per distinct content identity.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: i64,
    /// Location at indexing or reconciliation time. May be stale.
    pub path: PathBuf,
    pub identity: ContentIdentity,
    pub status: EntryStatus,
    /// Last transport response code.
    pub status_code: Option<u16>,
    /// Last failure message. Always `None` once uploaded.
    pub last_error: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Result of `mark_uploaded_by_path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathUpdate {
    /// At least one row with this path changed.
    Marked,
    /// A row matches but already records this upload.
    Unchanged,
    /// No row carries this path.
    Untracked,
}

/// Statistics for a single sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRunStats {
    pub entries_seen: u64,
    pub entries_uploaded: u64,
    pub entries_failed: u64,
    pub entries_skipped: u64,
    /// Whether the run stopped early on a shutdown signal.
    pub interrupted: bool,
}

/// Summary of the current catalog state.
#[derive(Debug, Clone)]
pub struct CatalogSummary {
    pub total_entries: u64,
    pub uploaded: u64,
    pub pending: u64,
    pub failed: u64,
    pub last_sync_started: Option<DateTime<Utc>>,
    pub last_sync_completed: Option<DateTime<Utc>>,
    pub last_sync_interrupted: bool,
}
