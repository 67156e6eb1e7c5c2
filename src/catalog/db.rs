//! Catalog trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::error::CatalogError;
use super::schema;
use super::types::{
    CatalogEntry, CatalogSummary, EntryStatus, PathUpdate, SyncRunStats,
};
use crate::identity::ContentIdentity;

const ENTRY_COLUMNS: &str =
    "id, path, hash, size, status, status_code, last_error, uploaded_at, updated_at";

/// Persistent table of known files and their synchronization status.
///
/// Every mutation is a single-row (or single-statement) update; callers never
/// need a cross-row transaction because the unit of work is one entry.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Register content as pending. No-op when the identity is already known.
    ///
    /// Returns true if a row was inserted.
    async fn upsert_pending(
        &self,
        path: &Path,
        identity: &ContentIdentity,
    ) -> Result<bool, CatalogError>;

    /// Register content directly as uploaded (reconciliation backfill).
    /// No-op when the identity is already known.
    async fn upsert_uploaded(
        &self,
        path: &Path,
        identity: &ContentIdentity,
        status_code: Option<u16>,
    ) -> Result<bool, CatalogError>;

    /// Record a successful upload for an entry.
    async fn mark_uploaded(&self, id: i64, status_code: u16) -> Result<(), CatalogError>;

    /// Record a failed attempt. Entries already uploaded are left alone.
    async fn mark_failed(
        &self,
        id: i64,
        status_code: Option<u16>,
        error: &str,
    ) -> Result<(), CatalogError>;

    /// Mark every entry stored under `path` as uploaded, whatever its identity.
    ///
    /// A `None` status code keeps whatever code is already stored.
    async fn mark_uploaded_by_path(
        &self,
        path: &Path,
        status_code: Option<u16>,
    ) -> Result<PathUpdate, CatalogError>;

    /// Entries not yet uploaded: failed first, then pending, each by id.
    async fn select_unsynchronized(&self) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Look up the entry owning a content identity.
    async fn find_by_identity(
        &self,
        identity: &ContentIdentity,
    ) -> Result<Option<CatalogEntry>, CatalogError>;

    /// All entries currently marked failed.
    async fn failed_entries(&self) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Counts per status plus the most recent sync run.
    async fn summary(&self) -> Result<CatalogSummary, CatalogError>;

    /// Start a new sync run and return its ID.
    async fn start_sync_run(&self) -> Result<i64, CatalogError>;

    /// Complete a sync run with statistics.
    async fn complete_sync_run(
        &self,
        run_id: i64,
        stats: &SyncRunStats,
    ) -> Result<(), CatalogError>;
}

/// SQLite implementation of the catalog.
pub struct SqliteCatalog {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCatalog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteCatalog {
    /// Open or create a catalog at the given path.
    ///
    /// The connection is closed when the catalog is dropped.
    pub async fn open(path: &Path) -> Result<Self, CatalogError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone).map_err(|e| CatalogError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(CatalogError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(CatalogError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, CatalogError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory catalog (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory().map_err(|e| CatalogError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetch a single entry by id (for testing).
    #[cfg(test)]
    pub fn entry(&self, id: i64) -> Result<Option<CatalogEntry>, CatalogError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
            [id],
            row_to_entry,
        )
        .optional()
        .map_err(CatalogError::query)
    }

    /// Fetch every entry ordered by id (for testing).
    #[cfg(test)]
    pub fn all_entries(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {ENTRY_COLUMNS} FROM entries ORDER BY id"))
            .map_err(CatalogError::query)?;
        let entries = stmt
            .query_map([], row_to_entry)
            .map_err(CatalogError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(CatalogError::query)?;
        Ok(entries)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn
            .lock()
            .map_err(|e| CatalogError::Query(e.to_string()))
    }

    fn query_entries(
        &self,
        sql: &str,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(sql).map_err(CatalogError::query)?;
        let entries = stmt
            .query_map([], row_to_entry)
            .map_err(CatalogError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(CatalogError::query)?;
        Ok(entries)
    }

    fn count_where(conn: &Connection, status: EntryStatus) -> Result<u64, CatalogError> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entries WHERE status = ?1",
                [status.as_str()],
                |row| row.get(0),
            )
            .map_err(CatalogError::query)?;
        Ok(count as u64)
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn upsert_pending(
        &self,
        path: &Path,
        identity: &ContentIdentity,
    ) -> Result<bool, CatalogError> {
        let now = Utc::now().timestamp();
        let conn = self.conn()?;

        let changed = conn
            .execute(
                r#"
                INSERT INTO entries (path, hash, size, status, updated_at)
                VALUES (?1, ?2, ?3, 'pending', ?4)
                ON CONFLICT(hash, size) DO NOTHING
                "#,
                rusqlite::params![
                    path.to_string_lossy(),
                    &identity.digest,
                    identity.size as i64,
                    now,
                ],
            )
            .map_err(CatalogError::query)?;

        Ok(changed > 0)
    }

    async fn upsert_uploaded(
        &self,
        path: &Path,
        identity: &ContentIdentity,
        status_code: Option<u16>,
    ) -> Result<bool, CatalogError> {
        let now = Utc::now().timestamp();
        let conn = self.conn()?;

        let changed = conn
            .execute(
                r#"
                INSERT INTO entries (path, hash, size, status, status_code, uploaded_at, updated_at)
                VALUES (?1, ?2, ?3, 'uploaded', ?4, ?5, ?5)
                ON CONFLICT(hash, size) DO NOTHING
                "#,
                rusqlite::params![
                    path.to_string_lossy(),
                    &identity.digest,
                    identity.size as i64,
                    status_code,
                    now,
                ],
            )
            .map_err(CatalogError::query)?;

        Ok(changed > 0)
    }

    async fn mark_uploaded(&self, id: i64, status_code: u16) -> Result<(), CatalogError> {
        let now = Utc::now().timestamp();
        let conn = self.conn()?;

        conn.execute(
            "UPDATE entries SET status = 'uploaded', status_code = ?1, uploaded_at = ?2, last_error = NULL, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status_code, now, id],
        )
        .map_err(CatalogError::query)?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        id: i64,
        status_code: Option<u16>,
        error: &str,
    ) -> Result<(), CatalogError> {
        let now = Utc::now().timestamp();
        let conn = self.conn()?;

        let changed = conn
            .execute(
                "UPDATE entries SET status = 'failed', status_code = ?1, last_error = ?2, updated_at = ?3 WHERE id = ?4 AND status != 'uploaded'",
                rusqlite::params![status_code, error, now, id],
            )
            .map_err(CatalogError::query)?;

        if changed == 0 {
            tracing::debug!(id, "Entry already uploaded, failure not recorded");
        }
        Ok(())
    }

    async fn mark_uploaded_by_path(
        &self,
        path: &Path,
        status_code: Option<u16>,
    ) -> Result<PathUpdate, CatalogError> {
        let now = Utc::now().timestamp();
        let path_str = path.to_string_lossy().into_owned();
        let conn = self.conn()?;

        // Rows that already record this exact upload are left untouched so a
        // repeated reconciliation writes nothing.
        let changed = conn
            .execute(
                r#"
                UPDATE entries SET
                    status = 'uploaded',
                    status_code = COALESCE(?1, status_code),
                    uploaded_at = CASE
                        WHEN status = 'uploaded' AND uploaded_at IS NOT NULL THEN uploaded_at
                        ELSE ?2
                    END,
                    last_error = NULL,
                    updated_at = ?2
                WHERE path = ?3
                  AND (
                    status IS NULL
                    OR status != 'uploaded'
                    OR last_error IS NOT NULL
                    OR (?1 IS NOT NULL AND (status_code IS NULL OR status_code != ?1))
                  )
                "#,
                rusqlite::params![status_code, now, &path_str],
            )
            .map_err(CatalogError::query)?;

        if changed > 0 {
            return Ok(PathUpdate::Marked);
        }

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM entries WHERE path = ?1)",
                [&path_str],
                |row| row.get(0),
            )
            .map_err(CatalogError::query)?;

        Ok(if exists {
            PathUpdate::Unchanged
        } else {
            PathUpdate::Untracked
        })
    }

    async fn select_unsynchronized(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.query_entries(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries \
             WHERE status IS NULL OR status != 'uploaded' \
             ORDER BY CASE WHEN status = 'failed' THEN 0 ELSE 1 END, id"
        ))
    }

    async fn find_by_identity(
        &self,
        identity: &ContentIdentity,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE hash = ?1 AND size = ?2"),
            rusqlite::params![&identity.digest, identity.size as i64],
            row_to_entry,
        )
        .optional()
        .map_err(CatalogError::query)
    }

    async fn failed_entries(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.query_entries(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE status = 'failed' ORDER BY id"
        ))
    }

    async fn summary(&self) -> Result<CatalogSummary, CatalogError> {
        let conn = self.conn()?;

        let total_entries: u64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(CatalogError::query)? as u64;
        let uploaded = Self::count_where(&conn, EntryStatus::Uploaded)?;
        let pending = Self::count_where(&conn, EntryStatus::Pending)?;
        let failed = Self::count_where(&conn, EntryStatus::Failed)?;

        let last_sync: Option<(i64, Option<i64>, bool)> = conn
            .query_row(
                "SELECT started_at, completed_at, interrupted FROM sync_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? != 0)),
            )
            .optional()
            .map_err(CatalogError::query)?;

        let (last_sync_started, last_sync_completed, last_sync_interrupted) = match last_sync {
            Some((started, completed, interrupted)) => (
                Utc.timestamp_opt(started, 0).single(),
                completed.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                interrupted,
            ),
            None => (None, None, false),
        };

        Ok(CatalogSummary {
            total_entries,
            uploaded,
            pending,
            failed,
            last_sync_started,
            last_sync_completed,
            last_sync_interrupted,
        })
    }

    async fn start_sync_run(&self) -> Result<i64, CatalogError> {
        let started_at = Utc::now().timestamp();
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO sync_runs (started_at) VALUES (?1)",
            [started_at],
        )
        .map_err(CatalogError::query)?;

        Ok(conn.last_insert_rowid())
    }

    async fn complete_sync_run(
        &self,
        run_id: i64,
        stats: &SyncRunStats,
    ) -> Result<(), CatalogError> {
        let completed_at = Utc::now().timestamp();
        let conn = self.conn()?;

        conn.execute(
            "UPDATE sync_runs SET completed_at = ?1, entries_seen = ?2, entries_uploaded = ?3, entries_failed = ?4, entries_skipped = ?5, interrupted = ?6 WHERE id = ?7",
            rusqlite::params![
                completed_at,
                stats.entries_seen as i64,
                stats.entries_uploaded as i64,
                stats.entries_failed as i64,
                stats.entries_skipped as i64,
                stats.interrupted as i64,
                run_id
            ],
        )
        .map_err(CatalogError::query)?;

        Ok(())
    }
}

fn timestamp(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Convert a database row to a CatalogEntry.
fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogEntry> {
    let path: String = row.get(1)?;
    let digest: String = row.get(2)?;
    let size: i64 = row.get(3)?;
    let status: Option<String> = row.get(4)?;
    let status_code: Option<i64> = row.get(5)?;
    let uploaded_at: Option<i64> = row.get(7)?;
    let updated_at: i64 = row.get(8)?;

    Ok(CatalogEntry {
        id: row.get(0)?,
        path: PathBuf::from(path),
        identity: ContentIdentity::new(digest, size as u64),
        status: status
            .as_deref()
            .and_then(EntryStatus::from_str)
            .unwrap_or(EntryStatus::Pending),
        status_code: status_code.and_then(|c| u16::try_from(c).ok()),
        last_error: row.get(6)?,
        uploaded_at: uploaded_at.map(timestamp),
        updated_at: timestamp(updated_at),
    })
}
