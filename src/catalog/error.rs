//! Error types for the catalog store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during catalog operations.
///
/// Every variant is fatal to the running command.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Failed to open or create the database file.
    #[error("Failed to open catalog at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Failed to run a schema migration.
    #[error("Catalog migration failed: {0}")]
    Migration(#[from] rusqlite::Error),

    /// A query failed.
    #[error("Catalog query failed: {0}")]
    Query(String),

    /// Failed to spawn a blocking task.
    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    /// The database schema version is newer than supported.
    #[error("Catalog schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },
}

impl CatalogError {
    /// Create a Query error from a rusqlite error.
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }
}
