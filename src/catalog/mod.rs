//! Catalog store: persistent inventory of media files and their upload state.
//!
//! Backed by SQLite. One row per distinct content identity; the unique index
//! on `(hash, size)` is what collapses duplicate files into a single entry.
//! Status transitions are single-statement updates so an interrupted run
//! never leaves a half-written row behind.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{Catalog, SqliteCatalog};
pub use error::CatalogError;
pub use types::{CatalogEntry, CatalogSummary, EntryStatus, PathUpdate, SyncRunStats};
