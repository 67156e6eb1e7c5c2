//! Log reconciler: replay a previous run's output into the catalog.
//!
//! Files the log reports as uploaded are marked uploaded by path. Files the
//! catalog has never seen are hashed and backfilled as uploaded, so the next
//! sync does not send them again.

pub mod parser;

use std::path::Path;

use anyhow::Context;

use crate::catalog::{Catalog, PathUpdate};
use crate::identity::identify_file;
use crate::progress::Progress;

pub use parser::{parse_log, LogRecord};

/// Individual missing-file warnings before the rest are summarized.
const MAX_MISSING_WARNINGS: u64 = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Distinct paths found in the log.
    pub parsed: u64,
    pub marked: u64,
    pub unchanged: u64,
    pub inserted: u64,
    /// Backfills whose content is already cataloged under another path.
    pub duplicates: u64,
    pub missing: u64,
    /// Files present on disk that could not be hashed.
    pub unreadable: u64,
}

/// Read and parse a log file, resolving relative paths against the current
/// directory.
pub async fn read_log(log_path: &Path) -> anyhow::Result<Vec<LogRecord>> {
    let metadata = tokio::fs::metadata(log_path)
        .await
        .with_context(|| format!("Log file not found: {}", log_path.display()))?;
    if !metadata.is_file() {
        anyhow::bail!("Log path is not a file: {}", log_path.display());
    }
    let bytes = tokio::fs::read(log_path)
        .await
        .with_context(|| format!("Failed to read {}", log_path.display()))?;
    let base = std::env::current_dir().context("Cannot determine current directory")?;
    Ok(parse_log(&String::from_utf8_lossy(&bytes), &base))
}

/// Apply parsed log records to the catalog.
pub async fn reconcile(
    catalog: &dyn Catalog,
    records: &[LogRecord],
    progress: &Progress,
) -> anyhow::Result<ReconcileSummary> {
    let mut summary = ReconcileSummary {
        parsed: records.len() as u64,
        ..ReconcileSummary::default()
    };
    tracing::info!(paths = summary.parsed, "Reconciling log records");

    for (i, record) in records.iter().enumerate() {
        progress.update(i as u64 + 1, summary.parsed);

        match catalog
            .mark_uploaded_by_path(&record.path, record.status_code)
            .await?
        {
            PathUpdate::Marked => {
                summary.marked += 1;
                continue;
            }
            PathUpdate::Unchanged => {
                summary.unchanged += 1;
                continue;
            }
            PathUpdate::Untracked => {}
        }

        if !tokio::fs::try_exists(&record.path).await.unwrap_or(false) {
            summary.missing += 1;
            if summary.missing <= MAX_MISSING_WARNINGS {
                progress.suspend(|| {
                    tracing::warn!(path = %record.path.display(), "Logged file no longer exists");
                });
            } else if summary.missing == MAX_MISSING_WARNINGS + 1 {
                progress.suspend(|| {
                    tracing::warn!("Further missing files will not be reported individually");
                });
            }
            continue;
        }

        let identity = match identify_file(&record.path).await {
            Ok(identity) => identity,
            Err(e) => {
                summary.unreadable += 1;
                progress.suspend(|| {
                    tracing::warn!(path = %record.path.display(), error = %e, "Cannot hash logged file");
                });
                continue;
            }
        };

        if catalog
            .upsert_uploaded(&record.path, &identity, record.status_code)
            .await?
        {
            summary.inserted += 1;
        } else {
            summary.duplicates += 1;
            progress.suspend(|| {
                tracing::debug!(
                    path = %record.path.display(),
                    "Content already cataloged under another path"
                );
            });
        }
    }

    progress.finish();
    Ok(summary)
}
