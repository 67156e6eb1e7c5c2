//! Synchronizer: push unsynchronized catalog entries to the remote service.
//!
//! The run works from a snapshot taken at start. Failures go to the back of
//! the queue until the retry policy gives up on them; transport and
//! filesystem problems are recorded on the entry and never abort the run.
//! Only catalog errors do.

pub mod queue;

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::catalog::{Catalog, CatalogEntry, CatalogError, SyncRunStats};
use crate::media::is_video_file;
use crate::progress::Progress;
use crate::upload::Uploader;

pub use queue::{Disposition, RetryPolicy, WorkQueue};

/// Message stored on entries whose file disappeared since indexing.
pub const FILE_NOT_FOUND: &str = "File not found";

#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Leave video files pending instead of uploading them.
    pub exclude_videos: bool,
    /// Suppress the per-file `Uploaded:` record line.
    pub quiet_success: bool,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Entries in the snapshot.
    pub seen: u64,
    pub uploaded: u64,
    /// Entries that ran out of retries.
    pub failed: u64,
    pub skipped_video: u64,
    pub interrupted: bool,
}

impl SyncSummary {
    fn to_run_stats(&self) -> SyncRunStats {
        SyncRunStats {
            entries_seen: self.seen,
            entries_uploaded: self.uploaded,
            entries_failed: self.failed,
            entries_skipped: self.skipped_video,
            interrupted: self.interrupted,
        }
    }
}

/// Outcome of one attempt at one entry.
enum Attempt {
    Uploaded,
    Failed { code: Option<u16>, message: String },
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn attempt(
    catalog: &dyn Catalog,
    uploader: &dyn Uploader,
    entry: &CatalogEntry,
    config: &SyncConfig,
    progress: &Progress,
    position: (u64, u64),
) -> Result<Attempt, CatalogError> {
    if !file_exists(&entry.path).await {
        catalog.mark_failed(entry.id, None, FILE_NOT_FOUND).await?;
        return Ok(Attempt::Failed {
            code: None,
            message: FILE_NOT_FOUND.to_string(),
        });
    }

    match uploader.upload(&entry.path, &entry.identity).await {
        Ok(receipt) => {
            catalog.mark_uploaded(entry.id, receipt.status_code).await?;
            if receipt.duplicate {
                tracing::debug!(
                    path = %entry.path.display(),
                    "Server already had this asset"
                );
            }
            if !config.quiet_success {
                progress.record(&format!(
                    "Uploaded: {} -> {}  : {}/{}",
                    entry.path.display(),
                    receipt.status_code,
                    position.0,
                    position.1
                ));
            }
            Ok(Attempt::Uploaded)
        }
        Err(e) => {
            let code = e.status_code();
            let message = e.to_string();
            catalog.mark_failed(entry.id, code, &message).await?;
            Ok(Attempt::Failed { code, message })
        }
    }
}

/// Upload everything the catalog has not yet synchronized.
///
/// Each entry is attempted at most `retry.max_retries + 1` times. Once
/// `shutdown` is cancelled no further entries are started.
pub async fn run_sync(
    catalog: &dyn Catalog,
    uploader: &dyn Uploader,
    config: &SyncConfig,
    progress: &Progress,
    shutdown: &CancellationToken,
) -> Result<SyncSummary, CatalogError> {
    let snapshot = catalog.select_unsynchronized().await?;
    let run_id = catalog.start_sync_run().await?;

    let mut summary = SyncSummary {
        seen: snapshot.len() as u64,
        ..SyncSummary::default()
    };
    tracing::info!(entries = summary.seen, "Starting sync");

    let mut queue = WorkQueue::new(snapshot, config.retry);
    let mut count: u64 = 0;

    while let Some(entry) = queue.pop() {
        if shutdown.is_cancelled() {
            summary.interrupted = true;
            break;
        }

        count += 1;
        let total = count + queue.len() as u64;
        progress.update(count, total);

        if config.exclude_videos && is_video_file(&entry.path) {
            summary.skipped_video += 1;
            progress.record(&format!(
                "Skipping video file (exclude-videos): {}  : {}/{}",
                entry.path.display(),
                count,
                total
            ));
            continue;
        }

        progress.set_message(
            entry
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        match attempt(catalog, uploader, &entry, config, progress, (count, total)).await? {
            Attempt::Uploaded => summary.uploaded += 1,
            Attempt::Failed { code, message } => {
                let path = entry.path.clone();
                match queue.fail(entry) {
                    Disposition::Requeued { retry, max } => progress.suspend(|| {
                        tracing::warn!(
                            path = %path.display(),
                            status_code = ?code,
                            "Upload failed, retry {}/{} queued: {}",
                            retry,
                            max,
                            message
                        );
                    }),
                    Disposition::Exhausted => {
                        summary.failed += 1;
                        progress.suspend(|| {
                            tracing::error!(
                                path = %path.display(),
                                status_code = ?code,
                                "Giving up after {} retries: {}",
                                config.retry.max_retries,
                                message
                            );
                        });
                    }
                }
            }
        }
    }

    progress.finish();
    catalog
        .complete_sync_run(run_id, &summary.to_run_stats())
        .await?;

    if summary.interrupted {
        tracing::warn!("Sync interrupted before the queue was drained");
    }
    Ok(summary)
}
