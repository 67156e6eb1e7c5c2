//! Indexer: walk a directory tree and register every media file as pending.

use std::path::Path;

use anyhow::Context;

use crate::catalog::Catalog;
use crate::identity::identify_file;
use crate::media::{collect_media_files, normalize_path};
use crate::progress::Progress;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Media files found under the root.
    pub found: u64,
    /// New catalog entries.
    pub inserted: u64,
    /// Files whose content the catalog already knew.
    pub known: u64,
    /// Subset of `known` stored under a different path.
    pub duplicates: u64,
}

/// Index every media file under `root`, resolved against the current
/// directory.
///
/// Any walk or read error aborts the run; entries inserted before the error
/// stay in the catalog and a rerun picks up where it stopped.
pub async fn run_index(
    catalog: &dyn Catalog,
    root: &Path,
    progress: &Progress,
) -> anyhow::Result<IndexSummary> {
    let cwd = std::env::current_dir().context("Cannot determine current directory")?;
    index_from(catalog, root, &cwd, progress).await
}

/// Stored paths are absolute so `sync` and `reconcile` can run from any
/// directory and match what the log parser resolves.
async fn index_from(
    catalog: &dyn Catalog,
    root: &Path,
    cwd: &Path,
    progress: &Progress,
) -> anyhow::Result<IndexSummary> {
    let resolved = normalize_path(root, cwd);
    let root = resolved.as_path();
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    let walk_root = root.to_path_buf();
    let files = tokio::task::spawn_blocking(move || collect_media_files(&walk_root))
        .await?
        .with_context(|| format!("Failed to walk {}", root.display()))?;

    let mut summary = IndexSummary {
        found: files.len() as u64,
        ..IndexSummary::default()
    };
    tracing::info!(root = %root.display(), files = summary.found, "Indexing media files");

    for (i, path) in files.iter().enumerate() {
        progress.update(i as u64 + 1, summary.found);

        let identity = identify_file(path)
            .await
            .with_context(|| format!("Failed to hash {}", path.display()))?;

        if catalog.upsert_pending(path, &identity).await? {
            summary.inserted += 1;
            continue;
        }

        summary.known += 1;
        if let Some(existing) = catalog.find_by_identity(&identity).await? {
            if existing.path != *path {
                summary.duplicates += 1;
                progress.suspend(|| {
                    tracing::debug!(
                        path = %path.display(),
                        original = %existing.path.display(),
                        "Same content already cataloged"
                    );
                });
            }
        }
    }

    progress.finish();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntryStatus, SqliteCatalog};
    use std::fs;

    #[tokio::test]
    async fn test_index_inserts_pending_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"alpha").unwrap();
        fs::write(dir.path().join("b.MOV"), b"bravo").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let db = SqliteCatalog::open_in_memory().unwrap();
        let summary = run_index(&db, dir.path(), &Progress::silent("index"))
            .await
            .unwrap();

        assert_eq!(summary.found, 2);
        assert_eq!(summary.inserted, 2);
        let entries = db.all_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.status == EntryStatus::Pending));
    }

    #[tokio::test]
    async fn test_index_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"alpha").unwrap();

        let db = SqliteCatalog::open_in_memory().unwrap();
        run_index(&db, dir.path(), &Progress::silent("index"))
            .await
            .unwrap();
        let second = run_index(&db, dir.path(), &Progress::silent("index"))
            .await
            .unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.known, 1);
        assert_eq!(second.duplicates, 0);
        assert_eq!(db.all_entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_identical_content_collapses() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("copy")).unwrap();
        fs::write(dir.path().join("a.jpg"), b"same bytes").unwrap();
        fs::write(dir.path().join("copy").join("a.jpg"), b"same bytes").unwrap();

        let db = SqliteCatalog::open_in_memory().unwrap();
        let summary = run_index(&db, dir.path(), &Progress::silent("index"))
            .await
            .unwrap();

        assert_eq!(summary.found, 2);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(db.all_entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteCatalog::open_in_memory().unwrap();
        let result = run_index(&db, &dir.path().join("absent"), &Progress::silent("index")).await;
        assert!(result.is_err());
        assert!(db.all_entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relative_root_stores_absolute_paths() {
        use crate::reconcile::{parse_log, reconcile};

        let cwd = tempfile::tempdir().unwrap();
        fs::create_dir_all(cwd.path().join("photos")).unwrap();
        fs::write(cwd.path().join("photos").join("a.jpg"), b"alpha").unwrap();

        let db = SqliteCatalog::open_in_memory().unwrap();
        index_from(&db, Path::new("photos"), cwd.path(), &Progress::silent("index"))
            .await
            .unwrap();

        let entries = db.all_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].path.is_absolute());
        assert_eq!(entries[0].path, cwd.path().join("photos").join("a.jpg"));

        // Log path written relative to the directory the index ran in.
        let records = parse_log("Uploaded: photos/a.jpg -> 201  : 1/1", cwd.path());
        let summary = reconcile(&db, &records, &Progress::silent("reconcile"))
            .await
            .unwrap();
        assert_eq!(summary.marked, 1);
        assert_eq!(summary.duplicates, 0);

        let entry = &db.all_entries().unwrap()[0];
        assert_eq!(entry.status, EntryStatus::Uploaded);
        assert_eq!(entry.status_code, Some(201));
    }

    #[tokio::test]
    async fn test_dot_segments_in_root_are_normalized() {
        let cwd = tempfile::tempdir().unwrap();
        fs::create_dir_all(cwd.path().join("photos")).unwrap();
        fs::write(cwd.path().join("photos").join("a.jpg"), b"alpha").unwrap();

        let db = SqliteCatalog::open_in_memory().unwrap();
        index_from(
            &db,
            Path::new("./photos/../photos"),
            cwd.path(),
            &Progress::silent("index"),
        )
        .await
        .unwrap();

        assert_eq!(
            db.all_entries().unwrap()[0].path,
            cwd.path().join("photos").join("a.jpg")
        );
    }

    #[tokio::test]
    async fn test_file_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        fs::write(&file, b"alpha").unwrap();
        let db = SqliteCatalog::open_in_memory().unwrap();
        assert!(run_index(&db, &file, &Progress::silent("index")).await.is_err());
    }
}
