//! immich-catalog: local media catalog synchronized with an Immich server.
//!
//! Files are indexed by content (XXH64 digest plus size) into a SQLite
//! catalog, uploaded with a bounded per-run retry queue, and can be marked
//! uploaded after the fact by replaying an earlier run's output.

#![warn(clippy::all)]

mod catalog;
mod cli;
mod config;
mod identity;
mod index;
mod media;
mod progress;
mod reconcile;
mod shutdown;
mod sync;
mod types;
mod upload;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use catalog::{Catalog, SqliteCatalog};
use cli::Command;
use config::{expand_tilde, ImmichConfig};
use progress::{format_duration, Progress};
use sync::SyncConfig;
use upload::ImmichUploader;

async fn open_catalog(path: &Path) -> anyhow::Result<SqliteCatalog> {
    let db = SqliteCatalog::open(path).await?;
    tracing::debug!(path = %db.path().display(), "Opened catalog");
    Ok(db)
}

async fn run_index(args: cli::IndexArgs, no_progress_bar: bool) -> anyhow::Result<()> {
    let root = expand_tilde(&args.root.to_string_lossy());
    let db = open_catalog(&expand_tilde(&args.db.db)).await?;

    let progress = Progress::new("index", no_progress_bar);
    let summary = index::run_index(&db, &root, &progress).await?;

    println!(
        "Indexed {} files: {} new, {} already known ({} duplicate content) in {}",
        summary.found,
        summary.inserted,
        summary.known,
        summary.duplicates,
        format_duration(progress.elapsed())
    );
    Ok(())
}

async fn run_sync(args: cli::SyncArgs, no_progress_bar: bool) -> anyhow::Result<()> {
    let immich = ImmichConfig::from_env(std::time::Duration::from_secs(args.timeout))?;
    let uploader = ImmichUploader::new(&immich.base_url, &immich.api_key, immich.timeout)?;
    let config = SyncConfig::from_args(&args);
    tracing::debug!(?immich, ?config, "Sync settings");

    let db = open_catalog(&expand_tilde(&args.db.db)).await?;
    let shutdown = shutdown::install_signal_handler();

    let progress = Progress::new("sync", no_progress_bar);
    let summary = sync::run_sync(&db, &uploader, &config, &progress, &shutdown).await?;

    eprintln!(
        "Sync finished in {}: {} uploaded, {} failed, {} videos skipped",
        format_duration(progress.elapsed()),
        summary.uploaded,
        summary.failed,
        summary.skipped_video
    );
    if summary.interrupted {
        eprintln!("Interrupted: remaining entries stay queued for the next run");
    }
    Ok(())
}

async fn run_reconcile(args: cli::ReconcileArgs, no_progress_bar: bool) -> anyhow::Result<()> {
    let records = reconcile::read_log(&args.log).await?;
    let db = open_catalog(&expand_tilde(&args.db.db)).await?;

    let progress = Progress::new("reconcile", no_progress_bar);
    let summary = reconcile::reconcile(&db, &records, &progress).await?;

    println!("Reconciled {}", args.log.display());
    println!("  Parsed:     {}", summary.parsed);
    println!("  Marked:     {}", summary.marked);
    println!("  Unchanged:  {}", summary.unchanged);
    println!("  Inserted:   {}", summary.inserted);
    println!("  Duplicates: {}", summary.duplicates);
    println!("  Missing:    {}", summary.missing);
    if summary.unreadable > 0 {
        println!("  Unreadable: {}", summary.unreadable);
    }
    Ok(())
}

async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let db_path: PathBuf = expand_tilde(&args.db.db);
    if !db_path.exists() {
        println!("No catalog found at {}", db_path.display());
        println!("Run `immich-catalog index <ROOT>` first.");
        return Ok(());
    }

    let db = open_catalog(&db_path).await?;
    let summary = db.summary().await?;

    println!("Catalog: {}", db_path.display());
    println!();
    println!("Entries:");
    println!("  Total:    {}", summary.total_entries);
    println!("  Uploaded: {}", summary.uploaded);
    println!("  Pending:  {}", summary.pending);
    println!("  Failed:   {}", summary.failed);

    if let Some(started) = &summary.last_sync_started {
        println!();
        println!(
            "Last sync started:   {}",
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
        match &summary.last_sync_completed {
            Some(completed) => println!(
                "Last sync completed: {}{}",
                completed.format("%Y-%m-%d %H:%M:%S UTC"),
                if summary.last_sync_interrupted {
                    " (interrupted)"
                } else {
                    ""
                }
            ),
            None => println!("Last sync completed: never (aborted)"),
        }
    }

    if args.failed && summary.failed > 0 {
        println!();
        println!("Failed entries:");
        for entry in db.failed_entries().await.context("Failed to list failures")? {
            let code = entry
                .status_code
                .map(|c| format!(" [{c}]"))
                .unwrap_or_default();
            println!(
                "  {}{} - {}",
                entry.path.display(),
                code,
                entry.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Index(args) => run_index(args, cli.no_progress_bar).await,
        Command::Sync(args) => run_sync(args, cli.no_progress_bar).await,
        Command::Reconcile(args) => run_reconcile(args, cli.no_progress_bar).await,
        Command::Status(args) => run_status(args).await,
    }
}
