use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

/// Default catalog location, relative to the working directory.
pub const DEFAULT_DB: &str = "immich_catalog.db";

#[derive(Parser, Debug)]
#[command(
    name = "immich-catalog",
    about = "Index local media and keep an Immich server in sync"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Disable progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk a directory and record every media file as pending
    Index(IndexArgs),
    /// Upload pending and failed entries
    Sync(SyncArgs),
    /// Mark files from a previous run's output as uploaded
    Reconcile(ReconcileArgs),
    /// Show catalog counts and the last sync run
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DbArgs {
    /// Catalog database path
    #[arg(long, env = "IMMICH_CATALOG_DB", default_value = DEFAULT_DB)]
    pub db: String,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Directory to scan recursively
    pub root: PathBuf,

    #[command(flatten)]
    pub db: DbArgs,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Leave videos pending
    #[arg(long)]
    pub exclude_videos: bool,

    /// Don't print a line per uploaded file
    #[arg(long)]
    pub quiet_success: bool,

    /// Retries per file within one run
    #[arg(long, default_value_t = 5)]
    pub max_retries: u32,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,
}

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Output captured from an earlier sync
    pub log: PathBuf,

    #[command(flatten)]
    pub db: DbArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// List failed entries
    #[arg(long)]
    pub failed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("immich-catalog").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_sync_defaults() {
        let cli = parse(&["sync"]);
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(!cli.no_progress_bar);
        match cli.command {
            Command::Sync(args) => {
                assert_eq!(args.db.db, DEFAULT_DB);
                assert_eq!(args.max_retries, 5);
                assert_eq!(args.timeout, 300);
                assert!(!args.exclude_videos);
                assert!(!args.quiet_success);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_sync_flags() {
        let cli = parse(&[
            "sync",
            "--db",
            "/tmp/c.db",
            "--exclude-videos",
            "--quiet-success",
            "--max-retries",
            "0",
            "--timeout",
            "30",
        ]);
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.db.db, "/tmp/c.db");
        assert!(args.exclude_videos);
        assert!(args.quiet_success);
        assert_eq!(args.max_retries, 0);
        assert_eq!(args.timeout, 30);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["index", "/photos", "--log-level", "debug", "--no-progress-bar"]);
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(cli.no_progress_bar);
        let Command::Index(args) = cli.command else {
            panic!("expected index");
        };
        assert_eq!(args.root, PathBuf::from("/photos"));
    }

    #[test]
    fn test_reconcile_requires_log() {
        assert!(Cli::try_parse_from(["immich-catalog", "reconcile"]).is_err());
        let cli = parse(&["reconcile", "run.log"]);
        let Command::Reconcile(args) = cli.command else {
            panic!("expected reconcile");
        };
        assert_eq!(args.log, PathBuf::from("run.log"));
    }

    #[test]
    fn test_status_failed_flag() {
        let Command::Status(args) = parse(&["status", "--failed"]).command else {
            panic!("expected status");
        };
        assert!(args.failed);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(Cli::try_parse_from(["immich-catalog", "sync", "--timeout", "0"]).is_err());
    }
}
