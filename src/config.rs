use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::sync::{RetryPolicy, SyncConfig};

pub const BASE_URL_VAR: &str = "IMMICH_BASE_URL";
pub const API_KEY_VAR: &str = "IMMICH_API_KEY";

/// Connection settings for the Immich server.
pub struct ImmichConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ImmichConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmichConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ImmichConfig {
    /// Read settings from the environment, after loading `.env` if present.
    pub fn from_env(timeout: Duration) -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Ignoring unreadable .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok(), timeout)
    }

    fn from_lookup<F>(lookup: F, timeout: Duration) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{key} must be set (environment or .env file)"))
        };

        let base_url = required(BASE_URL_VAR)?;
        let parsed = reqwest::Url::parse(&base_url)
            .with_context(|| format!("{BASE_URL_VAR} is not a valid URL: {base_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("{BASE_URL_VAR} must use http or https: {base_url}");
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: required(API_KEY_VAR)?,
            timeout,
        })
    }
}

impl SyncConfig {
    pub fn from_args(args: &crate::cli::SyncArgs) -> Self {
        Self {
            exclude_videos: args.exclude_videos,
            quiet_success: args.quiet_success,
            retry: RetryPolicy {
                max_retries: args.max_retries,
            },
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const TIMEOUT: Duration = Duration::from_secs(300);

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/Pictures/catalog.db");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join("Pictures/catalog.db"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(
            expand_tilde("/absolute/catalog.db"),
            PathBuf::from("/absolute/catalog.db")
        );
        assert_eq!(
            expand_tilde("immich_catalog.db"),
            PathBuf::from("immich_catalog.db")
        );
    }

    #[test]
    fn test_from_lookup_complete() {
        let cfg = ImmichConfig::from_lookup(
            lookup(&[
                (BASE_URL_VAR, "https://photos.example.com/api/"),
                (API_KEY_VAR, " key123 "),
            ]),
            TIMEOUT,
        )
        .unwrap();
        assert_eq!(cfg.base_url, "https://photos.example.com/api");
        assert_eq!(cfg.api_key, "key123");
        assert_eq!(cfg.timeout, TIMEOUT);
    }

    #[test]
    fn test_missing_api_key_names_variable() {
        let err = ImmichConfig::from_lookup(
            lookup(&[(BASE_URL_VAR, "http://immich.local:2283/api")]),
            TIMEOUT,
        )
        .unwrap_err();
        assert!(err.to_string().contains(API_KEY_VAR));
    }

    #[test]
    fn test_blank_base_url_is_missing() {
        let err = ImmichConfig::from_lookup(
            lookup(&[(BASE_URL_VAR, "   "), (API_KEY_VAR, "k")]),
            TIMEOUT,
        )
        .unwrap_err();
        assert!(err.to_string().contains(BASE_URL_VAR));
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(ImmichConfig::from_lookup(
            lookup(&[(BASE_URL_VAR, "ftp://immich.local"), (API_KEY_VAR, "k")]),
            TIMEOUT,
        )
        .is_err());
        assert!(ImmichConfig::from_lookup(
            lookup(&[(BASE_URL_VAR, "not a url"), (API_KEY_VAR, "k")]),
            TIMEOUT,
        )
        .is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let cfg = ImmichConfig::from_lookup(
            lookup(&[(BASE_URL_VAR, "http://h/api"), (API_KEY_VAR, "hunter2")]),
            TIMEOUT,
        )
        .unwrap();
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }

    #[test]
    fn test_sync_config_from_args() {
        use clap::Parser;
        let cli = crate::cli::Cli::try_parse_from([
            "immich-catalog",
            "sync",
            "--exclude-videos",
            "--max-retries",
            "2",
        ])
        .unwrap();
        let crate::cli::Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        let cfg = SyncConfig::from_args(&args);
        assert!(cfg.exclude_videos);
        assert!(!cfg.quiet_success);
        assert_eq!(cfg.retry.max_retries, 2);
    }
}
