//! Parser for sync run logs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::media::normalize_path;

const UPLOADED_PREFIX: &str = "Uploaded: ";
const UPLOADED_SEPARATOR: &str = " -> ";
const SKIPPED_PREFIX: &str = "Skipping already uploaded file: ";

/// A file the log says is already on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub path: PathBuf,
    pub status_code: Option<u16>,
}

/// Leading three-digit code, e.g. `201` in `201  : 3/10`.
fn leading_status_code(rest: &str) -> Option<u16> {
    let rest = rest.trim_start();
    let digits = rest.get(..3)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match rest[3..].chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => None,
        _ => digits.parse().ok(),
    }
}

/// Extract upload records from log text.
///
/// One record per distinct resolved path, in order of first appearance,
/// carrying the value from its last appearance. A skip line reuses the code
/// of an earlier upload line for the same path.
pub fn parse_log(text: &str, base: &Path) -> Vec<LogRecord> {
    let mut records: Vec<LogRecord> = Vec::new();
    let mut by_path: HashMap<PathBuf, usize> = HashMap::new();

    for line in text.lines() {
        let line = line.trim();

        let (raw_path, code) = if let Some(rest) = line.strip_prefix(UPLOADED_PREFIX) {
            match rest.split_once(UPLOADED_SEPARATOR) {
                Some((p, tail)) => (p.trim(), Some(leading_status_code(tail))),
                None => (rest.trim(), Some(None)),
            }
        } else if let Some(p) = line.strip_prefix(SKIPPED_PREFIX) {
            (p.trim(), None)
        } else {
            continue;
        };

        if raw_path.is_empty() {
            continue;
        }
        let path = normalize_path(Path::new(raw_path), base);

        match by_path.get(&path) {
            Some(&i) => {
                // Skip lines keep whatever code is already known.
                if let Some(code) = code {
                    records[i].status_code = code;
                }
            }
            None => {
                by_path.insert(path.clone(), records.len());
                records.push(LogRecord {
                    path,
                    status_code: code.flatten(),
                });
            }
        }
    }

    records
}
