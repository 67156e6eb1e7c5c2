//! Media file classification and directory walking.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Extensions treated as video assets.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".mov", ".avi", ".mkv", ".webm", ".wmv", ".flv", ".m4v", ".3gp", ".mts", ".ts",
    ".m2ts", ".mpeg", ".mpg",
];

/// Extensions treated as still images, including camera RAW and scientific formats.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".heic", ".cr2", ".cr3", ".crw", ".fit",
    ".fits", ".fts", ".dcm", ".nii", ".nii.gz", ".tif", ".tiff",
];

/// Case-insensitive suffix match; handles multi-part suffixes like `.nii.gz`.
fn has_suffix(path: &Path, suffixes: &[&str]) -> bool {
    let lower = path.to_string_lossy().to_lowercase();
    suffixes.iter().any(|ext| lower.ends_with(ext))
}

pub fn is_video_file(path: &Path) -> bool {
    has_suffix(path, VIDEO_EXTENSIONS)
}

pub fn is_media_file(path: &Path) -> bool {
    has_suffix(path, IMAGE_EXTENSIONS) || is_video_file(path)
}

/// Lexically normalize `path`, resolving it against `base` when relative.
/// The filesystem is not consulted, so symlinks are not followed.
pub fn normalize_path(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Recursively collect every media file under `root`.
///
/// Any unreadable directory aborts the walk: a partial inventory is worse
/// than none. Symlinks are not followed.
pub fn collect_media_files(root: &Path) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file() && is_media_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
