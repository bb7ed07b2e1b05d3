//! File discovery
//!
//! Discovery order is the report order: paths sorted, duplicates removed.

use crate::util::absolute_path;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Directory names never descended into
pub const SKIPPED_DIRS: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    "bin",
    "obj",
    "__pycache__",
    ".venv",
    "venv",
];

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported file type: {} (supported: {supported})", .path.display())]
    Unsupported { path: PathBuf, supported: String },
}

fn should_skip(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIPPED_DIRS.contains(&name))
            .unwrap_or(false)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = format!(".{}", ext.to_lowercase());
            extensions.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Files under `root` with one of `extensions` (lower-case, dot included).
///
/// A file given directly must match unless `forced` is set, in which case it
/// is taken as is. Unreadable directory entries are skipped. Returned paths
/// are absolute.
pub fn discover(
    root: &Path,
    extensions: &[&str],
    forced: bool,
) -> Result<Vec<PathBuf>, DiscoveryError> {
    let root = absolute_path(root);
    let root = root.as_path();
    if !root.exists() {
        return Err(DiscoveryError::NotFound(root.to_path_buf()));
    }
    if root.is_file() {
        if forced || has_extension(root, extensions) {
            return Ok(vec![root.to_path_buf()]);
        }
        return Err(DiscoveryError::Unsupported {
            path: root.to_path_buf(),
            supported: extensions.join(", "),
        });
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !should_skip(e))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    files.dedup();
    tracing::debug!(root = %root.display(), files = files.len(), "discovery finished");
    Ok(files)
}
