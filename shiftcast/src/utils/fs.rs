//! Filesystem helpers shared across modules.
//!
//! These helpers attach operation + path context to IO errors and treat a
//! file that is already gone as success where deletion races are expected.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Ensure a directory exists, creating it (recursively) if needed.
pub fn ensure_dir_all(path: &Path) -> Result<()> {
    ensure_dir_all_with_op("creating directory", path)
}

/// Ensure a directory exists with a custom operation label.
pub fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io_path(op, path, e))
}

/// Ensure the parent directory of a file path exists.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    ensure_dir_all(parent)
}

/// Write a file, creating its parent directory first.
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    ensure_parent_dir(path)?;
    std::fs::write(path, contents).map_err(|e| Error::io_path("writing file", path, e))
}

/// Outcome of a best-effort delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// The file disappeared before we got to it.
    AlreadyGone,
}

/// Remove a file, treating "not found" as success.
pub fn remove_file_if_exists(path: &Path) -> std::io::Result<RemoveOutcome> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(RemoveOutcome::Removed),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(RemoveOutcome::AlreadyGone),
        Err(e) => Err(e),
    }
}

/// Resolve `path` against `root` unless it is already absolute.
pub fn resolve_under(root: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
