//! Materializing a dependency's exports into the project's import directory.
//!
//! The import entry is always rebuilt from scratch. Each dependency owns
//! `imports/<name>/`, so two dependencies exporting the same relative path
//! never overwrite each other.

use crate::error::FetchError;
use crate::layout;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Replace `dest` with a copy of `<clone>/src/exports`. Returns the number of
/// files copied.
pub fn import_exports(clone: &Path, dest: &Path) -> Result<usize, FetchError> {
    let exports = layout::exports_of(clone);
    if !exports.is_dir() {
        return Err(FetchError::MissingExports(exports));
    }

    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    let copied = copy_tree(&exports, dest)?;
    tracing::debug!(
        from = %exports.display(),
        to = %dest.display(),
        files = copied,
        "imported exports"
    );
    Ok(copied)
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<usize> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            // Symlinks are resolved and copied as regular files.
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}
