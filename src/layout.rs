//! Directory conventions of a c3pm project.
//!
//! ```text
//! project/
//! ├── c3pm.json            manifest
//! ├── .gitignore           gets /imports/ and /.c3pm/
//! ├── src/
//! │   └── exports/         what this project publishes to dependents
//! ├── imports/<name>/      copy of each dependency's src/exports (regenerable)
//! └── .c3pm/
//!     ├── clones/<name>/   git working copy per dependency
//!     └── clones.lock      source + revision each clone was made from
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "c3pm.json";
pub const SRC_DIR: &str = "src";
pub const EXPORTS_DIR: &str = "exports";
pub const IMPORT_DIR: &str = "imports";
pub const STATE_DIR: &str = ".c3pm";
pub const CLONE_DIR: &str = "clones";
pub const CACHE_LOCK_FILE: &str = "clones.lock";
pub const IGNORE_FILE: &str = ".gitignore";

/// Paths of one project, all derived from its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn src_dir(&self) -> PathBuf {
        self.root.join(SRC_DIR)
    }

    pub fn exports_dir(&self) -> PathBuf {
        exports_of(&self.root)
    }

    pub fn import_dir(&self) -> PathBuf {
        self.root.join(IMPORT_DIR)
    }

    pub fn import_path(&self, name: &str) -> PathBuf {
        self.import_dir().join(name)
    }

    pub fn clone_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR).join(CLONE_DIR)
    }

    pub fn clone_path(&self, name: &str) -> PathBuf {
        self.clone_dir().join(name)
    }

    pub fn cache_lock_path(&self) -> PathBuf {
        self.root.join(STATE_DIR).join(CACHE_LOCK_FILE)
    }

    pub fn ignore_file(&self) -> PathBuf {
        self.root.join(IGNORE_FILE)
    }

    /// Create `src/` and `src/exports/`. Existing directories are fine.
    pub fn create_source_dirs(&self) -> Result<()> {
        let exports = self.exports_dir();
        fs::create_dir_all(&exports)
            .with_context(|| format!("Failed to create {}", exports.display()))
    }

    /// Make sure the import and clone-cache directories are ignored by git.
    /// Returns the entries that had to be appended.
    pub fn ensure_ignored(&self) -> Result<Vec<String>> {
        let path = self.ignore_file();
        let mut content = if path.exists() {
            fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?
        } else {
            String::new()
        };

        let missing: Vec<String> = ignore_entries()
            .into_iter()
            .filter(|entry| !is_listed(&content, entry))
            .collect();
        if missing.is_empty() {
            return Ok(missing);
        }

        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        for entry in &missing {
            content.push_str(entry);
            content.push('\n');
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!(entries = ?missing, "appended to {}", IGNORE_FILE);
        Ok(missing)
    }
}

/// The exports directory of any c3pm project tree, including a dependency's clone.
pub fn exports_of(project_root: &Path) -> PathBuf {
    project_root.join(SRC_DIR).join(EXPORTS_DIR)
}

fn ignore_entries() -> Vec<String> {
    vec![format!("/{}/", IMPORT_DIR), format!("/{}/", STATE_DIR)]
}

// "/imports/", "imports/", "/imports" and "imports" all ignore the same directory.
fn is_listed(content: &str, entry: &str) -> bool {
    let bare = entry.trim_matches('/');
    content
        .lines()
        .map(str::trim)
        .any(|line| line.trim_matches('/') == bare)
}
