//! Clone-cache stamps (`.c3pm/clones.lock`).
//!
//! Records which source each cached clone was made from and the revision
//! that was last imported. A source that no longer matches the manifest
//! invalidates the clone.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct CacheLock {
    #[serde(rename = "clone", default)]
    pub clones: BTreeMap<String, CloneStamp>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CloneStamp {
    pub source: String,
    pub rev: String,
}

impl CacheLock {
    /// A missing or unreadable stamp file is treated as empty; the clones are
    /// then checked against their `origin` remote instead.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| toml::from_str::<CacheLock>(&content).map_err(anyhow::Error::from))
        {
            Ok(lock) => lock,
            Err(e) => {
                tracing::warn!("ignoring unreadable {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        let dir = path
            .parent()
            .context("cache lock path has no parent directory")?;
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CloneStamp> {
        self.clones.get(name)
    }

    pub fn record(&mut self, name: String, source: String, rev: String) {
        self.clones.insert(name, CloneStamp { source, rev });
    }

    pub fn forget(&mut self, name: &str) {
        self.clones.remove(name);
    }
}
