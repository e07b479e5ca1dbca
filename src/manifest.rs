//! The project manifest (`c3pm.json`).
//!
//! ```json
//! {
//!   "name": "demo",
//!   "dependencies": {
//!     "foo": {
//!       "type": "git-c3pm",
//!       "source": "https://example.com/foo.git",
//!       "reference": "master"
//!     }
//!   }
//! }
//! ```
//!
//! Writes go through a temporary file in the project root that is renamed over
//! the manifest, so an interrupted write never leaves a truncated file behind.

use crate::error::{Error, Result};
use crate::layout::{Layout, MANIFEST_FILE};
use crate::registry::{self, Registry};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

pub use crate::registry::{DependencySpec, DependencyType};

// Manifest writes are serialized within the process; c3pm is not a daemon, so
// cross-process locking is left to the user.
static MANIFEST_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Registry,
}

impl Project {
    /// A project with no metadata and no dependencies. Does not touch the disk.
    pub fn new(name: &str) -> Result<Self> {
        registry::validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            version: None,
            author: None,
            license: None,
            description: None,
            dependencies: Registry::new(),
        })
    }

    pub fn add(&mut self, name: &str, source: &str, reference: &str) -> Result<DependencySpec> {
        self.dependencies.add(name, source, reference)
    }

    pub fn remove(&mut self, name: &str, reference: &str) -> Result<DependencySpec> {
        self.dependencies.remove(name, reference)
    }

    pub fn list(&self) -> Vec<(&str, &DependencySpec)> {
        self.dependencies.list()
    }

    /// Deterministic manifest text: fields in declaration order, dependencies
    /// in registry order, two-space indent, trailing newline.
    pub fn to_json(&self) -> anyhow::Result<String> {
        let mut text = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        text.push('\n');
        Ok(text)
    }

    /// Parse and validate manifest text.
    pub fn from_json(text: &str) -> Result<Self> {
        let project: Project = serde_json::from_str(text)
            .map_err(|e| Error::invalid_project(format!("{} is malformed: {}", MANIFEST_FILE, e)))?;
        if registry::validate_name(&project.name).is_err() {
            return Err(Error::invalid_project(format!(
                "invalid project name '{}'",
                project.name
            )));
        }
        project
            .dependencies
            .check_loaded()
            .map_err(Error::InvalidProject)?;
        Ok(project)
    }
}

/// Load the manifest under `root`. Fails with `InvalidProject` when it is
/// missing, unreadable or malformed; there is no partially loaded project.
pub fn load(root: &Path) -> Result<Project> {
    let path = Layout::new(root).manifest_path();
    if !path.is_file() {
        return Err(Error::invalid_project(format!(
            "{} not found in {}",
            MANIFEST_FILE,
            root.display()
        )));
    }
    let text = fs::read_to_string(&path).map_err(|e| {
        Error::invalid_project(format!("cannot read {}: {}", path.display(), e))
    })?;
    let project = Project::from_json(&text)?;
    tracing::debug!(
        project = %project.name,
        dependencies = project.dependencies.len(),
        "loaded manifest"
    );
    Ok(project)
}

/// Prepare a new project under `root`. Creates `src/exports/` and the ignore
/// entries; the returned project is written only by [`persist`].
pub fn initialize(root: &Path, name: &str) -> Result<Project> {
    let layout = Layout::new(root);
    if layout.manifest_path().exists() {
        return Err(Error::invalid_project(format!(
            "project already initialized ({} exists)",
            MANIFEST_FILE
        )));
    }
    let project = Project::new(name)?;

    layout.create_source_dirs()?;
    layout.ensure_ignored()?;
    tracing::info!(project = name, root = %root.display(), "initialized project");
    Ok(project)
}

/// Atomically replace the manifest under `root` with `project`.
pub fn persist(project: &Project, root: &Path) -> Result<()> {
    let _guard = MANIFEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    write_manifest(project, root)
}

/// Load, mutate and persist under the manifest lock. Nothing is written when
/// `f` fails.
pub fn edit<T>(root: &Path, f: impl FnOnce(&mut Project) -> Result<T>) -> Result<T> {
    let _guard = MANIFEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut project = load(root)?;
    let value = f(&mut project)?;
    write_manifest(&project, root)?;
    Ok(value)
}

fn write_manifest(project: &Project, root: &Path) -> Result<()> {
    let path = Layout::new(root).manifest_path();
    let text = project.to_json()?;
    let persist_err = |source: io::Error| Error::Persist {
        path: path.clone(),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".c3pm.json.")
        .tempfile_in(root)
        .map_err(persist_err)?;
    tmp.write_all(text.as_bytes()).map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(&path).map_err(|e| persist_err(e.error))?;

    tracing::debug!(path = %path.display(), "manifest written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_demo(root: &Path) -> Project {
        let project = initialize(root, "demo").unwrap();
        persist(&project, root).unwrap();
        project
    }

    #[test]
    fn test_initialize_scenario() {
        let dir = tempfile::tempdir().unwrap();
        init_demo(dir.path());

        let project = load(dir.path()).unwrap();
        assert_eq!(project.name, "demo");
        assert!(project.list().is_empty());
        assert!(dir.path().join("src").is_dir());
        assert!(dir.path().join("src").join("exports").is_dir());
    }

    #[test]
    fn test_initialize_twice_fails_without_touching_ignore_list() {
        let dir = tempfile::tempdir().unwrap();
        init_demo(dir.path());
        let ignore_before = fs::read_to_string(dir.path().join(".gitignore")).unwrap();

        let err = initialize(dir.path(), "demo").unwrap_err();
        assert!(matches!(err, Error::InvalidProject(_)));

        let ignore_after = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(ignore_before, ignore_after);
        assert_eq!(ignore_after.matches("/imports/").count(), 1);
    }

    #[test]
    fn test_initialize_rejects_bad_name() {
        let dir = tempfile::tempdir().unwrap();
        let err = initialize(dir.path(), "my project").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!dir.path().join("src").exists());
    }

    #[test]
    fn test_load_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidProject(_)));
    }

    #[test]
    fn test_load_rejects_schema_violations() {
        let cases = [
            "not json at all",
            r#"{"dependencies": {}}"#,
            r#"{"name": "demo", "dependencies": []}"#,
            r#"{"name": "demo", "dependencies": {"foo": {"type": "git-c3pm", "source": "https://x.org/a.git"}}}"#,
            r#"{"name": "demo", "dependencies": {"foo": {"type": "svn", "source": "https://x.org/a", "reference": "master"}}}"#,
            r#"{"name": "", "dependencies": {}}"#,
            r#"{"name": "demo", "dependencies": {"../x": {"type": "git-c3pm", "source": "https://x.org/a.git", "reference": "master"}}}"#,
        ];
        for text in cases {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join(MANIFEST_FILE), text).unwrap();
            let err = load(dir.path()).unwrap_err();
            assert!(matches!(err, Error::InvalidProject(_)), "{text}: {err:?}");
        }
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = init_demo(dir.path());
        project.version = Some("1.0.0".to_string());
        project.add("zeta", "https://example.com/zeta.git", "master").unwrap();
        project.add("alpha", "git@example.com:alpha.git", "master").unwrap();
        persist(&project, dir.path()).unwrap();

        let manifest = dir.path().join(MANIFEST_FILE);
        let first = fs::read(&manifest).unwrap();
        let loaded = load(dir.path()).unwrap();
        persist(&loaded, dir.path()).unwrap();
        let second = fs::read(&manifest).unwrap();

        assert_eq!(first, second);
        assert_eq!(loaded, project);
        let names: Vec<&str> = loaded.list().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_serialized_shape() {
        let mut project = Project::new("demo").unwrap();
        project.add("foo", "https://example.com/foo.git", "master").unwrap();
        let expected = r#"{
  "name": "demo",
  "dependencies": {
    "foo": {
      "type": "git-c3pm",
      "source": "https://example.com/foo.git",
      "reference": "master"
    }
  }
}
"#;
        assert_eq!(project.to_json().unwrap(), expected);
    }

    #[test]
    fn test_edit_does_not_write_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        init_demo(dir.path());
        edit(dir.path(), |p| p.add("foo", "https://example.com/foo.git", "master")).unwrap();
        let before = fs::read(dir.path().join(MANIFEST_FILE)).unwrap();

        let err = edit(dir.path(), |p| p.remove("foo", "develop")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(fs::read(dir.path().join(MANIFEST_FILE)).unwrap(), before);
    }

    #[test]
    fn test_persist_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        init_demo(dir.path());
        let stray: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".c3pm.json."))
            .collect();
        assert!(stray.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_persist_failure_keeps_previous_manifest() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut project = init_demo(dir.path());
        let before = fs::read(dir.path().join(MANIFEST_FILE)).unwrap();

        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();
        project.add("foo", "https://example.com/foo.git", "master").unwrap();
        let result = persist(&project, dir.path());
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();

        // Root ignores directory permissions; only check the failure path when it applies.
        if let Err(err) = result {
            assert!(matches!(err, Error::Persist { .. }));
            assert_eq!(fs::read(dir.path().join(MANIFEST_FILE)).unwrap(), before);
        }
    }
}
