//! The dependency set of a project.
//!
//! Every mutation is validated before it touches the map, so a rejected
//! `add` or `remove` leaves the registry exactly as it was.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// The only reference selector implemented so far: the default branch head.
pub const DEFAULT_REFERENCE: &str = "master";

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_-]*$").expect("valid name regex"));

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:https?|ssh|git)://[^/\s]+/\S+|file://\S+|[\w.-]+@[\w.-]+:\S+)$")
        .expect("valid url regex")
});

/// Origin kind of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyType {
    #[serde(rename = "git-c3pm")]
    GitC3pm,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitC3pm => "git-c3pm",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    #[serde(rename = "type")]
    pub kind: DependencyType,
    pub source: String,
    pub reference: String,
}

impl DependencySpec {
    /// `name (git-c3pm: <source>, <reference>)`
    pub fn describe(&self, name: &str) -> String {
        format!("{} ({}: {}, {})", name, self.kind, self.source, self.reference)
    }
}

/// Check that `name` can be used as a project or dependency name.
/// Names become directory names, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument("name must not be empty"));
    }
    if !NAME_RE.is_match(name) {
        return Err(Error::invalid_argument(format!(
            "'{}' is not a valid name (use letters, digits, '_' and '-')",
            name
        )));
    }
    Ok(())
}

/// Syntactic check only; whether the repository exists is found out by `update`.
pub fn validate_source(source: &str) -> Result<()> {
    if URL_RE.is_match(source) {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "'{}' does not look like a git repository URL",
            source
        )))
    }
}

/// Validation hook for version selectors. Arbitrary refs can be admitted here
/// later without changing `add`/`remove`.
pub fn validate_reference(reference: &str) -> Result<()> {
    if reference == DEFAULT_REFERENCE {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "unsupported reference '{}', only '{}' is supported",
            reference, DEFAULT_REFERENCE
        )))
    }
}

/// Dependencies keyed by name, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry(IndexMap<String, DependencySpec>);

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, source: &str, reference: &str) -> Result<DependencySpec> {
        validate_name(name)?;
        if self.contains(name) {
            return Err(Error::invalid_argument(format!(
                "dependency '{}' already exists",
                name
            )));
        }
        validate_source(source)?;
        validate_reference(reference)?;

        let spec = DependencySpec {
            kind: DependencyType::GitC3pm,
            source: source.to_string(),
            reference: reference.to_string(),
        };
        self.0.insert(name.to_string(), spec.clone());
        tracing::debug!(name, source, reference, "dependency added");
        Ok(spec)
    }

    /// Remove `name` only if it is pinned to `reference`.
    pub fn remove(&mut self, name: &str, reference: &str) -> Result<DependencySpec> {
        let Some(spec) = self.0.get(name) else {
            return Err(Error::invalid_argument(format!(
                "dependency '{}' not found",
                name
            )));
        };
        if spec.reference != reference {
            return Err(Error::invalid_argument(format!(
                "dependency '{}' is pinned to '{}', not '{}'",
                name, spec.reference, reference
            )));
        }

        // shift_remove keeps the order of the remaining entries.
        let removed = self
            .0
            .shift_remove(name)
            .ok_or_else(|| anyhow::anyhow!("dependency '{}' vanished during remove", name))?;
        tracing::debug!(name, reference, "dependency removed");
        Ok(removed)
    }

    pub fn list(&self) -> Vec<(&str, &DependencySpec)> {
        self.iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DependencySpec)> {
        self.0.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn get(&self, name: &str) -> Option<&DependencySpec> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shape check for a registry read from disk. Loaded entries may carry
    /// references `add` would refuse; they only need to be non-empty.
    pub(crate) fn check_loaded(&self) -> std::result::Result<(), String> {
        for (name, spec) in &self.0 {
            if !NAME_RE.is_match(name) {
                return Err(format!("invalid dependency name '{}'", name));
            }
            if spec.source.trim().is_empty() {
                return Err(format!("dependency '{}' has an empty source", name));
            }
            if spec.reference.trim().is_empty() {
                return Err(format!("dependency '{}' has an empty reference", name));
            }
        }
        Ok(())
    }
}
