//! # c3pm - C/C++ Project Manager
//!
//! c3pm keeps a project's source dependencies in `c3pm.json`, fetches them
//! with git and copies what each dependency exports into `imports/<name>/`
//! for the build to pick up.
//!
//! ## Quick Start
//!
//! ```bash
//! c3pm init
//! c3pm add git-c3pm fmt https://github.com/c3pm/fmt.git master
//! c3pm update
//! ```
//!
//! ## Library use
//!
//! Every operation takes the project root explicitly:
//!
//! ```no_run
//! use std::path::Path;
//!
//! let root = Path::new("demo");
//! let project = c3pm::manifest::initialize(root, "demo")?;
//! c3pm::manifest::persist(&project, root)?;
//!
//! c3pm::manifest::edit(root, |p| p.add("foo", "https://example.com/foo.git", "master"))?;
//!
//! let project = c3pm::manifest::load(root)?;
//! let report = c3pm::deps::update(&project, root, &Default::default())?;
//! for failed in report.failed() {
//!     eprintln!("{} failed", failed.name);
//! }
//! # Ok::<(), c3pm::Error>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`manifest`] - Loading, initializing and atomically writing `c3pm.json`
//! - [`registry`] - Dependency set and argument validation
//! - [`deps`] - Fetch/update engine
//! - [`layout`] - Directory conventions and ignore list

/// Fetch/update engine.
pub mod deps;

/// Error taxonomy.
pub mod error;

/// Copying dependency exports into the import directory.
pub mod import;

/// Directory conventions (`src/exports`, `imports/`, `.c3pm/clones/`).
pub mod layout;

/// Clone-cache stamps (`.c3pm/clones.lock`).
pub mod lock;

/// Manifest file (`c3pm.json`).
pub mod manifest;

/// Dependency registry.
pub mod registry;

/// Terminal output helpers for the CLI.
pub mod ui;

pub use error::{Error, FetchError, Result};
