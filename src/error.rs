//! Error types shared by every c3pm operation.
//!
//! Expected conditions (a broken project, a bad argument, a failed write) are
//! typed variants. Anything else is carried as [`Error::Unhandled`] so the CLI
//! can ask the user to report it instead of mislabelling it.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Manifest missing, unreadable or malformed, or `init` over an existing one.
    #[error("bad project: {0}")]
    InvalidProject(String),

    /// A registry operation was given something it cannot accept.
    #[error("bad argument: {0}")]
    InvalidArgument(String),

    /// The atomic manifest write did not complete. The previous file is intact.
    #[error("failed to write {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn invalid_project(msg: impl Into<String>) -> Self {
        Self::InvalidProject(msg.into())
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Why a single dependency failed to update. Never escapes `update` as an
/// `Err`; it is attached to that dependency's result.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("git: {}", .0.message())]
    Git(#[from] git2::Error),

    #[error("authentication failed for {source_url}: {message}")]
    Authentication { source_url: String, message: String },

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("reference '{0}' not found")]
    MissingReference(String),

    #[error("exports directory not found: {}", .0.display())]
    MissingExports(PathBuf),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("{0:#}")]
    Other(anyhow::Error),
}
