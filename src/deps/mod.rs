//! Fetching and importing dependencies.
//!
//! - **Fetching**: clone or incrementally fetch each dependency into `.c3pm/clones/<name>`
//! - **Checkout**: detach the clone at the declared reference
//! - **Import**: rebuild `imports/<name>` from the clone's `src/exports`
//!
//! Registry edits (`add`, `remove`) live in [`crate::registry`]; nothing here
//! modifies the manifest.

mod fetch;
mod update;

pub use fetch::{Deadline, SyncKind};
pub use update::{
    DependencyUpdate, UpdateOptions, UpdateReport, UpdateState, Updated, update,
    update_with_progress,
};
