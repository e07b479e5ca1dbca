//! The update engine.
//!
//! Every registered dependency is driven through
//! `Pending → Fetching → CheckedOut → Imported` on a bounded worker pool.
//! A failure moves that dependency to `Failed` and is recorded in its result;
//! the other dependencies carry on.

use super::fetch::{self, Deadline, SyncKind, SyncRequest};
use crate::error::{FetchError, Result};
use crate::import::import_exports;
use crate::layout::Layout;
use crate::lock::CacheLock;
use crate::manifest::{DependencySpec, Project};
use anyhow::Context;
use git2::{Oid, Repository};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const MAX_DEFAULT_JOBS: usize = 8;

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Upper bound on dependencies processed at once. `1` runs sequentially.
    pub jobs: usize,
    /// Budget for the network part (clone or fetch) of one dependency.
    pub timeout: Duration,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        let jobs = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_DEFAULT_JOBS);
        Self {
            jobs,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Pending,
    Fetching,
    CheckedOut,
    Imported,
    Failed,
}

impl UpdateState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Imported | Self::Failed)
    }

    /// Success path moves one step at a time; `Failed` is reachable from any
    /// state that is not already terminal.
    pub fn can_advance_to(self, next: UpdateState) -> bool {
        use UpdateState::*;
        match (self, next) {
            (Pending, Fetching) | (Fetching, CheckedOut) | (CheckedOut, Imported) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Result of a successful dependency update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Updated {
    pub sync: SyncKind,
    pub revision: String,
    pub files: usize,
}

#[derive(Debug)]
pub struct DependencyUpdate {
    pub name: String,
    pub source: String,
    trail: Vec<UpdateState>,
    pub outcome: std::result::Result<Updated, FetchError>,
}

impl DependencyUpdate {
    pub fn state(&self) -> UpdateState {
        self.trail.last().copied().unwrap_or(UpdateState::Pending)
    }

    /// Every state this dependency went through, starting at `Pending`.
    pub fn trail(&self) -> &[UpdateState] {
        &self.trail
    }

    /// The state the dependency was in when it failed.
    pub fn failed_at(&self) -> Option<UpdateState> {
        match self.trail.as_slice() {
            [.., before, UpdateState::Failed] => Some(*before),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state() == UpdateState::Imported
    }
}

#[derive(Debug, Default)]
pub struct UpdateReport {
    pub results: Vec<DependencyUpdate>,
}

impl UpdateReport {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(DependencyUpdate::is_success)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &DependencyUpdate> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &DependencyUpdate> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn get(&self, name: &str) -> Option<&DependencyUpdate> {
        self.results.iter().find(|r| r.name == name)
    }
}

struct Tracker {
    trail: Vec<UpdateState>,
}

impl Tracker {
    fn new() -> Self {
        Self {
            trail: vec![UpdateState::Pending],
        }
    }

    fn current(&self) -> UpdateState {
        self.trail.last().copied().unwrap_or(UpdateState::Pending)
    }

    fn advance(&mut self, next: UpdateState) {
        debug_assert!(
            self.current().can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.current(),
            next
        );
        self.trail.push(next);
    }
}

/// Update every dependency of `project` under `root`. Per-dependency failures
/// are reported in the returned [`UpdateReport`]; `Err` means the run itself
/// could not happen (for example the cache directory cannot be created).
pub fn update(project: &Project, root: &Path, options: &UpdateOptions) -> Result<UpdateReport> {
    update_with_progress(project, root, options, |_| {})
}

/// Like [`update`], calling `on_done` from the worker as each dependency finishes.
pub fn update_with_progress<F>(
    project: &Project,
    root: &Path,
    options: &UpdateOptions,
    on_done: F,
) -> Result<UpdateReport>
where
    F: Fn(&DependencyUpdate) + Sync,
{
    let layout = Layout::new(root);
    let lock_path = layout.cache_lock_path();
    let mut stamps = CacheLock::load(&lock_path);

    for dir in [layout.clone_dir(), layout.import_dir()] {
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    fetch::bound_server_timeouts(options.timeout);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs.max(1))
        .thread_name(|i| format!("c3pm-update-{i}"))
        .build()
        .context("Failed to start update workers")?;

    let dependencies = project.list();
    tracing::info!(
        project = %project.name,
        dependencies = dependencies.len(),
        jobs = options.jobs,
        "updating"
    );

    let stragglers = Mutex::new(Vec::new());
    let results: Vec<DependencyUpdate> = pool.install(|| {
        dependencies
            .par_iter()
            .map(|&(name, spec)| {
                let result =
                    update_one(&layout, name, spec, &stamps, options.timeout, &stragglers);
                on_done(&result);
                result
            })
            .collect()
    });

    // Timed-out fetches may still be writing their clone cache.
    for handle in stragglers.into_inner().unwrap_or_else(|e| e.into_inner()) {
        let worker = handle.thread().name().unwrap_or("fetch").to_string();
        tracing::debug!(worker = %worker, "waiting for timed-out fetch to stop");
        if handle.join().is_err() {
            tracing::warn!(worker = %worker, "timed-out fetch panicked");
        }
    }

    for result in &results {
        match &result.outcome {
            Ok(updated) => stamps.record(
                result.name.clone(),
                result.source.clone(),
                updated.revision.clone(),
            ),
            Err(_) => {
                // Keep the stamp only while it still describes the clone on disk.
                let origin = fetch::cached_origin(&layout.clone_path(&result.name));
                let describes_clone = stamps
                    .get(&result.name)
                    .is_some_and(|stamp| origin.as_deref() == Some(stamp.source.as_str()));
                if !describes_clone {
                    stamps.forget(&result.name);
                }
            }
        }
    }
    stamps.save(&lock_path)?;

    Ok(UpdateReport { results })
}

fn update_one(
    layout: &Layout,
    name: &str,
    spec: &DependencySpec,
    stamps: &CacheLock,
    timeout: Duration,
    stragglers: &Mutex<Vec<JoinHandle<()>>>,
) -> DependencyUpdate {
    let mut tracker = Tracker::new();
    let outcome = drive(&mut tracker, layout, name, spec, stamps, timeout, stragglers);

    match &outcome {
        Ok(updated) => tracing::info!(
            name,
            sync = ?updated.sync,
            revision = %updated.revision,
            "dependency imported"
        ),
        Err(err) => {
            tracker.advance(UpdateState::Failed);
            tracing::warn!(name, "dependency update failed: {}", err);
        }
    }

    DependencyUpdate {
        name: name.to_string(),
        source: spec.source.clone(),
        trail: tracker.trail,
        outcome,
    }
}

fn drive(
    tracker: &mut Tracker,
    layout: &Layout,
    name: &str,
    spec: &DependencySpec,
    stamps: &CacheLock,
    timeout: Duration,
    stragglers: &Mutex<Vec<JoinHandle<()>>>,
) -> std::result::Result<Updated, FetchError> {
    tracker.advance(UpdateState::Fetching);
    let clone_path = layout.clone_path(name);
    let recorded_source = stamps.get(name).map(|stamp| stamp.source.clone());
    let (repo, sync, oid) = sync_with_timeout(
        clone_path.clone(),
        name.to_string(),
        spec.clone(),
        recorded_source,
        timeout,
        stragglers,
    )?;

    fetch::checkout(&repo, oid)?;
    tracker.advance(UpdateState::CheckedOut);

    let files = import_exports(&clone_path, &layout.import_path(name))?;
    tracker.advance(UpdateState::Imported);

    Ok(Updated {
        sync,
        revision: oid.to_string(),
        files,
    })
}

// The network step runs on its own thread so a transfer stuck before its
// progress callbacks fire still gives the worker back after `timeout`.
// A thread that misses the deadline is handed to `stragglers` to be joined
// before the run finishes.
fn sync_with_timeout(
    path: PathBuf,
    name: String,
    spec: DependencySpec,
    recorded_source: Option<String>,
    timeout: Duration,
    stragglers: &Mutex<Vec<JoinHandle<()>>>,
) -> std::result::Result<(Repository, SyncKind, Oid), FetchError> {
    let deadline = Deadline::after(timeout);
    let (tx, rx) = mpsc::channel();
    let thread_name = format!("c3pm-fetch-{name}");

    let handle = thread::Builder::new().name(thread_name).spawn(move || {
        let request = SyncRequest {
            name: &name,
            source: &spec.source,
            reference: &spec.reference,
            recorded_source: recorded_source.as_deref(),
        };
        // The receiver is gone after a timeout; nothing left to report to.
        let _ = tx.send(fetch::sync(&path, &request, deadline));
    })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            stragglers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(handle);
            Err(FetchError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(FetchError::Other(anyhow::anyhow!(
            "fetch worker exited without a result"
        ))),
    }
}
