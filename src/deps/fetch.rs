//! Git plumbing for the update engine.
//!
//! - Clone when there is no usable cache, incremental fetch when there is
//! - A cache cloned from a different source is thrown away and re-cloned
//! - Transfers abort once the per-dependency deadline has passed

use crate::error::FetchError;
use crate::registry::DEFAULT_REFERENCE;
use git2::{Cred, CredentialType, FetchOptions, Oid, RemoteCallbacks, Repository};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How the clone cache was brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Cloned,
    Fetched,
}

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// What one dependency's clone should track.
#[derive(Debug, Clone)]
pub struct SyncRequest<'a> {
    pub name: &'a str,
    pub source: &'a str,
    pub reference: &'a str,
    /// Source the existing cache was made from, if recorded.
    pub recorded_source: Option<&'a str>,
}

/// Clone or fetch `request.source` into `path` and resolve the commit that
/// `request.reference` points at. Nothing is checked out yet.
pub fn sync(
    path: &Path,
    request: &SyncRequest<'_>,
    deadline: Deadline,
) -> Result<(Repository, SyncKind, Oid), FetchError> {
    if let Some(repo) = reusable_cache(path, request) {
        tracing::debug!(name = request.name, "fetching into cached clone");
        let oid = fetch_reference(&repo, request, deadline)?;
        return Ok((repo, SyncKind::Fetched, oid));
    }

    if path.exists() {
        tracing::info!(
            name = request.name,
            "discarding clone cache made from a different source"
        );
        fs::remove_dir_all(path)?;
    }

    tracing::debug!(name = request.name, source = request.source, "cloning");
    let repo = match clone(path, request.source, deadline) {
        Ok(repo) => repo,
        Err(err) => {
            // A half-written clone must not be mistaken for a cache next time.
            if path.exists() {
                let _ = fs::remove_dir_all(path);
            }
            return Err(err);
        }
    };
    let oid = cloned_target(&repo, request.reference)?;
    Ok((repo, SyncKind::Cloned, oid))
}

/// Force the working tree of `repo` to `oid` with a detached HEAD.
pub fn checkout(repo: &Repository, oid: Oid) -> Result<(), FetchError> {
    let obj = repo.find_object(oid, None)?;
    let mut checkout_opts = git2::build::CheckoutBuilder::new();
    checkout_opts.force().remove_untracked(true);
    repo.checkout_tree(&obj, Some(&mut checkout_opts))?;
    repo.set_head_detached(oid)?;
    Ok(())
}

fn reusable_cache(path: &Path, request: &SyncRequest<'_>) -> Option<Repository> {
    if !path.exists() {
        return None;
    }
    let Ok(repo) = Repository::open(path) else {
        tracing::warn!(name = request.name, "clone cache is not a git repository");
        return None;
    };

    // The clone fetches from its own `origin`, so that is what has to match.
    // A recorded stamp for a different source also disqualifies it.
    if origin_url(&repo).as_deref() != Some(request.source) {
        return None;
    }
    if let Some(recorded) = request.recorded_source
        && recorded != request.source
    {
        return None;
    }
    Some(repo)
}

fn origin_url(repo: &Repository) -> Option<String> {
    repo.find_remote("origin")
        .ok()
        .and_then(|remote| remote.url().map(ToOwned::to_owned))
}

/// The `origin` URL of the clone cache at `path`, if there is one.
pub fn cached_origin(path: &Path) -> Option<String> {
    Repository::open(path).ok().and_then(|repo| origin_url(&repo))
}

static SERVER_TIMEOUT_LOCK: Mutex<()> = Mutex::new(());

/// Bound libgit2's socket connect and read timeouts by `timeout`, so a fetch
/// thread abandoned by its watchdog still ends once the budget is spent.
pub fn bound_server_timeouts(timeout: Duration) {
    let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX).max(1);
    let _guard = SERVER_TIMEOUT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: libgit2 options are process-global and unsynchronized; the lock
    // serializes every writer in this crate.
    let result = unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)
            .and_then(|()| git2::opts::set_server_timeout_in_milliseconds(millis))
    };
    if let Err(err) = result {
        tracing::warn!("cannot bound git socket timeouts: {}", err.message());
    }
}

fn clone(path: &Path, source: &str, deadline: Deadline) -> Result<Repository, FetchError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_options(deadline));
    builder
        .clone(source, path)
        .map_err(|e| classify(e, source, deadline))
}

fn cloned_target(repo: &Repository, reference: &str) -> Result<Oid, FetchError> {
    if reference == DEFAULT_REFERENCE {
        return repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map(|commit| commit.id())
            .map_err(|_| FetchError::MissingReference(reference.to_string()));
    }
    find_branch_commit(repo, reference)
        .ok_or_else(|| FetchError::MissingReference(reference.to_string()))
}

fn fetch_reference(
    repo: &Repository,
    request: &SyncRequest<'_>,
    deadline: Deadline,
) -> Result<Oid, FetchError> {
    let refspec = if request.reference == DEFAULT_REFERENCE {
        "HEAD".to_string()
    } else {
        format!("refs/heads/{}", request.reference)
    };

    let mut remote = repo.find_remote("origin")?;
    remote
        .fetch(&[refspec.as_str()], Some(&mut fetch_options(deadline)), None)
        .map_err(|e| match e.code() {
            git2::ErrorCode::NotFound => FetchError::MissingReference(request.reference.to_string()),
            _ => classify(e, request.source, deadline),
        })?;

    repo.find_reference("FETCH_HEAD")
        .and_then(|fetch_head| fetch_head.peel_to_commit())
        .map(|commit| commit.id())
        .map_err(|_| FetchError::MissingReference(request.reference.to_string()))
}

fn find_branch_commit(repo: &Repository, branch: &str) -> Option<Oid> {
    if let Ok(reference) = repo.find_branch(branch, git2::BranchType::Local)
        && let Ok(commit) = reference.get().peel_to_commit()
    {
        return Some(commit.id());
    }

    let remote_ref = format!("origin/{}", branch);
    if let Ok(reference) = repo.find_branch(&remote_ref, git2::BranchType::Remote)
        && let Ok(commit) = reference.get().peel_to_commit()
    {
        return Some(commit.id());
    }

    None
}

fn fetch_options(deadline: Deadline) -> FetchOptions<'static> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |_| !deadline.expired());
    callbacks.sideband_progress(move |_| !deadline.expired());

    // libgit2 keeps asking while credentials are rejected; give each kind one try.
    let mut tried = CredentialType::empty();
    callbacks.credentials(move |url, username, allowed| {
        if allowed.contains(CredentialType::SSH_KEY) && !tried.contains(CredentialType::SSH_KEY) {
            tried |= CredentialType::SSH_KEY;
            return Cred::ssh_key_from_agent(username.unwrap_or("git"));
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT)
            && !tried.contains(CredentialType::USER_PASS_PLAINTEXT)
        {
            tried |= CredentialType::USER_PASS_PLAINTEXT;
            if let Ok(config) = git2::Config::open_default() {
                return Cred::credential_helper(&config, url, username);
            }
        }
        if allowed.contains(CredentialType::DEFAULT) && !tried.contains(CredentialType::DEFAULT) {
            tried |= CredentialType::DEFAULT;
            return Cred::default();
        }
        Err(git2::Error::from_str("no usable credentials"))
    });

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

fn classify(err: git2::Error, source: &str, deadline: Deadline) -> FetchError {
    if deadline.expired() {
        return FetchError::Timeout(deadline.budget());
    }
    if err.code() == git2::ErrorCode::Auth || err.message().contains("no usable credentials") {
        return FetchError::Authentication {
            source_url: source.to_string(),
            message: err.message().to_string(),
        };
    }
    FetchError::Git(err)
}
