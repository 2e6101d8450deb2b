//! Shallow clone through the `git` CLI
//!
//! The clone runs as a child process so it can be killed when the deadline
//! passes; libgit2 is only used afterwards to read the checked-out HEAD.

use super::{FetchedTree, RepoFetcher, RepoRef};
use crate::error::AcquisitionError;
use git2::Repository;
use ignore::WalkBuilder;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fetches hosted repositories with `git clone --depth 1`
#[derive(Debug, Clone)]
pub struct GitFetcher {
    git_binary: String,
    /// Checkouts above this many bytes are rejected
    max_checkout_bytes: u64,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self {
            git_binary: "git".to_string(),
            max_checkout_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl GitFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_checkout_bytes(mut self, bytes: u64) -> Self {
        self.max_checkout_bytes = bytes;
        self
    }

    pub fn with_git_binary(mut self, binary: impl Into<String>) -> Self {
        self.git_binary = binary.into();
        self
    }

    fn spawn_clone(&self, clone_url: &str, branch: &str, dest: &Path) -> Result<Child, AcquisitionError> {
        Command::new(&self.git_binary)
            .args(["clone", "--depth", "1", "--single-branch", "--quiet", "--branch", branch])
            .arg(clone_url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AcquisitionError::Io(format!("Failed to run {}: {}", self.git_binary, e)))
    }

    /// Run one clone attempt until it exits, `deadline` passes or `cancel`
    /// fires. The child is killed in the last two cases.
    fn clone_once(
        &self,
        repo: &RepoRef,
        branch: &str,
        dest: &Path,
        deadline: Instant,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), AcquisitionError> {
        let mut child = self.spawn_clone(&repo.clone_url, branch, dest)?;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            let stop = if cancel.is_cancelled() {
                debug!("git clone of {} cancelled; killing", repo.full_name());
                Some(AcquisitionError::Cancelled)
            } else if Instant::now() >= deadline {
                warn!("git clone of {} exceeded {:?}; killing", repo.full_name(), timeout);
                Some(AcquisitionError::Timeout(timeout.as_secs()))
            } else {
                None
            };
            match stop {
                Some(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(err);
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        if status.success() {
            return Ok(());
        }
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        debug!("git clone stderr: {}", stderr.trim());
        Err(classify_clone_error(&repo.clone_url, branch, &stderr))
    }
}

/// Map `git clone` stderr onto an acquisition error
pub(crate) fn classify_clone_error(url: &str, branch: &str, stderr: &str) -> AcquisitionError {
    let lower = stderr.to_lowercase();
    if lower.contains("remote branch") && lower.contains("not found") {
        AcquisitionError::BranchNotFound {
            url: url.to_string(),
            branch: branch.to_string(),
        }
    } else if lower.contains("rate limit") || lower.contains("quota") {
        AcquisitionError::QuotaExceeded(stderr.trim().to_string())
    } else if lower.contains("repository not found")
        || lower.contains("could not read username")
        || lower.contains("could not resolve host")
        || lower.contains("authentication failed")
        || lower.contains("does not exist")
    {
        AcquisitionError::Unreachable(url.to_string())
    } else {
        let detail = stderr.trim();
        AcquisitionError::Unreachable(if detail.is_empty() {
            url.to_string()
        } else {
            format!("{}: {}", url, detail)
        })
    }
}

/// HEAD commit id of a checkout
pub(crate) fn head_commit(path: &Path) -> Option<String> {
    let repo = Repository::open(path).ok()?;
    let commit = repo.head().ok()?.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}

fn checkout_bytes(root: &Path) -> u64 {
    WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .build()
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn clear(dest: &Path) {
    if dest.exists() {
        if let Err(e) = std::fs::remove_dir_all(dest) {
            warn!("Failed to clear partial clone at {}: {}", dest.display(), e);
        }
    }
}

impl RepoFetcher for GitFetcher {
    fn fetch(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<FetchedTree, AcquisitionError> {
        let repo = RepoRef::parse(url)?;
        let deadline = Instant::now() + timeout;
        info!("Cloning {} ({})", repo.full_name(), branch);

        let mut checked_out = branch.to_string();
        match self.clone_once(&repo, branch, dest, deadline, timeout, cancel) {
            Ok(()) => {}
            Err(AcquisitionError::BranchNotFound { .. }) if branch == "main" => {
                debug!("Branch main not found, retrying with master");
                clear(dest);
                if let Err(e) = self.clone_once(&repo, "master", dest, deadline, timeout, cancel) {
                    clear(dest);
                    return Err(e);
                }
                checked_out = "master".to_string();
            }
            Err(e) => {
                clear(dest);
                return Err(e);
            }
        }

        let bytes = checkout_bytes(dest);
        if bytes > self.max_checkout_bytes {
            clear(dest);
            return Err(AcquisitionError::QuotaExceeded(format!(
                "checkout is {} bytes, limit {}",
                bytes, self.max_checkout_bytes
            )));
        }

        Ok(FetchedTree {
            root: dest.to_path_buf(),
            branch: checked_out,
            commit: head_commit(dest),
        })
    }
}
