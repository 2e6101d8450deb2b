//! Local directory "fetcher"
//!
//! Copies a directory on disk into the run's work tree so local analysis
//! goes through the same pipeline (and the same cleanup) as a clone.

use super::{FetchedTree, RepoFetcher, RepoRef};
use crate::error::AcquisitionError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Treats the repository URL as a local path
#[derive(Debug, Clone, Default)]
pub struct LocalFetcher;

impl LocalFetcher {
    pub fn new() -> Self {
        Self
    }

    fn source_path(url: &str) -> PathBuf {
        PathBuf::from(url.strip_prefix("file://").unwrap_or(url))
    }
}

/// Stops between entries once `deadline` passes or `cancel` fires
struct CopyLimits<'a> {
    deadline: Instant,
    timeout: Duration,
    cancel: &'a CancellationToken,
}

impl CopyLimits<'_> {
    fn check(&self) -> Result<(), AcquisitionError> {
        if self.cancel.is_cancelled() {
            Err(AcquisitionError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Err(AcquisitionError::Timeout(self.timeout.as_secs()))
        } else {
            Ok(())
        }
    }
}

fn copy_tree(src: &Path, dest: &Path, limits: &CopyLimits) -> Result<u64, AcquisitionError> {
    fs::create_dir_all(dest)?;
    let mut copied = 0;
    let mut entries: Vec<_> = fs::read_dir(src)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        limits.check()?;
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        let target = dest.join(&name);
        if file_type.is_dir() {
            if name == ".git" {
                continue;
            }
            copied += copy_tree(&entry.path(), &target, limits)?;
        } else if file_type.is_file() {
            copied += fs::copy(entry.path(), &target)?;
        }
        // symlinks are not followed
    }
    Ok(copied)
}

impl RepoFetcher for LocalFetcher {
    fn fetch(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<FetchedTree, AcquisitionError> {
        let src = Self::source_path(url);
        if !src.is_dir() {
            return Err(AcquisitionError::Unreachable(format!(
                "{} is not a directory",
                src.display()
            )));
        }
        let limits = CopyLimits {
            deadline: Instant::now() + timeout,
            timeout,
            cancel,
        };
        let bytes = copy_tree(&src, dest, &limits)?;
        debug!("Copied {} bytes from {}", bytes, src.display());

        Ok(FetchedTree {
            root: dest.to_path_buf(),
            branch: branch.to_string(),
            commit: super::git::head_commit(&src),
        })
    }

    fn repo_ref(&self, url: &str) -> Result<RepoRef, AcquisitionError> {
        let src = Self::source_path(url);
        let name = src
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .or_else(|| src.file_name().map(|n| n.to_string_lossy().into_owned()))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AcquisitionError::InvalidUrl(url.to_string()))?;
        Ok(RepoRef {
            owner: "local".to_string(),
            name,
            clone_url: src.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_copies_tree_without_git_dir() {
        let src = tempdir().unwrap();
        fs::create_dir_all(src.path().join("pkg")).unwrap();
        fs::create_dir_all(src.path().join(".git/objects")).unwrap();
        fs::write(src.path().join("pkg/a.py"), "x = 1\n").unwrap();
        fs::write(src.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();

        let work = tempdir().unwrap();
        let dest = work.path().join("tree");
        let url = src.path().to_string_lossy().to_string();
        let tree = LocalFetcher::new()
            .fetch(&url, "main", &dest, Duration::from_secs(10), &CancellationToken::new())
            .unwrap();

        assert_eq!(tree.root, dest);
        assert!(dest.join("pkg/a.py").is_file());
        assert!(!dest.join(".git").exists());
    }

    #[test]
    fn test_missing_source_unreachable() {
        let work = tempdir().unwrap();
        let err = LocalFetcher::new()
            .fetch(
                "/no/such/dir/anywhere",
                "main",
                &work.path().join("t"),
                Duration::from_secs(1),
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Unreachable(_)));
    }

    #[test]
    fn test_cancelled_copy_stops() {
        let src = tempdir().unwrap();
        fs::write(src.path().join("a.py"), "x = 1\n").unwrap();
        let work = tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = LocalFetcher::new()
            .fetch(
                &src.path().to_string_lossy(),
                "local",
                &work.path().join("t"),
                Duration::from_secs(10),
                &cancel,
            )
            .unwrap_err();
        assert_eq!(err, AcquisitionError::Cancelled);
        assert!(!work.path().join("t/a.py").exists());
    }

    #[test]
    fn test_repo_ref_uses_directory_name() {
        let src = tempdir().unwrap();
        let project = src.path().join("my-project");
        fs::create_dir_all(&project).unwrap();
        let r = LocalFetcher::new()
            .repo_ref(&project.to_string_lossy())
            .unwrap();
        assert_eq!(r.full_name(), "local/my-project");
    }
}
