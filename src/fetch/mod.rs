//! Repository acquisition
//!
//! A [`RepoFetcher`] brings a repository onto local storage under a
//! directory owned by the calling run. Fetchers are blocking; the
//! orchestrator runs them on the blocking pool under its own deadline.

mod git;
mod local;

pub use git::GitFetcher;
pub use local::LocalFetcher;

use crate::error::AcquisitionError;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A checked-out tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedTree {
    pub root: PathBuf,
    /// Branch actually checked out (may differ after a main -> master fallback)
    pub branch: String,
    /// HEAD commit id, when the tree is a git checkout
    pub commit: Option<String>,
}

/// Brings a repository onto local storage
pub trait RepoFetcher: Send + Sync {
    /// Fetch `url` at `branch` into `dest`, which must not exist yet.
    ///
    /// Implementations stop with [`AcquisitionError::Cancelled`] soon after
    /// `cancel` fires.
    fn fetch(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<FetchedTree, AcquisitionError>;

    /// Identify the repository behind `url` without fetching it
    fn repo_ref(&self, url: &str) -> Result<RepoRef, AcquisitionError> {
        RepoRef::parse(url)
    }
}

/// Owner and name of a hosted repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    /// URL handed to `git clone`
    pub clone_url: String,
}

impl RepoRef {
    /// `owner/repo`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Parse a repository URL.
    ///
    /// GitHub URLs (`https://github.com/o/r`, `git@github.com:o/r.git`,
    /// `github.com/o/r`) are normalized to `https://github.com/o/r.git`.
    /// Other http(s) hosts are cloned as given.
    pub fn parse(url: &str) -> Result<Self, AcquisitionError> {
        static GITHUB: OnceLock<Vec<Regex>> = OnceLock::new();
        static GENERIC: OnceLock<Option<Regex>> = OnceLock::new();

        let url = url.trim();
        let invalid = || AcquisitionError::InvalidUrl(url.to_string());

        let github = GITHUB.get_or_init(|| {
            [
                r"^https?://(?:www\.)?github\.com/([\w.-]+)/([\w.-]+?)(?:\.git)?/?$",
                r"^git@github\.com:([\w.-]+)/([\w.-]+?)(?:\.git)?$",
                r"^github\.com/([\w.-]+)/([\w.-]+?)(?:\.git)?/?$",
            ]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
        });
        for re in github {
            if let Some(caps) = re.captures(url) {
                let owner = caps[1].to_string();
                let name = caps[2].to_string();
                if name.is_empty() || name == "." || name == ".." {
                    return Err(invalid());
                }
                return Ok(Self {
                    clone_url: format!("https://github.com/{}/{}.git", owner, name),
                    owner,
                    name,
                });
            }
        }

        let generic = GENERIC
            .get_or_init(|| Regex::new(r"^https?://[\w.-]+(?::\d+)?/((?:[\w.-]+/)+)([\w.-]+?)(?:\.git)?/?$").ok());
        if let Some(caps) = generic.as_ref().and_then(|re| re.captures(url)) {
            let owner = caps[1].trim_end_matches('/').split('/').next().unwrap_or("");
            let name = &caps[2];
            if owner.is_empty() || name.is_empty() {
                return Err(invalid());
            }
            return Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
                clone_url: url.to_string(),
            });
        }

        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_github_forms() {
        for url in [
            "https://github.com/acme/widgets",
            "https://github.com/acme/widgets.git",
            "https://github.com/acme/widgets/",
            "git@github.com:acme/widgets.git",
            "github.com/acme/widgets",
        ] {
            let r = RepoRef::parse(url).expect("should parse github url");
            assert_eq!(r.full_name(), "acme/widgets", "{}", url);
            assert_eq!(r.clone_url, "https://github.com/acme/widgets.git");
        }
    }

    #[test]
    fn test_parse_other_hosts() {
        let r = RepoRef::parse("https://gitlab.example.org/group/sub/project.git").unwrap();
        assert_eq!(r.owner, "group");
        assert_eq!(r.name, "project");
        assert_eq!(r.clone_url, "https://gitlab.example.org/group/sub/project.git");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for url in ["", "not a url", "https://github.com/onlyowner", "ftp://host/a/b"] {
            assert!(
                matches!(RepoRef::parse(url), Err(AcquisitionError::InvalidUrl(_))),
                "{}",
                url
            );
        }
    }
}
