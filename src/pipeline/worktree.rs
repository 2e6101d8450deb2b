//! Per-run working directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Temporary directory owned by exactly one run.
///
/// Removed when dropped, whichever way the run ends.
#[derive(Debug)]
pub struct WorkTree {
    path: PathBuf,
}

impl WorkTree {
    /// Create `work_root/<run_id>`. Fails if it already exists.
    pub fn create(work_root: &Path, run_id: &str) -> io::Result<Self> {
        fs::create_dir_all(work_root)?;
        let path = work_root.join(run_id);
        fs::create_dir(&path)?;
        debug!("Created work tree {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the fetcher places the checkout
    pub fn checkout_dir(&self) -> PathBuf {
        self.path.join("repo")
    }
}

impl Drop for WorkTree {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed work tree {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove work tree {}: {}", self.path.display(), e),
        }
    }
}
