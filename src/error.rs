//! Error taxonomy for an analysis run
//!
//! Only two kinds of failure ever reach a caller as a failed run: the
//! repository could not be acquired, or the analysis itself broke in a way
//! that cannot be absorbed (security scanner failure, overall timeout,
//! cancellation). Per-file and per-dimension problems are recorded as
//! warnings on the result instead.
//!
//! All variants carry owned strings so errors can be cloned and handed to
//! every caller attached to a coalesced run.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Repository could not be brought onto local storage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("Invalid repository URL '{0}'")]
    InvalidUrl(String),

    #[error("Repository unreachable: {0}")]
    Unreachable(String),

    #[error("Branch '{branch}' not found in {url}")]
    BranchNotFound { url: String, branch: String },

    #[error("Repository exceeds size quota: {0}")]
    QuotaExceeded(String),

    #[error("Fetching repository timed out after {0}s")]
    Timeout(u64),

    #[error("Fetch was cancelled")]
    Cancelled,

    #[error("IO error while fetching repository: {0}")]
    Io(String),
}

impl From<std::io::Error> for AcquisitionError {
    fn from(e: std::io::Error) -> Self {
        AcquisitionError::Io(e.to_string())
    }
}

/// Analysis dimension, used to tag analyzer failures and warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Complexity,
    Security,
    Architecture,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Complexity => write!(f, "complexity"),
            Dimension::Security => write!(f, "security"),
            Dimension::Architecture => write!(f, "architecture"),
        }
    }
}

/// Why a run ended without an [`AnalysisResult`](crate::models::AnalysisResult)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Could not access repository: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("{dimension} analysis failed: {message}")]
    Analyzer {
        dimension: Dimension,
        message: String,
    },

    #[error("Analysis timed out during {stage} after {seconds}s")]
    Timeout { stage: String, seconds: u64 },

    #[error("Analysis was cancelled")]
    Cancelled,

    #[error("Internal analysis failure: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// True when the repository itself was the problem (bad URL, missing
    /// branch, unreachable host) rather than the analysis.
    pub fn is_repository_error(&self) -> bool {
        matches!(self, AnalysisError::Acquisition(e) if *e != AcquisitionError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_distinguished() {
        let err: AnalysisError = AcquisitionError::BranchNotFound {
            url: "https://github.com/a/b".into(),
            branch: "dev".into(),
        }
        .into();
        assert!(err.is_repository_error());
        assert!(err.to_string().starts_with("Could not access repository"));

        let err = AnalysisError::Analyzer {
            dimension: Dimension::Security,
            message: "boom".into(),
        };
        assert!(!err.is_repository_error());
        assert_eq!(err.to_string(), "security analysis failed: boom");

        let err: AnalysisError = AcquisitionError::Cancelled.into();
        assert!(!err.is_repository_error());
    }
}
