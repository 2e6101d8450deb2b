//! Run stages and progress events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Queued; also covers repository acquisition
    Pending,
    Selecting,
    Extracting,
    /// Complexity, security and architecture in parallel
    Analyzing,
    Aggregating,
    Narrating,
    Completed,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Pending => "pending",
            Stage::Selecting => "selecting",
            Stage::Extracting => "extracting",
            Stage::Analyzing => "analyzing",
            Stage::Aggregating => "aggregating",
            Stage::Narrating => "narrating",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Broadcast on every stage transition and warning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: String,
    pub repo_url: String,
    pub branch: String,
    pub stage: Stage,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "[{}] {}: {}", self.run_id, self.stage, detail),
            None => write!(f, "[{}] {}", self.run_id, self.stage),
        }
    }
}
