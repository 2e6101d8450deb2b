//! Core data models for repolens
//!
//! Findings, CWE identifiers and the persisted [`AnalysisResult`] record.
//! Everything here is plain serde data; no analysis logic lives in this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::architecture::ArchitectureMetrics;
use crate::complexity::ComplexityReport;
use crate::scoring::ScoreSet;
use crate::security::SecurityReport;

/// Severity level for security findings
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, most severe first
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// How likely a pattern match is a real vulnerability
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    #[default]
    Medium,
    High,
}

impl Confidence {
    /// Multiplier applied to a finding's severity weight
    pub fn weight(self) -> f64 {
        match self {
            Confidence::High => 1.0,
            Confidence::Medium => 0.7,
            Confidence::Low => 0.4,
        }
    }

    /// One step less certain (Low stays Low)
    pub fn lowered(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium | Confidence::Low => Confidence::Low,
        }
    }
}

/// A Common Weakness Enumeration identifier.
///
/// Only the numeric part is stored, so a malformed id cannot exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cwe(pub u32);

impl fmt::Display for Cwe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CWE-{}", self.0)
    }
}

impl FromStr for Cwe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().strip_prefix("CWE-").unwrap_or(s.trim());
        match digits.parse::<u32>() {
            Ok(n) if n > 0 => Ok(Cwe(n)),
            _ => Err(format!("invalid CWE identifier '{}'", s)),
        }
    }
}

impl Cwe {
    /// Parse leniently: anything malformed becomes `None`
    pub fn parse(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl Serialize for Cwe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Cwe {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One vulnerability instance found by the security scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityFinding {
    /// Stable id derived from (file, line, rule)
    pub id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub confidence: Confidence,
    pub cwe: Option<Cwe>,
    /// Path relative to the repository root
    pub file: String,
    pub line: u32,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    /// Offending line, truncated
    pub snippet: String,
}

impl SecurityFinding {
    /// Ordering used everywhere findings are presented:
    /// severity descending, then path, then line, then rule.
    pub fn presentation_order(a: &Self, b: &Self) -> std::cmp::Ordering {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.file.cmp(&b.file))
            .then_with(|| a.line.cmp(&b.line))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    }
}

/// Generate a deterministic finding ID from rule, file and line.
pub fn deterministic_finding_id(rule_id: &str, file: &str, line: u32) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(file.as_bytes());
    hasher.update([0u8]);
    hasher.update(line.to_le_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Structural facts about the analyzed tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralMetrics {
    pub files_selected: usize,
    pub files_parsed: usize,
    pub files_unparseable: usize,
    pub files_timed_out: usize,
    pub files_skipped: usize,
    pub selection_truncated: bool,
    pub total_functions: usize,
    pub total_classes: usize,
    pub total_imports: usize,
    pub code_lines: usize,
    pub comment_lines: usize,
    /// Files per language name
    pub languages: std::collections::BTreeMap<String, usize>,
    /// HEAD commit of the fetched checkout, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// All per-dimension metrics of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    pub structural: StructuralMetrics,
    pub complexity: ComplexityReport,
    pub security: SecurityReport,
    pub architecture: ArchitectureMetrics,
}

/// The persisted record of one completed analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    /// `owner/repo`
    pub repo_name: String,
    pub repo_url: String,
    pub branch: String,
    pub metrics: AnalysisMetrics,
    pub scores: ScoreSet,
    pub llm_explanation: String,
    pub files_analyzed: usize,
    pub total_lines: usize,
    pub analysis_duration_seconds: f64,
    /// Absorbed analyzer failures and skipped work
    #[serde(default)]
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Owner segment of `repo_name` (`owner/repo` -> `owner`)
    pub fn owner(&self) -> &str {
        self.repo_name.split('/').next().unwrap_or("")
    }
}
