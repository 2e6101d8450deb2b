//! Output reporters for analysis results
//!
//! - `text` - Terminal output with colors
//! - `json` - The persisted `AnalysisResult` shape, pretty-printed

mod json;
mod text;

pub use text::render_history;

use crate::models::AnalysisResult;
use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" | "terminal" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!("Unknown format '{}'. Valid formats: text, json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Render a result in the given format
pub fn report(result: &AnalysisResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(text::render(result)),
        OutputFormat::Json => json::render(result),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{AnalysisMetrics, Confidence, Cwe, SecurityFinding, Severity};
    use crate::scoring::ScoreSet;
    use crate::security::SecurityReport;

    /// A small completed result with one finding
    pub(crate) fn test_result() -> AnalysisResult {
        let finding = SecurityFinding {
            id: "f1".into(),
            rule_id: "hardcoded-password".into(),
            severity: Severity::High,
            confidence: Confidence::Medium,
            cwe: Some(Cwe(798)),
            file: "app/settings.py".into(),
            line: 3,
            title: "Hardcoded password".into(),
            description: "A password literal is assigned in source".into(),
            recommendation: "Load it from the environment".into(),
            snippet: "DB_PASSWORD = \"hunter2secret\"".into(),
        };
        let mut metrics = AnalysisMetrics::default();
        metrics.security = SecurityReport::from_findings(vec![finding], 2, 40, Vec::new());
        let mut scores = ScoreSet::neutral();
        scores.security_score = 82.5;

        AnalysisResult {
            id: "3f2b9c1e-0000-4000-8000-000000000001".into(),
            repo_name: "acme/widgets".into(),
            repo_url: "https://github.com/acme/widgets".into(),
            branch: "main".into(),
            metrics,
            scores,
            llm_explanation: "## Executive Summary\nFine.".into(),
            files_analyzed: 2,
            total_lines: 40,
            analysis_duration_seconds: 1.25,
            warnings: vec!["1 files could not be parsed".into()],
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(OutputFormat::from_str("text").unwrap(), OutputFormat::Text);
        assert_eq!(OutputFormat::from_str("JSON").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::from_str("sarif").is_err());
    }
}
