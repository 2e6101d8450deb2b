//! Security analyzer
//!
//! Scans every selected file line by line against the rule catalog in
//! [`catalog`]. One generic routine serves every rule; rules are data.
//!
//! Unlike the other analyzers, a failure here is never absorbed: a file that
//! cannot be read makes the whole scan fail, since an unscanned tree must not
//! be reported as clean.

pub mod catalog;

use crate::models::{deterministic_finding_id, Confidence, SecurityFinding, Severity};
use crate::parsers::{Deadline, Language};
use crate::selector::SourceFile;
use anyhow::{Context, Result};
use catalog::{compiled_rules, CompiledRule};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Snippets longer than this are cut
pub const MAX_SNIPPET_CHARS: usize = 100;

/// Lines scanned between deadline checks
const DEADLINE_CHECK_INTERVAL: usize = 256;

/// Finding counts per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

/// Output of one security scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    /// Deduplicated findings in presentation order
    pub findings: Vec<SecurityFinding>,
    pub files_scanned: usize,
    /// Physical lines across scanned files; scales the score penalty
    pub lines_scanned: usize,
    /// Files whose scan was cut short by the per-file timeout
    pub timed_out: Vec<String>,
    pub summary: SeverityCounts,
}

impl SecurityReport {
    pub fn from_findings(
        mut findings: Vec<SecurityFinding>,
        files_scanned: usize,
        lines_scanned: usize,
        mut timed_out: Vec<String>,
    ) -> Self {
        let mut seen = HashSet::new();
        findings.retain(|f| seen.insert((f.file.clone(), f.line, f.rule_id.clone())));
        findings.sort_by(SecurityFinding::presentation_order);
        timed_out.sort();

        let mut summary = SeverityCounts::default();
        for finding in &findings {
            summary.add(finding.severity);
        }

        Self {
            findings,
            files_scanned,
            lines_scanned,
            timed_out,
            summary,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.summary.get(severity)
    }

    pub fn has_critical(&self) -> bool {
        self.summary.critical > 0
    }

    /// Most pressing findings: severity, then confidence, then location
    pub fn top_issues(&self, n: usize) -> Vec<&SecurityFinding> {
        let mut issues: Vec<&SecurityFinding> = self.findings.iter().collect();
        issues.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.confidence.cmp(&a.confidence))
                .then_with(|| a.file.cmp(&b.file))
                .then_with(|| a.line.cmp(&b.line))
        });
        issues.truncate(n);
        issues
    }
}

/// Findings for a single file
#[derive(Debug, Clone, Default)]
pub struct FileScan {
    pub findings: Vec<SecurityFinding>,
    pub lines: usize,
    pub timed_out: bool,
}

/// Check if a path looks like test code
pub fn is_test_file(relative_path: &str) -> bool {
    let path = format!("/{}", relative_path.to_lowercase());
    let name = path.rsplit('/').next().unwrap_or("");
    path.contains("/test")
        || path.contains("_test.")
        || path.contains(".test.")
        || path.contains("/tests/")
        || path.contains("/spec/")
        || path.contains(".spec.")
        || name.starts_with("test_")
        || name.starts_with("conftest.")
}

fn is_comment_line(trimmed: &str, language: Language) -> bool {
    let spec = language.grammar();
    spec.line_comments.iter().any(|p| trimmed.starts_with(p))
        || (spec.block_comment.is_some() && (trimmed.starts_with("/*") || trimmed.starts_with("* ")))
}

fn snippet(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() <= MAX_SNIPPET_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_SNIPPET_CHARS - 3).collect();
    format!("{}...", cut)
}

fn finding(rule: &CompiledRule, file: &str, line_no: u32, line: &str, test_file: bool) -> SecurityFinding {
    let rule = rule.rule;
    let confidence = if test_file {
        rule.confidence.lowered()
    } else {
        rule.confidence
    };
    SecurityFinding {
        id: deterministic_finding_id(rule.class, file, line_no),
        rule_id: rule.class.to_string(),
        severity: rule.severity,
        confidence,
        cwe: rule.cwe(),
        file: file.to_string(),
        line: line_no,
        title: rule.title.to_string(),
        description: rule.description.to_string(),
        recommendation: rule.recommendation.to_string(),
        snippet: snippet(line),
    }
}

/// Scan one file's content.
///
/// When `deadline` expires mid-file, scanning stops; findings gathered so
/// far are kept and the scan is marked timed out.
pub fn scan_source(relative_path: &str, language: Language, content: &str, deadline: Deadline<'_>) -> FileScan {
    let rules: Vec<&CompiledRule> = compiled_rules()
        .iter()
        .filter(|r| r.rule.applies_to(language))
        .collect();
    let test_file = is_test_file(relative_path);
    let mut scan = FileScan {
        lines: content.lines().count(),
        ..Default::default()
    };
    let mut seen: HashSet<(u32, &'static str)> = HashSet::new();

    for (idx, line) in content.lines().enumerate() {
        if idx % DEADLINE_CHECK_INTERVAL == 0 && idx > 0 && deadline.expired() {
            scan.timed_out = true;
            break;
        }

        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let comment = is_comment_line(trimmed, language);
        let line_no = (idx + 1) as u32;

        for rule in &rules {
            if comment && !rule.rule.in_comments {
                continue;
            }
            if !rule.regex.is_match(line) {
                continue;
            }
            if rule.exclude.as_ref().map(|e| e.is_match(line)).unwrap_or(false) {
                continue;
            }
            if seen.insert((line_no, rule.rule.class)) {
                scan.findings.push(finding(rule, relative_path, line_no, line, test_file));
            }
        }
    }

    scan
}

/// Read and scan one file
pub fn scan_file(file: &SourceFile, per_file_timeout: Duration, cancel: &CancellationToken) -> Result<FileScan> {
    let bytes = std::fs::read(&file.path)
        .with_context(|| format!("Failed to read {} for security scan", file.relative_path))?;
    let content = String::from_utf8_lossy(&bytes);
    let deadline = Deadline::after(per_file_timeout).or_cancelled(cancel);
    let scan = scan_source(&file.relative_path, file.language, &content, deadline);
    if scan.timed_out && !cancel.is_cancelled() {
        warn!(
            "Security scan of {} exceeded {:?}; keeping {} partial findings",
            file.relative_path,
            per_file_timeout,
            scan.findings.len()
        );
    }
    Ok(scan)
}

/// Scan all files in parallel.
///
/// Fails when `cancel` fires before every file was scanned, since a partial
/// scan must not be reported as clean.
pub fn analyze(files: &[SourceFile], per_file_timeout: Duration, cancel: &CancellationToken) -> Result<SecurityReport> {
    if compiled_rules().is_empty() {
        anyhow::bail!("Security rule catalog is empty");
    }

    let scans: Vec<(String, FileScan)> = files
        .par_iter()
        .map(|file| {
            if cancel.is_cancelled() {
                return Ok((file.relative_path.clone(), FileScan::default()));
            }
            scan_file(file, per_file_timeout, cancel).map(|s| (file.relative_path.clone(), s))
        })
        .collect::<Result<_>>()?;
    if cancel.is_cancelled() {
        anyhow::bail!("Security scan cancelled");
    }

    let mut findings = Vec::new();
    let mut timed_out = Vec::new();
    let mut lines = 0;
    for (path, scan) in scans {
        if scan.timed_out {
            timed_out.push(path);
        }
        lines += scan.lines;
        findings.extend(scan.findings);
    }

    let report = SecurityReport::from_findings(findings, files.len(), lines, timed_out);
    debug!("Security summary: {:?}", report.summary);
    info!(
        "Security scan found {} issues in {} files",
        report.findings.len(),
        report.files_scanned
    );
    Ok(report)
}
