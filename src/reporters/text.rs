//! Text (terminal) reporter with colors and formatting

use crate::models::{AnalysisResult, Severity};
use crate::scoring::RefactorUrgency;
use console::{style, StyledObject};

const TOP_FINDINGS: usize = 10;
const WORST_FILES: usize = 3;
const RULE: &str = "──────────────────────────────────────";

fn score_style(score: f64) -> StyledObject<String> {
    let text = format!("{:.1}", score);
    if score >= 80.0 {
        style(text).green()
    } else if score >= 60.0 {
        style(text).yellow()
    } else {
        style(text).red()
    }
}

fn severity_tag(severity: Severity) -> StyledObject<&'static str> {
    match severity {
        Severity::Critical => style("[C]").red().bold(),
        Severity::High => style("[H]").red(),
        Severity::Medium => style("[M]").yellow(),
        Severity::Low => style("[L]").blue(),
    }
}

fn urgency_style(urgency: RefactorUrgency) -> StyledObject<String> {
    let text = urgency.to_string();
    match urgency {
        RefactorUrgency::Low => style(text).green(),
        RefactorUrgency::Medium => style(text).yellow(),
        RefactorUrgency::High => style(text).red(),
        RefactorUrgency::Critical => style(text).red().bold(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}

/// Render a result as formatted terminal output
pub fn render(result: &AnalysisResult) -> String {
    let scores = &result.scores;
    let structural = &result.metrics.structural;
    let mut out = String::new();

    out.push_str(&format!(
        "\n{} {} {}\n",
        style("repolens").bold(),
        style(&result.repo_name).bold(),
        style(format!("({})", result.branch)).dim()
    ));
    out.push_str(&format!("{}\n", style(RULE).dim()));
    out.push_str(&format!(
        "Files: {}  Lines: {}  Functions: {}  Classes: {}  Time: {:.1}s\n\n",
        result.files_analyzed,
        result.total_lines,
        structural.total_functions,
        structural.total_classes,
        result.analysis_duration_seconds
    ));

    out.push_str(&format!("{}\n", style("SCORES").bold()));
    out.push_str(&format!(
        "  Security: {} ({})  Maintainability: {} ({})  Architecture: {} ({})\n",
        score_style(scores.security_score),
        scores.grades.security,
        score_style(scores.maintainability_score),
        scores.grades.maintainability,
        score_style(scores.architecture_score),
        scores.grades.architecture
    ));
    out.push_str(&format!(
        "  Tech debt: {:.1}/100  Urgency: {}  {}\n\n",
        scores.tech_debt_index,
        urgency_style(scores.refactor_urgency),
        style(scores.refactor_effort.to_string()).dim()
    ));

    let security = &result.metrics.security;
    let header = if security.has_critical() {
        style("FINDINGS").bold().red()
    } else {
        style("FINDINGS").bold()
    };
    out.push_str(&format!("{} ({} total)\n", header, security.findings.len()));
    if security.has_critical() {
        out.push_str(&format!("  {}\n", style("Critical issues present; fix these first.").red()));
    }
    let counts: Vec<String> = Severity::ALL
        .iter()
        .filter(|s| security.count(**s) > 0)
        .map(|s| format!("{} {}", security.count(*s), s))
        .collect();
    if !counts.is_empty() {
        out.push_str(&format!("  {}\n", counts.join(" | ")));
    }
    for finding in security.top_issues(TOP_FINDINGS) {
        let cwe = finding.cwe.map(|c| format!(" {}", c)).unwrap_or_default();
        out.push_str(&format!(
            "  {}  {:<40}  {}{}\n",
            severity_tag(finding.severity),
            truncate(&finding.title, 40),
            style(format!("{}:{}", truncate(&finding.file, 40), finding.line)).dim(),
            style(cwe).dim()
        ));
    }
    let remaining = security.findings.len().saturating_sub(TOP_FINDINGS);
    if remaining > 0 {
        out.push_str(&format!("  {}\n", style(format!("...and {} more (use --format json)", remaining)).dim()));
    }
    out.push('\n');

    let complexity = &result.metrics.complexity;
    let architecture = &result.metrics.architecture;
    out.push_str(&format!("{}\n", style("STRUCTURE").bold()));
    out.push_str(&format!(
        "  Avg complexity: {:.1}  High-complexity functions: {}  Smells: {}\n",
        complexity.avg_cyclomatic, complexity.high_complexity_functions, complexity.total_smells
    ));
    let worst: Vec<String> = complexity
        .worst_files(WORST_FILES)
        .into_iter()
        .map(|f| format!("{} ({:.1})", truncate(&f.path, 40), f.maintainability_index))
        .collect();
    if !worst.is_empty() {
        out.push_str(&format!("  Lowest maintainability: {}\n", worst.join(", ")));
    }
    out.push_str(&format!(
        "  Modules: {}  Dependencies: {}  Cycles: {}  Coupling: {:.2}  Cohesion: {:.2}\n",
        architecture.module_count,
        architecture.edge_count,
        architecture.cycle_count(),
        architecture.avg_coupling,
        architecture.avg_cohesion
    ));
    for cycle in architecture.cycles.iter().take(3) {
        out.push_str(&format!("  {} {}\n", style("cycle:").yellow(), cycle.join(" -> ")));
    }
    out.push('\n');

    if !result.warnings.is_empty() {
        out.push_str(&format!("{}\n", style("WARNINGS").bold().yellow()));
        for warning in &result.warnings {
            out.push_str(&format!("  - {}\n", warning));
        }
        out.push('\n');
    }

    if !result.llm_explanation.trim().is_empty() {
        out.push_str(result.llm_explanation.trim_end());
        out.push_str("\n\n");
    }

    out.push_str(&format!("{}\n", style(format!("id: {}", result.id)).dim()));
    out
}

/// One line per stored result, newest first
pub fn render_history(results: &[AnalysisResult]) -> String {
    if results.is_empty() {
        return format!("{}\n", style("No saved analyses.").dim());
    }
    let mut out = format!(
        "{}\n",
        style(format!(
            "{:<36}  {:<30}  {:>5}  {:>5}  {:>5}  {:>5}  {:<8}  {}",
            "ID", "REPOSITORY", "SEC", "MAINT", "ARCH", "DEBT", "URGENCY", "WHEN"
        ))
        .dim()
    );
    for r in results {
        out.push_str(&format!(
            "{:<36}  {:<30}  {:>5.1}  {:>5.1}  {:>5.1}  {:>5.1}  {:<8}  {}\n",
            r.id,
            truncate(&format!("{}@{}", r.repo_name, r.branch), 30),
            r.scores.security_score,
            r.scores.maintainability_score,
            r.scores.architecture_score,
            r.scores.tech_debt_index,
            r.scores.refactor_urgency.to_string(),
            r.created_at.format("%Y-%m-%d %H:%M")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::test_result;

    fn plain(s: &str) -> String {
        console::strip_ansi_codes(s).into_owned()
    }

    #[test]
    fn test_render_contains_scores_and_findings() {
        let out = plain(&render(&test_result()));
        assert!(out.contains("acme/widgets"));
        assert!(out.contains("Security: 82.5"));
        assert!(out.contains("Urgency: Low"));
        assert!(out.contains("[H]  Hardcoded password"));
        assert!(out.contains("app/settings.py:3"));
        assert!(out.contains("CWE-798"));
        assert!(out.contains("WARNINGS"));
        assert!(out.contains("## Executive Summary"));
    }

    #[test]
    fn test_render_critical_and_worst_files() {
        use crate::complexity::FileComplexity;
        use crate::security::SecurityReport;

        let mut result = test_result();
        assert!(!plain(&render(&result)).contains("Critical issues present"));
        assert!(!plain(&render(&result)).contains("Lowest maintainability"));

        let mut finding = result.metrics.security.findings[0].clone();
        finding.severity = Severity::Critical;
        result.metrics.security = SecurityReport::from_findings(vec![finding], 2, 40, Vec::new());
        result.metrics.complexity.files = [("a.py", 71.0), ("b.py", 35.5), ("c.py", 90.0), ("d.py", 52.0)]
            .into_iter()
            .map(|(path, mi)| FileComplexity {
                path: path.into(),
                maintainability_index: mi,
                ..Default::default()
            })
            .collect();

        let out = plain(&render(&result));
        assert!(out.contains("Critical issues present"));
        assert!(out.contains("[C]  Hardcoded password"));
        assert!(out.contains("Lowest maintainability: b.py (35.5), d.py (52.0), a.py (71.0)"));
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("ééééé", 10), "ééééé");
        assert_eq!(truncate("éééééééééééé", 6), "ééé...");
    }

    #[test]
    fn test_history_table() {
        let out = plain(&render_history(&[test_result()]));
        assert!(out.contains("acme/widgets@main"));
        assert!(out.contains("Low"));
        assert!(plain(&render_history(&[])).contains("No saved analyses."));
    }
}
