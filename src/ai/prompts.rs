//! Prompt construction and the deterministic fallback narrative

use crate::models::{AnalysisMetrics, Severity};
use crate::scoring::{RefactorUrgency, ScoreSet};
use crate::security::SecurityReport;
use serde_json::json;

/// Prompts longer than this are cut before sending
pub const MAX_PROMPT_CHARS: usize = 4000;

/// Findings included in the prompt
const PROMPT_TOP_FINDINGS: usize = 10;
const PROMPT_DESCRIPTION_CHARS: usize = 100;

pub const NARRATIVE_SYSTEM_PROMPT: &str = "You are a senior software architect providing code \
     analysis insights. Be concise, specific, and actionable. Use Markdown formatting.";

fn clip(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Build the explanation prompt from computed results only.
pub fn build_analysis_prompt(repo_name: &str, scores: &ScoreSet, metrics: &AnalysisMetrics) -> String {
    let security = &metrics.security;
    let complexity = &metrics.complexity;
    let architecture = &metrics.architecture;

    let top_issues: Vec<_> = security
        .top_issues(PROMPT_TOP_FINDINGS)
        .into_iter()
        .map(|f| {
            json!({
                "title": f.title,
                "severity": f.severity,
                "cwe": f.cwe,
                "file": f.file,
                "description": clip(&f.description, PROMPT_DESCRIPTION_CHARS),
            })
        })
        .collect();

    let summary = json!({
        "repository": repo_name,
        "scores": {
            "security": round1(scores.security_score),
            "maintainability": round1(scores.maintainability_score),
            "architecture": round1(scores.architecture_score),
            "tech_debt_index": round1(scores.tech_debt_index),
            "refactor_urgency": scores.refactor_urgency.to_string(),
        },
        "structure": {
            "files": metrics.structural.files_selected,
            "languages": metrics.structural.languages,
            "functions": metrics.structural.total_functions,
            "classes": metrics.structural.total_classes,
        },
        "security": {
            "total_issues": security.findings.len(),
            "critical_count": security.summary.critical,
            "high_count": security.summary.high,
            "medium_count": security.summary.medium,
            "low_count": security.summary.low,
            "top_issues": top_issues,
        },
        "maintainability": {
            "avg_complexity": round1(complexity.avg_cyclomatic),
            "avg_maintainability_index": round1(complexity.avg_maintainability_index),
            "high_complexity_functions": complexity.high_complexity_functions,
            "comment_density": round1(complexity.comment_density * 100.0),
            "code_smells": complexity.total_smells,
        },
        "architecture": {
            "total_modules": architecture.module_count,
            "circular_dependencies": architecture.cycle_count(),
            "hub_modules": architecture.hub_modules.len(),
            "god_modules": architecture.god_modules.len(),
            "modularity_score": round1(architecture.modularity),
        },
    });

    let summary_json = serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string());

    let prompt = format!(
        "You are a senior software architect reviewing code analysis results. Based on the \
following JSON summary of static analysis metrics (NOT raw code), provide a concise, actionable \
explanation.

ANALYSIS SUMMARY:
```json
{}
```

Provide your response in Markdown format with these sections:

## Executive Summary
A 2-3 sentence overview of the codebase health.

## Key Findings
List the 3-5 most important findings as bullet points.

## Security Assessment
Brief assessment of security posture and critical issues to address.

## Maintainability Assessment
Brief assessment of code maintainability and complexity concerns.

## Recommended Actions
Numbered list of 3-5 prioritized actions to improve the codebase.

Keep your response concise (under 400 words). Reference specific metrics from the analysis.",
        summary_json
    );

    truncate_for_token_limit(&prompt, MAX_PROMPT_CHARS)
}

/// Cut `prompt` to at most `max_chars` characters plus a short notice,
/// preferring to end on a closing brace near the limit.
pub fn truncate_for_token_limit(prompt: &str, max_chars: usize) -> String {
    if prompt.chars().count() <= max_chars {
        return prompt.to_string();
    }

    let mut truncated: String = prompt.chars().take(max_chars).collect();
    if let Some(brace) = truncated.rfind('}') {
        if truncated[..brace].chars().count() as f64 > max_chars as f64 * 0.7 {
            truncated.truncate(brace + 1);
        }
    }
    truncated.push_str("\n```\n[Summary truncated for length]\n");
    truncated
}

/// Markdown explanation used whenever the narrative service is unavailable.
///
/// Depends only on its inputs, so identical analyses get identical text.
pub fn fallback_explanation(scores: &ScoreSet, security: &SecurityReport) -> String {
    let avg = scores.overall();
    let (status, description) = if avg >= 80.0 {
        ("healthy", "The codebase is in good condition.")
    } else if avg >= 60.0 {
        ("fair", "The codebase has some areas needing attention.")
    } else if avg >= 40.0 {
        ("concerning", "The codebase requires significant improvements.")
    } else {
        ("critical", "The codebase needs immediate attention.")
    };

    let mut lines = vec![
        "## Executive Summary".to_string(),
        format!("The codebase is in **{}** condition. {}", status, description),
        String::new(),
        "## Key Metrics".to_string(),
        format!("- **Security Score:** {:.1}/100", scores.security_score),
        format!("- **Maintainability Score:** {:.1}/100", scores.maintainability_score),
        format!("- **Architecture Score:** {:.1}/100", scores.architecture_score),
        format!("- **Technical Debt Index:** {:.1}/100", scores.tech_debt_index),
        format!("- **Refactor Urgency:** {}", scores.refactor_urgency),
        format!("- **Estimated Effort:** {}", scores.refactor_effort),
        String::new(),
        "## Security Overview".to_string(),
    ];

    let total = security.findings.len();
    if total == 0 {
        lines.push("No security vulnerabilities detected.".to_string());
    } else {
        lines.push(format!("Found {} security issues.", total));
        for severity in Severity::ALL {
            let count = security.count(severity);
            if count == 0 {
                continue;
            }
            let note = match severity {
                Severity::Critical => "require immediate attention",
                Severity::High => "should be addressed soon",
                Severity::Medium => "should be reviewed",
                Severity::Low => "are low risk",
            };
            lines.push(format!("- **{} {}** issues {}.", count, severity, note));
        }
    }

    lines.push(String::new());
    lines.push("## Recommendations".to_string());
    let recommendations: [&str; 3] = match scores.refactor_urgency {
        RefactorUrgency::Critical => [
            "1. **Immediate:** Address all critical security vulnerabilities.",
            "2. **Short-term:** Reduce complexity in high-complexity functions.",
            "3. **Medium-term:** Refactor architectural issues.",
        ],
        RefactorUrgency::High => [
            "1. Fix high-severity security issues.",
            "2. Improve documentation coverage.",
            "3. Address circular dependencies.",
        ],
        RefactorUrgency::Medium => [
            "1. Schedule time to fix outstanding security findings.",
            "2. Split the most complex functions and files.",
            "3. Review module boundaries for tight coupling.",
        ],
        RefactorUrgency::Low => [
            "1. Maintain current code quality standards.",
            "2. Address any remaining warnings.",
            "3. Consider incremental improvements.",
        ],
    };
    lines.extend(recommendations.iter().map(|s| s.to_string()));

    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(
        "*This is an automated summary. Configure an LLM backend for a detailed explanation.*"
            .to_string(),
    );

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, Cwe, SecurityFinding};

    fn finding(severity: Severity, line: u32) -> SecurityFinding {
        SecurityFinding {
            id: format!("f{}", line),
            rule_id: "hardcoded-password".into(),
            severity,
            confidence: Confidence::Medium,
            cwe: Some(Cwe(798)),
            file: "app/settings.py".into(),
            line,
            title: "Hardcoded password".into(),
            description: "A password literal is assigned in source".into(),
            recommendation: "Load it from the environment".into(),
            snippet: "PASSWORD = \"...\"".into(),
        }
    }

    #[test]
    fn test_prompt_contains_summary_not_source() {
        let mut metrics = AnalysisMetrics::default();
        metrics.security = SecurityReport::from_findings(vec![finding(Severity::High, 3)], 1, 10, Vec::new());
        let prompt = build_analysis_prompt("acme/widgets", &ScoreSet::neutral(), &metrics);

        assert!(prompt.contains("\"repository\": \"acme/widgets\""));
        assert!(prompt.contains("Hardcoded password"));
        assert!(prompt.contains("CWE-798"));
        assert!(!prompt.contains("PASSWORD = "));
        assert!(prompt.chars().count() <= MAX_PROMPT_CHARS + 40);
    }

    #[test]
    fn test_truncate_for_token_limit() {
        assert_eq!(truncate_for_token_limit("short", 100), "short");

        let long = format!("{{\"a\": \"{}\"}}{}", "x".repeat(80), "y".repeat(50));
        let cut = truncate_for_token_limit(&long, 100);
        assert!(cut.ends_with("[Summary truncated for length]\n"));
        assert!(cut.starts_with("{\"a\""));
        // ends on the closing brace of the JSON object
        assert!(cut.contains("}\n```"));

        // multi-byte input is cut on a char boundary
        let wide = "é".repeat(50);
        assert!(truncate_for_token_limit(&wide, 10).starts_with(&"é".repeat(10)));
    }

    #[test]
    fn test_fallback_health_bands() {
        let neutral = fallback_explanation(&ScoreSet::neutral(), &SecurityReport::default());
        assert!(neutral.contains("**healthy**"));
        assert!(neutral.contains("No security vulnerabilities detected."));
        assert!(neutral.contains("Maintain current code quality standards."));

        let mut poor = ScoreSet::neutral();
        poor.security_score = 20.0;
        poor.maintainability_score = 30.0;
        poor.architecture_score = 40.0;
        poor.refactor_urgency = RefactorUrgency::Critical;
        let text = fallback_explanation(&poor, &SecurityReport::default());
        assert!(text.contains("**critical**"));
        assert!(text.contains("**Immediate:**"));
    }

    #[test]
    fn test_fallback_counts_severities() {
        let report = SecurityReport::from_findings(
            vec![finding(Severity::Critical, 1), finding(Severity::High, 2), finding(Severity::High, 3)],
            1,
            10,
            Vec::new(),
        );
        let text = fallback_explanation(&ScoreSet::neutral(), &report);
        assert!(text.contains("Found 3 security issues."));
        assert!(text.contains("**1 critical** issues"));
        assert!(text.contains("**2 high** issues"));
        assert_eq!(text, fallback_explanation(&ScoreSet::neutral(), &report));
    }
}
