//! Health scoring
//!
//! Turns the three analyzer outputs into normalized 0-100 scores, the
//! weighted technical-debt index and a refactor-urgency bucket.
//!
//! # Scoring Formula
//!
//! ```text
//! Security        = 100 - Σ severity_weight × confidence × size_factor
//!   size_factor   = 1 / sqrt(1 + lines / 1000)
//!
//! Maintainability = 0.35 × MI + 0.30 × complexity
//!                 + 0.20 × documentation + 0.15 × readability
//!
//! Architecture    = 0.35 × cycle_freedom + 0.25 × coupling
//!                 + 0.20 × cohesion + 0.20 × modularity - issue_penalty
//!
//! Debt index      = 0.35 × (100 - security) + 0.30 × (100 - maintainability)
//!                 + 0.25 × (100 - architecture) + 0.10 × code_smell_debt
//! ```
//!
//! # Urgency
//!
//! | Debt index | Urgency  |
//! |------------|----------|
//! | < 25       | Low      |
//! | < 50       | Medium   |
//! | < 75       | High     |
//! | ≥ 75       | Critical |
//!
//! Aggregation is pure. Per-item contributions are sorted before they are
//! summed, so the same multiset of inputs always yields bit-identical scores.

pub mod weights;

use crate::architecture::ArchitectureMetrics;
use crate::complexity::ComplexityReport;
use crate::security::SecurityReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use weights::*;

pub use weights::ScoreWeights;

/// Discrete refactor urgency derived from the debt index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RefactorUrgency {
    Low,
    Medium,
    High,
    Critical,
}

impl RefactorUrgency {
    /// Step function over the debt index; each band includes its lower bound
    pub fn from_index(index: f64) -> Self {
        if index >= URGENCY_CRITICAL_FROM {
            RefactorUrgency::Critical
        } else if index >= URGENCY_HIGH_FROM {
            RefactorUrgency::High
        } else if index >= URGENCY_MEDIUM_FROM {
            RefactorUrgency::Medium
        } else {
            RefactorUrgency::Low
        }
    }
}

impl fmt::Display for RefactorUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RefactorUrgency::Low => "Low",
            RefactorUrgency::Medium => "Medium",
            RefactorUrgency::High => "High",
            RefactorUrgency::Critical => "Critical",
        };
        write!(f, "{}", s)
    }
}

/// Letter grade for a single score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= GRADE_A {
            Grade::A
        } else if score >= GRADE_B {
            Grade::B
        } else if score >= GRADE_C {
            Grade::C
        } else if score >= GRADE_D {
            Grade::D
        } else {
            Grade::F
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grades {
    pub security: Grade,
    pub maintainability: Grade,
    pub architecture: Grade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EffortLevel {
    Minimal,
    Light,
    Moderate,
    Significant,
    Major,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodebaseSize {
    Small,
    Medium,
    Large,
}

/// Qualitative estimate of the work needed to pay down the debt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactorEffort {
    pub level: EffortLevel,
    pub codebase: CodebaseSize,
}

impl RefactorEffort {
    pub fn estimate(debt_index: f64, total_lines: usize) -> Self {
        let level = if debt_index >= EFFORT_MAJOR_FROM {
            EffortLevel::Major
        } else if debt_index >= EFFORT_SIGNIFICANT_FROM {
            EffortLevel::Significant
        } else if debt_index >= EFFORT_MODERATE_FROM {
            EffortLevel::Moderate
        } else if debt_index >= EFFORT_LIGHT_FROM {
            EffortLevel::Light
        } else {
            EffortLevel::Minimal
        };
        let codebase = if total_lines > LARGE_CODEBASE_LINES {
            CodebaseSize::Large
        } else if total_lines > MEDIUM_CODEBASE_LINES {
            CodebaseSize::Medium
        } else {
            CodebaseSize::Small
        };
        Self { level, codebase }
    }
}

impl fmt::Display for RefactorEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = match self.codebase {
            CodebaseSize::Small => "small",
            CodebaseSize::Medium => "medium",
            CodebaseSize::Large => "large",
        };
        write!(f, "{:?} effort ({} codebase)", self.level, size)
    }
}

/// Final verdict of one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub security_score: f64,
    pub maintainability_score: f64,
    pub architecture_score: f64,
    pub tech_debt_index: f64,
    pub refactor_urgency: RefactorUrgency,
    pub code_smell_debt: f64,
    pub grades: Grades,
    pub refactor_effort: RefactorEffort,
}

impl ScoreSet {
    /// Scores of a tree with nothing to analyze
    pub fn neutral() -> Self {
        Self::from_scores(100.0, 100.0, 100.0, 0.0, 0, &ScoreWeights::default())
    }

    fn from_scores(
        security: f64,
        maintainability: f64,
        architecture: f64,
        code_smell_debt: f64,
        total_lines: usize,
        weights: &ScoreWeights,
    ) -> Self {
        let tech_debt_index = tech_debt_index(security, maintainability, architecture, code_smell_debt, weights);
        Self {
            security_score: security,
            maintainability_score: maintainability,
            architecture_score: architecture,
            tech_debt_index,
            refactor_urgency: RefactorUrgency::from_index(tech_debt_index),
            code_smell_debt,
            grades: Grades {
                security: Grade::from_score(security),
                maintainability: Grade::from_score(maintainability),
                architecture: Grade::from_score(architecture),
            },
            refactor_effort: RefactorEffort::estimate(tech_debt_index, total_lines),
        }
    }

    /// Average of the three dimension scores
    pub fn overall(&self) -> f64 {
        (self.security_score + self.maintainability_score + self.architecture_score) / 3.0
    }
}

/// Replace non-finite values with `neutral`, then clamp to [0, 100]
fn bounded(value: f64, neutral: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        neutral
    }
}

/// Sum after sorting, so the result does not depend on input order
fn stable_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    values.into_iter().sum()
}

pub fn tech_debt_index(
    security: f64,
    maintainability: f64,
    architecture: f64,
    code_smell_debt: f64,
    weights: &ScoreWeights,
) -> f64 {
    let index = weights.debt_security * (100.0 - security)
        + weights.debt_maintainability * (100.0 - maintainability)
        + weights.debt_architecture * (100.0 - architecture)
        + weights.debt_code_smell * code_smell_debt;
    bounded(index, 0.0)
}

/// Debt contributed by files flagged as problems, with diminishing returns
pub fn code_smell_debt(problem_files: usize) -> f64 {
    let p = problem_files as f64;
    if problem_files <= SMELL_DEBT_LOW_FILES {
        p * SMELL_DEBT_LOW_RATE
    } else if problem_files <= SMELL_DEBT_MID_FILES {
        SMELL_DEBT_LOW_FILES as f64 * SMELL_DEBT_LOW_RATE
            + (p - SMELL_DEBT_LOW_FILES as f64) * SMELL_DEBT_MID_RATE
    } else {
        SMELL_DEBT_LOW_FILES as f64 * SMELL_DEBT_LOW_RATE
            + (SMELL_DEBT_MID_FILES - SMELL_DEBT_LOW_FILES) as f64 * SMELL_DEBT_MID_RATE
            + ((p - SMELL_DEBT_MID_FILES as f64) * SMELL_DEBT_HIGH_RATE).min(SMELL_DEBT_HIGH_CAP)
    }
}

pub fn security_score(report: &SecurityReport, weights: &ScoreWeights) -> f64 {
    if report.findings.is_empty() {
        return 100.0;
    }
    let lines = report.lines_scanned as f64;
    let normalizer = if weights.security_size_normalizer_lines > 0.0 {
        weights.security_size_normalizer_lines
    } else {
        SECURITY_SIZE_NORMALIZER_LINES
    };
    let size_factor = 1.0 / (1.0 + lines / normalizer).sqrt();
    let penalties: Vec<f64> = report
        .findings
        .iter()
        .map(|f| weights.severity(f.severity) * f.confidence.weight())
        .collect();
    bounded(100.0 - stable_sum(penalties) * size_factor, 100.0)
}

/// Piecewise map of average cyclomatic complexity onto 0-100
fn complexity_component(avg_cyclomatic: f64) -> f64 {
    let cc = avg_cyclomatic;
    if cc <= COMPLEXITY_IDEAL {
        100.0
    } else if cc <= COMPLEXITY_MODERATE {
        100.0 - (cc - COMPLEXITY_IDEAL) * COMPLEXITY_IDEAL_SLOPE
    } else if cc <= COMPLEXITY_SEVERE {
        100.0
            - (COMPLEXITY_MODERATE - COMPLEXITY_IDEAL) * COMPLEXITY_IDEAL_SLOPE
            - (cc - COMPLEXITY_MODERATE) * COMPLEXITY_MODERATE_SLOPE
    } else {
        100.0
            - (COMPLEXITY_MODERATE - COMPLEXITY_IDEAL) * COMPLEXITY_IDEAL_SLOPE
            - (COMPLEXITY_SEVERE - COMPLEXITY_MODERATE) * COMPLEXITY_MODERATE_SLOPE
            - (cc - COMPLEXITY_SEVERE) * COMPLEXITY_SEVERE_SLOPE
    }
}

pub fn maintainability_score(report: &ComplexityReport, weights: &ScoreWeights) -> f64 {
    if report.is_empty() {
        return 100.0;
    }
    let mi = bounded(report.avg_maintainability_index, 100.0);

    let very_high_penalty = (report.very_high_complexity_functions as f64
        * VERY_HIGH_COMPLEXITY_PENALTY)
        .min(MAX_VERY_HIGH_COMPLEXITY_PENALTY);
    let complexity = bounded(
        complexity_component(report.avg_cyclomatic) - very_high_penalty,
        100.0,
    );

    let documentation = bounded(report.comment_density * DOCUMENTATION_DENSITY_SCALE, 0.0);

    let readability = bounded(
        100.0
            - report.long_line_ratio * LONG_LINE_PENALTY_SCALE
            - report.long_function_ratio * LONG_FUNCTION_PENALTY_SCALE,
        100.0,
    );

    let score = stable_sum(vec![
        weights.maint_mi * mi,
        weights.maint_complexity * complexity,
        weights.maint_documentation * documentation,
        weights.maint_readability * readability,
    ]);
    bounded(score, 100.0)
}

pub fn architecture_score(metrics: &ArchitectureMetrics, weights: &ScoreWeights) -> f64 {
    if metrics.module_count < 2 {
        return 100.0;
    }
    let cycle_freedom = bounded(100.0 - metrics.cycles.len() as f64 * CYCLE_PENALTY, 100.0);
    let coupling = if metrics.avg_coupling <= COUPLING_BASELINE {
        100.0
    } else {
        bounded(
            100.0 - (metrics.avg_coupling - COUPLING_BASELINE) * COUPLING_PENALTY,
            100.0,
        )
    };
    let cohesion = bounded(metrics.avg_cohesion * 100.0, 100.0);
    let modularity = bounded(metrics.modularity, 100.0);
    let issue_penalty =
        (metrics.issue_count() as f64 * ARCH_ISSUE_PENALTY).min(MAX_ARCH_ISSUE_PENALTY);

    let score = stable_sum(vec![
        weights.arch_cycles * cycle_freedom,
        weights.arch_coupling * coupling,
        weights.arch_cohesion * cohesion,
        weights.arch_modularity * modularity,
    ]) - issue_penalty;
    bounded(score, 100.0)
}

/// Aggregate analyzer outputs into the final score set
pub fn aggregate(
    complexity: &ComplexityReport,
    security: &SecurityReport,
    architecture: &ArchitectureMetrics,
    weights: &ScoreWeights,
) -> ScoreSet {
    let security_score = security_score(security, weights);
    let maintainability_score = maintainability_score(complexity, weights);
    let architecture_score = architecture_score(architecture, weights);
    let smell_debt = code_smell_debt(complexity.problem_files);

    ScoreSet::from_scores(
        security_score,
        maintainability_score,
        architecture_score,
        smell_debt,
        security.lines_scanned,
        weights,
    )
}
