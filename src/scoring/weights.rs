//! Score weights and thresholds
//!
//! Every number the aggregator uses lives here. These values are part of
//! the output contract: reports and stored results are only comparable
//! while they stay the same.

use crate::models::Severity;
use serde::{Deserialize, Serialize};

// Tech debt index

pub const DEBT_SECURITY_WEIGHT: f64 = 0.35;
pub const DEBT_MAINTAINABILITY_WEIGHT: f64 = 0.30;
pub const DEBT_ARCHITECTURE_WEIGHT: f64 = 0.25;
pub const DEBT_CODE_SMELL_WEIGHT: f64 = 0.10;

/// Lower bounds (inclusive) of the urgency bands
pub const URGENCY_MEDIUM_FROM: f64 = 25.0;
pub const URGENCY_HIGH_FROM: f64 = 50.0;
pub const URGENCY_CRITICAL_FROM: f64 = 75.0;

// Code smell debt, from the number of problem files

pub const SMELL_DEBT_LOW_FILES: usize = 5;
pub const SMELL_DEBT_LOW_RATE: f64 = 8.0;
pub const SMELL_DEBT_MID_FILES: usize = 15;
pub const SMELL_DEBT_MID_RATE: f64 = 4.0;
pub const SMELL_DEBT_HIGH_RATE: f64 = 2.0;
pub const SMELL_DEBT_HIGH_CAP: f64 = 20.0;

// Security

pub const SEVERITY_WEIGHT_CRITICAL: f64 = 25.0;
pub const SEVERITY_WEIGHT_HIGH: f64 = 15.0;
pub const SEVERITY_WEIGHT_MEDIUM: f64 = 8.0;
pub const SEVERITY_WEIGHT_LOW: f64 = 3.0;
/// Penalties shrink with `1/sqrt(1 + lines / this)`
pub const SECURITY_SIZE_NORMALIZER_LINES: f64 = 1000.0;

// Maintainability

pub const MAINT_MI_WEIGHT: f64 = 0.35;
pub const MAINT_COMPLEXITY_WEIGHT: f64 = 0.30;
pub const MAINT_DOCUMENTATION_WEIGHT: f64 = 0.20;
pub const MAINT_READABILITY_WEIGHT: f64 = 0.15;

/// Average cyclomatic complexity still scoring 100
pub const COMPLEXITY_IDEAL: f64 = 5.0;
pub const COMPLEXITY_MODERATE: f64 = 10.0;
pub const COMPLEXITY_SEVERE: f64 = 20.0;
/// Points lost per unit of average complexity in each band
pub const COMPLEXITY_IDEAL_SLOPE: f64 = 6.0;
pub const COMPLEXITY_MODERATE_SLOPE: f64 = 4.0;
pub const COMPLEXITY_SEVERE_SLOPE: f64 = 1.5;
pub const VERY_HIGH_COMPLEXITY_PENALTY: f64 = 3.0;
pub const MAX_VERY_HIGH_COMPLEXITY_PENALTY: f64 = 20.0;

/// Comment density of 0.2 earns full documentation marks
pub const DOCUMENTATION_DENSITY_SCALE: f64 = 500.0;
pub const LONG_LINE_PENALTY_SCALE: f64 = 200.0;
pub const LONG_FUNCTION_PENALTY_SCALE: f64 = 100.0;

// Architecture

pub const ARCH_CYCLE_WEIGHT: f64 = 0.35;
pub const ARCH_COUPLING_WEIGHT: f64 = 0.25;
pub const ARCH_COHESION_WEIGHT: f64 = 0.20;
pub const ARCH_MODULARITY_WEIGHT: f64 = 0.20;

pub const CYCLE_PENALTY: f64 = 15.0;
/// Average out-degree that still scores 100
pub const COUPLING_BASELINE: f64 = 2.0;
pub const COUPLING_PENALTY: f64 = 12.0;
/// Per hub or god module
pub const ARCH_ISSUE_PENALTY: f64 = 5.0;
pub const MAX_ARCH_ISSUE_PENALTY: f64 = 20.0;

// Grades and effort

pub const GRADE_A: f64 = 90.0;
pub const GRADE_B: f64 = 80.0;
pub const GRADE_C: f64 = 70.0;
pub const GRADE_D: f64 = 60.0;

pub const EFFORT_LIGHT_FROM: f64 = 15.0;
pub const EFFORT_MODERATE_FROM: f64 = 30.0;
pub const EFFORT_SIGNIFICANT_FROM: f64 = 50.0;
pub const EFFORT_MAJOR_FROM: f64 = 75.0;
pub const MEDIUM_CODEBASE_LINES: usize = 10_000;
pub const LARGE_CODEBASE_LINES: usize = 50_000;

/// Overridable weights; defaults are the constants above
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub debt_security: f64,
    pub debt_maintainability: f64,
    pub debt_architecture: f64,
    pub debt_code_smell: f64,

    pub severity_critical: f64,
    pub severity_high: f64,
    pub severity_medium: f64,
    pub severity_low: f64,
    pub security_size_normalizer_lines: f64,

    pub maint_mi: f64,
    pub maint_complexity: f64,
    pub maint_documentation: f64,
    pub maint_readability: f64,

    pub arch_cycles: f64,
    pub arch_coupling: f64,
    pub arch_cohesion: f64,
    pub arch_modularity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            debt_security: DEBT_SECURITY_WEIGHT,
            debt_maintainability: DEBT_MAINTAINABILITY_WEIGHT,
            debt_architecture: DEBT_ARCHITECTURE_WEIGHT,
            debt_code_smell: DEBT_CODE_SMELL_WEIGHT,
            severity_critical: SEVERITY_WEIGHT_CRITICAL,
            severity_high: SEVERITY_WEIGHT_HIGH,
            severity_medium: SEVERITY_WEIGHT_MEDIUM,
            severity_low: SEVERITY_WEIGHT_LOW,
            security_size_normalizer_lines: SECURITY_SIZE_NORMALIZER_LINES,
            maint_mi: MAINT_MI_WEIGHT,
            maint_complexity: MAINT_COMPLEXITY_WEIGHT,
            maint_documentation: MAINT_DOCUMENTATION_WEIGHT,
            maint_readability: MAINT_READABILITY_WEIGHT,
            arch_cycles: ARCH_CYCLE_WEIGHT,
            arch_coupling: ARCH_COUPLING_WEIGHT,
            arch_cohesion: ARCH_COHESION_WEIGHT,
            arch_modularity: ARCH_MODULARITY_WEIGHT,
        }
    }
}

impl ScoreWeights {
    pub fn severity(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.severity_critical,
            Severity::High => self.severity_high,
            Severity::Medium => self.severity_medium,
            Severity::Low => self.severity_low,
        }
    }

    /// Names of weights that are negative or not finite
    pub fn invalid_fields(&self) -> Vec<&'static str> {
        [
            ("debt_security", self.debt_security),
            ("debt_maintainability", self.debt_maintainability),
            ("debt_architecture", self.debt_architecture),
            ("debt_code_smell", self.debt_code_smell),
            ("severity_critical", self.severity_critical),
            ("severity_high", self.severity_high),
            ("severity_medium", self.severity_medium),
            ("severity_low", self.severity_low),
            ("security_size_normalizer_lines", self.security_size_normalizer_lines),
            ("maint_mi", self.maint_mi),
            ("maint_complexity", self.maint_complexity),
            ("maint_documentation", self.maint_documentation),
            ("maint_readability", self.maint_readability),
            ("arch_cycles", self.arch_cycles),
            ("arch_coupling", self.arch_coupling),
            ("arch_cohesion", self.arch_cohesion),
            ("arch_modularity", self.arch_modularity),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_finite() || *v < 0.0)
        .map(|(name, _)| name)
        .collect()
    }
}
