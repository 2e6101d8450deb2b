//! Complexity analysis
//!
//! Turns structural summaries into per-function complexity figures, a
//! per-file maintainability index and a list of code smells, then rolls them
//! up into a [`ComplexityReport`]. Cross-file averages are weighted by line
//! count so large low-quality files dominate small ones.
//!
//! # Maintainability index
//!
//! ```text
//! MI = clamp(MI_BASE
//!            - MI_COMPLEXITY_WEIGHT × (avg_cyclomatic - 1)
//!            - MI_LENGTH_WEIGHT × ln(1 + avg_function_lines / 10)
//!            + MI_COMMENT_WEIGHT × sqrt(comment_density), 0, 100)
//! ```

mod smells;

pub use smells::{detect_smells, CodeSmell, SmellKind};

use crate::parsers::StructuralSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub const MI_BASE: f64 = 85.0;
pub const MI_COMPLEXITY_WEIGHT: f64 = 3.0;
pub const MI_LENGTH_WEIGHT: f64 = 10.0;
pub const MI_COMMENT_WEIGHT: f64 = 15.0;

/// Cyclomatic complexity above this marks a function as complex
pub const HIGH_COMPLEXITY_THRESHOLD: u32 = 10;

/// A file is a problem file above these limits
pub const PROBLEM_AVG_COMPLEXITY: f64 = 10.0;
pub const PROBLEM_MI: f64 = 40.0;
pub const PROBLEM_SMELL_COUNT: usize = 5;

/// Complexity of one function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionComplexity {
    pub name: String,
    pub line_start: u32,
    pub loc: u32,
    pub cyclomatic: u32,
    pub cognitive: u32,
    pub max_nesting: u32,
}

/// Complexity metrics of one parsed file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileComplexity {
    pub path: String,
    pub lines: usize,
    pub functions: Vec<FunctionComplexity>,
    pub avg_cyclomatic: f64,
    pub max_cyclomatic: u32,
    pub avg_cognitive: f64,
    pub avg_function_lines: f64,
    pub comment_density: f64,
    pub long_lines: usize,
    pub maintainability_index: f64,
    pub smells: Vec<CodeSmell>,
}

impl FileComplexity {
    /// Whether this file counts toward code-smell debt
    pub fn is_problem(&self) -> bool {
        self.avg_cyclomatic > PROBLEM_AVG_COMPLEXITY
            || self.maintainability_index < PROBLEM_MI
            || self.smells.len() > PROBLEM_SMELL_COUNT
    }
}

/// Per-file maintainability index, clamped to [0, 100].
///
/// Decreases with complexity and function length, increases with comments.
pub fn maintainability_index(avg_cyclomatic: f64, avg_function_lines: f64, comment_density: f64) -> f64 {
    let cc = finite_or(avg_cyclomatic, 1.0).max(1.0);
    let len = finite_or(avg_function_lines, 0.0).max(0.0);
    let density = finite_or(comment_density, 0.0).clamp(0.0, 1.0);

    let mi = MI_BASE - MI_COMPLEXITY_WEIGHT * (cc - 1.0) - MI_LENGTH_WEIGHT * (1.0 + len / 10.0).ln()
        + MI_COMMENT_WEIGHT * density.sqrt();
    mi.clamp(0.0, 100.0)
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Analyze a single parsed file
pub fn analyze_file(summary: &StructuralSummary) -> FileComplexity {
    let functions: Vec<FunctionComplexity> = summary
        .functions
        .iter()
        .map(|f| FunctionComplexity {
            name: f.qualified_name.clone(),
            line_start: f.line_start,
            loc: f.loc(),
            cyclomatic: f.cyclomatic,
            cognitive: f.cognitive,
            max_nesting: f.max_nesting,
        })
        .collect();

    let n = functions.len() as f64;
    let (avg_cyclomatic, avg_cognitive, avg_function_lines) = if functions.is_empty() {
        (1.0, 0.0, 0.0)
    } else {
        (
            functions.iter().map(|f| f.cyclomatic as f64).sum::<f64>() / n,
            functions.iter().map(|f| f.cognitive as f64).sum::<f64>() / n,
            functions.iter().map(|f| f.loc as f64).sum::<f64>() / n,
        )
    };
    let max_cyclomatic = functions.iter().map(|f| f.cyclomatic).max().unwrap_or(1);

    let non_blank = summary.lines.code + summary.lines.comment;
    let comment_density = if non_blank == 0 {
        0.0
    } else {
        summary.lines.comment as f64 / non_blank as f64
    };

    let maintainability_index = maintainability_index(avg_cyclomatic, avg_function_lines, comment_density);

    FileComplexity {
        path: summary.path.clone(),
        lines: summary.lines.total,
        smells: Vec::new(),
        functions,
        avg_cyclomatic,
        max_cyclomatic,
        avg_cognitive,
        avg_function_lines,
        comment_density,
        long_lines: summary.lines.long,
        maintainability_index,
    }
}

/// Rolled-up complexity of the whole tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityReport {
    pub files: Vec<FileComplexity>,
    pub total_functions: usize,
    /// Line-weighted averages across parsed files
    pub avg_cyclomatic: f64,
    pub avg_cognitive: f64,
    pub avg_maintainability_index: f64,
    pub max_cyclomatic: u32,
    /// Functions above [`HIGH_COMPLEXITY_THRESHOLD`]
    pub high_complexity_functions: usize,
    /// Functions above the severe threshold used by scoring
    pub very_high_complexity_functions: usize,
    pub comment_density: f64,
    pub long_function_ratio: f64,
    pub long_line_ratio: f64,
    pub smell_counts: BTreeMap<String, usize>,
    pub total_smells: usize,
    pub problem_files: usize,
    /// Set when this dimension failed and was replaced by a neutral report
    #[serde(default)]
    pub degraded: bool,
}

impl Default for ComplexityReport {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            total_functions: 0,
            avg_cyclomatic: 1.0,
            avg_cognitive: 0.0,
            avg_maintainability_index: 100.0,
            max_cyclomatic: 0,
            high_complexity_functions: 0,
            very_high_complexity_functions: 0,
            comment_density: 0.0,
            long_function_ratio: 0.0,
            long_line_ratio: 0.0,
            smell_counts: BTreeMap::new(),
            total_smells: 0,
            problem_files: 0,
            degraded: false,
        }
    }
}

impl ComplexityReport {
    /// Neutral stand-in used when the analyzer fails
    pub fn neutral() -> Self {
        Self {
            degraded: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files sorted by maintainability index, worst first
    pub fn worst_files(&self, n: usize) -> Vec<&FileComplexity> {
        let mut files: Vec<&FileComplexity> = self.files.iter().collect();
        files.sort_by(|a, b| {
            a.maintainability_index
                .total_cmp(&b.maintainability_index)
                .then_with(|| a.path.cmp(&b.path))
        });
        files.truncate(n);
        files
    }
}

/// Cyclomatic value that counts as severe in scoring
pub const VERY_HIGH_COMPLEXITY_THRESHOLD: u32 = 15;

/// Analyze every parsed summary. Unparseable and timed-out files are skipped.
pub fn analyze(summaries: &[StructuralSummary]) -> ComplexityReport {
    let mut files: Vec<FileComplexity> = summaries
        .iter()
        .filter(|s| s.is_parsed())
        .map(|s| {
            let mut file = analyze_file(s);
            file.smells = detect_smells(s);
            debug!(
                "{}: avg cc {:.1}, MI {:.1}, {} smells",
                file.path,
                file.avg_cyclomatic,
                file.maintainability_index,
                file.smells.len()
            );
            file
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));

    if files.is_empty() {
        return ComplexityReport::default();
    }

    let total_lines: usize = files.iter().map(|f| f.lines.max(1)).sum();
    let weighted = |value: fn(&FileComplexity) -> f64| -> f64 {
        files
            .iter()
            .map(|f| value(f) * f.lines.max(1) as f64)
            .sum::<f64>()
            / total_lines as f64
    };

    let all_functions = files.iter().flat_map(|f| f.functions.iter());
    let total_functions = all_functions.clone().count();
    let high = all_functions
        .clone()
        .filter(|f| f.cyclomatic > HIGH_COMPLEXITY_THRESHOLD)
        .count();
    let very_high = all_functions
        .clone()
        .filter(|f| f.cyclomatic > VERY_HIGH_COMPLEXITY_THRESHOLD)
        .count();
    let long_functions = all_functions
        .clone()
        .filter(|f| f.loc > smells::LONG_FUNCTION_LINES)
        .count();

    let comment_lines: usize = summaries
        .iter()
        .filter(|s| s.is_parsed())
        .map(|s| s.lines.comment)
        .sum();
    let non_blank: usize = summaries
        .iter()
        .filter(|s| s.is_parsed())
        .map(|s| s.lines.code + s.lines.comment)
        .sum();
    let long_lines: usize = files.iter().map(|f| f.long_lines).sum();

    let mut smell_counts = BTreeMap::new();
    for smell in files.iter().flat_map(|f| f.smells.iter()) {
        *smell_counts.entry(smell.kind.to_string()).or_insert(0) += 1;
    }
    let total_smells = smell_counts.values().sum();

    ComplexityReport {
        avg_cyclomatic: weighted(|f| f.avg_cyclomatic),
        avg_cognitive: weighted(|f| f.avg_cognitive),
        avg_maintainability_index: weighted(|f| f.maintainability_index),
        max_cyclomatic: files.iter().map(|f| f.max_cyclomatic).max().unwrap_or(0),
        high_complexity_functions: high,
        very_high_complexity_functions: very_high,
        comment_density: if non_blank == 0 {
            0.0
        } else {
            comment_lines as f64 / non_blank as f64
        },
        long_function_ratio: if total_functions == 0 {
            0.0
        } else {
            long_functions as f64 / total_functions as f64
        },
        long_line_ratio: if non_blank == 0 {
            0.0
        } else {
            long_lines as f64 / non_blank as f64
        },
        problem_files: files.iter().filter(|f| f.is_problem()).count(),
        total_functions,
        smell_counts,
        total_smells,
        files,
        degraded: false,
    }
}
