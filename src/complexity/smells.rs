//! Code smell detection over structural summaries

use crate::parsers::StructuralSummary;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const LONG_FUNCTION_LINES: u32 = 50;
pub const MAX_PARAMETERS: u32 = 5;
pub const MAX_NESTING: u32 = 4;
pub const LARGE_CLASS_METHODS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmellKind {
    LongFunction,
    TooManyParameters,
    DeepNesting,
    HighComplexity,
    LargeClass,
    LongLines,
    TodoMarkers,
}

impl fmt::Display for SmellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SmellKind::LongFunction => "long_function",
            SmellKind::TooManyParameters => "too_many_parameters",
            SmellKind::DeepNesting => "deep_nesting",
            SmellKind::HighComplexity => "high_complexity",
            SmellKind::LargeClass => "large_class",
            SmellKind::LongLines => "long_lines",
            SmellKind::TodoMarkers => "todo_markers",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSmell {
    pub kind: SmellKind,
    pub line: u32,
    /// Function or class name; the file path for file-level smells
    pub subject: String,
    pub detail: String,
}

/// Detect smells in one parsed file, ordered by line then kind
pub fn detect_smells(summary: &StructuralSummary) -> Vec<CodeSmell> {
    let mut smells = Vec::new();

    for func in &summary.functions {
        let mut push = |kind, detail: String| {
            smells.push(CodeSmell {
                kind,
                line: func.line_start,
                subject: func.qualified_name.clone(),
                detail,
            })
        };
        if func.loc() > LONG_FUNCTION_LINES {
            push(
                SmellKind::LongFunction,
                format!("{} lines (limit {})", func.loc(), LONG_FUNCTION_LINES),
            );
        }
        if func.parameter_count > MAX_PARAMETERS {
            push(
                SmellKind::TooManyParameters,
                format!("{} parameters (limit {})", func.parameter_count, MAX_PARAMETERS),
            );
        }
        if func.max_nesting > MAX_NESTING {
            push(
                SmellKind::DeepNesting,
                format!("nesting depth {} (limit {})", func.max_nesting, MAX_NESTING),
            );
        }
        if func.cyclomatic > super::HIGH_COMPLEXITY_THRESHOLD {
            push(
                SmellKind::HighComplexity,
                format!(
                    "cyclomatic complexity {} (limit {})",
                    func.cyclomatic,
                    super::HIGH_COMPLEXITY_THRESHOLD
                ),
            );
        }
    }

    for class in &summary.classes {
        if class.method_count > LARGE_CLASS_METHODS {
            smells.push(CodeSmell {
                kind: SmellKind::LargeClass,
                line: class.line_start,
                subject: class.name.clone(),
                detail: format!("{} methods (limit {})", class.method_count, LARGE_CLASS_METHODS),
            });
        }
    }

    if summary.lines.long > 0 {
        smells.push(CodeSmell {
            kind: SmellKind::LongLines,
            line: 0,
            subject: summary.path.clone(),
            detail: format!(
                "{} lines over {} characters",
                summary.lines.long,
                crate::parsers::LONG_LINE_CHARS
            ),
        });
    }

    if summary.lines.todo > 0 {
        smells.push(CodeSmell {
            kind: SmellKind::TodoMarkers,
            line: 0,
            subject: summary.path.clone(),
            detail: format!("{} TODO/FIXME comments", summary.lines.todo),
        });
    }

    smells.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.kind.cmp(&b.kind)));
    smells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::Language;
    use std::path::Path;

    #[test]
    fn test_detects_function_smells() {
        let mut body = String::from("def busy(a, b, c, d, e, f):\n");
        body.push_str("    if a:\n        if b:\n            if c:\n                if d:\n                    if e:\n                        return f\n");
        for i in 0..50 {
            body.push_str(&format!("    x{} = {}\n", i, i));
        }
        body.push_str("    return None  # TODO: simplify\n");

        let summary = Language::Python
            .extract(&body, Path::new("busy.py"))
            .expect("should parse");
        let smells = detect_smells(&summary);
        let kinds: Vec<SmellKind> = smells.iter().map(|s| s.kind).collect();

        assert!(kinds.contains(&SmellKind::LongFunction));
        assert!(kinds.contains(&SmellKind::TooManyParameters));
        assert!(kinds.contains(&SmellKind::DeepNesting));
        assert!(kinds.contains(&SmellKind::TodoMarkers));
        assert!(!kinds.contains(&SmellKind::HighComplexity));
    }

    #[test]
    fn test_clean_file_has_no_smells() {
        let summary = Language::Python
            .extract("def ok(x):\n    return x + 1\n", Path::new("ok.py"))
            .expect("should parse");
        assert!(detect_smells(&summary).is_empty());
    }
}
