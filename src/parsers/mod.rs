//! Structural extraction using tree-sitter
//!
//! Every supported language is a variant of [`Language`], which knows how to
//! detect itself from a path (or a shebang) and how to extract a
//! [`StructuralSummary`] from source text. Extraction is table-driven: the
//! per-language differences live in [`grammar`], and one walker handles all of
//! them.

pub mod grammar;
mod imports;
mod walker;

use crate::selector::SourceFile;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use grammar::GrammarSpec;

/// Fraction of a file's bytes covered by ERROR nodes above which the file is
/// treated as unparseable instead of trusting tree-sitter's recovery
const MAX_ERROR_RATIO: f64 = 0.5;

/// Errors from parsing a single file. Never fatal to a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Failed to load grammar: {0}")]
    Grammar(String),

    #[error("Syntax errors cover {:.0}% of {path}", error_ratio * 100.0)]
    Syntax { path: String, error_ratio: f64 },

    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Extraction of {path} ran past its deadline")]
    TimedOut { path: String },
}

/// When extraction of one file gives up: a wall-clock instant, the run's
/// cancellation, or both
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline<'a> {
    at: Option<Instant>,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> Deadline<'a> {
    /// Never expires
    pub fn none() -> Self {
        Self::default()
    }

    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
            cancel: None,
        }
    }

    /// Also expire as soon as `cancel` fires
    pub fn or_cancelled(self, cancel: &'a CancellationToken) -> Self {
        Self {
            cancel: Some(cancel),
            ..self
        }
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
            || self.cancel.is_some_and(|c| c.is_cancelled())
    }
}

/// Supported source languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Go,
    Java,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::Rust,
        Language::Go,
        Language::Java,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
        }
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyw"],
            Language::JavaScript => &["js", "mjs", "cjs", "jsx"],
            Language::TypeScript => &["ts", "tsx", "mts", "cts"],
            Language::Rust => &["rs"],
            Language::Go => &["go"],
            Language::Java => &["java"],
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.extensions().contains(&ext.as_str()))
    }

    /// Detect the language of a file from its extension, falling back to the
    /// `#!` line of extensionless scripts.
    pub fn detect(path: &Path, head: &[u8]) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => Self::from_extension(ext),
            None => Self::from_shebang(head),
        }
    }

    fn from_shebang(head: &[u8]) -> Option<Self> {
        let first_line = head.split(|b| *b == b'\n').next()?;
        let line = std::str::from_utf8(first_line).ok()?;
        let interpreter = line.strip_prefix("#!")?;
        if interpreter.contains("python") {
            Some(Language::Python)
        } else if interpreter.contains("node") || interpreter.contains("deno") {
            Some(Language::JavaScript)
        } else {
            None
        }
    }

    pub fn grammar(self) -> &'static GrammarSpec {
        match self {
            Language::Python => &grammar::PYTHON,
            Language::JavaScript => &grammar::JAVASCRIPT,
            Language::TypeScript => &grammar::TYPESCRIPT,
            Language::Rust => &grammar::RUST,
            Language::Go => &grammar::GO,
            Language::Java => &grammar::JAVA,
        }
    }

    fn ts_language(self, path: &Path) -> tree_sitter::Language {
        match self {
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => {
                if path.extension().and_then(|e| e.to_str()) == Some("tsx") {
                    tree_sitter_typescript::LANGUAGE_TSX.into()
                } else {
                    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
                }
            }
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
            Language::Java => tree_sitter_java::LANGUAGE.into(),
        }
    }

    /// Parse `source` and extract its functions, classes and imports.
    ///
    /// `path` is only used for grammar selection (`.tsx`) and error messages.
    pub fn extract(self, source: &str, path: &Path) -> Result<StructuralSummary, ParseError> {
        self.extract_within(source, path, Deadline::none())
    }

    /// Like [`extract`](Self::extract), giving up with
    /// [`ParseError::TimedOut`] once `deadline` expires. Both the parse and
    /// the walk over the tree observe it.
    pub fn extract_within(
        self,
        source: &str,
        path: &Path,
        deadline: Deadline<'_>,
    ) -> Result<StructuralSummary, ParseError> {
        let timed_out = || ParseError::TimedOut {
            path: path.display().to_string(),
        };
        if deadline.expired() {
            return Err(timed_out());
        }

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.ts_language(path))
            .map_err(|e| ParseError::Grammar(e.to_string()))?;

        let bytes = source.as_bytes();
        let mut read = |offset: usize, _: tree_sitter::Point| bytes.get(offset..).unwrap_or_default();
        let mut give_up = |_: &tree_sitter::ParseState| deadline.expired();
        let options = tree_sitter::ParseOptions::new().progress_callback(&mut give_up);
        let tree = match parser.parse_with_options(&mut read, None, Some(options)) {
            Some(tree) => tree,
            None if deadline.expired() => return Err(timed_out()),
            None => {
                return Err(ParseError::Syntax {
                    path: path.display().to_string(),
                    error_ratio: 1.0,
                })
            }
        };
        let root = tree.root_node();

        if root.has_error() {
            let ratio = walker::error_ratio(&root, source.len());
            if ratio > MAX_ERROR_RATIO {
                return Err(ParseError::Syntax {
                    path: path.display().to_string(),
                    error_ratio: ratio,
                });
            }
        }

        let lines = count_lines(source, self.grammar());
        let mut summary = StructuralSummary::empty(path.display().to_string(), self, lines);
        walker::walk(self, &root, bytes, &mut summary, deadline).map_err(|_| timed_out())?;
        Ok(summary)
    }
}

/// A function or method definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    /// `Container.name` for methods and nested functions
    pub qualified_name: String,
    /// Enclosing class, impl target or function
    pub container: Option<String>,
    pub line_start: u32,
    pub line_end: u32,
    pub parameter_count: u32,
    pub cyclomatic: u32,
    pub cognitive: u32,
    pub max_nesting: u32,
}

impl FunctionDef {
    pub fn loc(&self) -> u32 {
        self.line_end.saturating_sub(self.line_start) + 1
    }
}

/// A class or other named type definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub method_count: u32,
}

/// A raw import/reference target as written in the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRef {
    pub target: String,
    pub line: u32,
}

/// Physical line breakdown of a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCounts {
    pub total: usize,
    pub code: usize,
    pub comment: usize,
    /// Lines longer than the readability limit
    pub long: usize,
    /// Comments carrying TODO/FIXME/HACK/XXX markers
    pub todo: usize,
}

/// Outcome of extracting one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    #[default]
    Parsed,
    /// Kept for line counts only
    Unparseable,
    /// Exceeded the per-file budget; excluded from every dimension
    TimedOut,
}

/// Structural summary of one selected file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralSummary {
    /// Path relative to the repository root
    pub path: String,
    pub language: Language,
    pub lines: LineCounts,
    pub functions: Vec<FunctionDef>,
    pub classes: Vec<ClassDef>,
    pub imports: Vec<ImportRef>,
    pub status: ParseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StructuralSummary {
    fn empty(path: String, language: Language, lines: LineCounts) -> Self {
        Self {
            path,
            language,
            lines,
            functions: Vec::new(),
            classes: Vec::new(),
            imports: Vec::new(),
            status: ParseStatus::Parsed,
            error: None,
        }
    }

    /// Placeholder for a file that could not be parsed. Keeps its line counts.
    pub fn unparseable(path: String, language: Language, lines: LineCounts, error: &ParseError) -> Self {
        Self {
            status: ParseStatus::Unparseable,
            error: Some(error.to_string()),
            ..Self::empty(path, language, lines)
        }
    }

    pub fn timed_out(path: String, language: Language) -> Self {
        Self {
            status: ParseStatus::TimedOut,
            error: Some("per-file timeout exceeded".to_string()),
            ..Self::empty(path, language, LineCounts::default())
        }
    }

    /// True when this file contributes to complexity and architecture
    pub fn is_parsed(&self) -> bool {
        self.status == ParseStatus::Parsed
    }

    /// Module id: relative path without extension
    pub fn module_id(&self) -> String {
        module_id(&self.path)
    }
}

/// Module id for a relative path: forward slashes, extension stripped
pub fn module_id(relative_path: &str) -> String {
    let normalized = relative_path.replace('\\', "/");
    match normalized.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') && !stem.is_empty() && !stem.ends_with('/') => {
            stem.to_string()
        }
        _ => normalized,
    }
}

/// Lines longer than this count against readability
pub const LONG_LINE_CHARS: usize = 120;

const TODO_MARKERS: &[&str] = &["TODO", "FIXME", "HACK", "XXX"];

fn has_todo_marker(comment: &str) -> bool {
    TODO_MARKERS.iter().any(|m| comment.contains(m))
}

/// Count physical, code and comment lines.
pub fn count_lines(source: &str, spec: &GrammarSpec) -> LineCounts {
    let mut counts = LineCounts {
        total: memchr::memchr_iter(b'\n', source.as_bytes()).count(),
        ..Default::default()
    };
    if !source.is_empty() && !source.ends_with('\n') {
        counts.total += 1;
    }

    let mut in_block = false;
    for line in source.lines() {
        if line.chars().count() > LONG_LINE_CHARS {
            counts.long += 1;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if in_block {
            counts.comment += 1;
            if has_todo_marker(trimmed) {
                counts.todo += 1;
            }
            if let Some((_, end)) = spec.block_comment {
                if trimmed.contains(end) {
                    in_block = false;
                }
            }
            continue;
        }
        if spec.line_comments.iter().any(|p| trimmed.starts_with(p)) {
            counts.comment += 1;
            if has_todo_marker(trimmed) {
                counts.todo += 1;
            }
            continue;
        }
        if let Some((start, end)) = spec.block_comment {
            if let Some(rest) = trimmed.strip_prefix(start) {
                counts.comment += 1;
                if has_todo_marker(rest) {
                    counts.todo += 1;
                }
                in_block = !rest.contains(end);
                continue;
            }
        }
        counts.code += 1;
        // trailing comment on a code line
        let trailing = spec
            .line_comments
            .iter()
            .filter_map(|p| trimmed.find(p).map(|i| &trimmed[i..]))
            .next();
        if trailing.map(has_todo_marker).unwrap_or(false) {
            counts.todo += 1;
        }
    }
    counts
}

/// Read and extract one file.
///
/// Parse failures become an unparseable summary; running past `deadline`
/// becomes a timed-out one.
pub fn extract_file(file: &SourceFile, deadline: Deadline<'_>) -> StructuralSummary {
    let relative = file.relative_path.clone();
    let bytes = match std::fs::read(&file.path) {
        Ok(b) => b,
        Err(e) => {
            let err = ParseError::Io {
                path: relative.clone(),
                message: e.to_string(),
            };
            warn!("{}", err);
            return StructuralSummary::unparseable(relative, file.language, LineCounts::default(), &err);
        }
    };

    let source = String::from_utf8_lossy(&bytes);
    let path = Path::new(&relative);
    match file.language.extract_within(&source, path, deadline) {
        Ok(summary) => summary,
        Err(ParseError::TimedOut { .. }) => {
            warn!("Extraction of {} exceeded its per-file budget; skipping", relative);
            StructuralSummary::timed_out(relative, file.language)
        }
        Err(err) => {
            debug!("Unparseable {}: {}", relative, err);
            let lines = count_lines(&source, file.language.grammar());
            StructuralSummary::unparseable(relative, file.language, lines, &err)
        }
    }
}

/// Extract all files in parallel.
///
/// Each file gets `per_file_timeout` for its parse and walk and is reported
/// as timed out past it. Once `cancel` fires, files still in progress stop
/// and the rest are not read. Output is sorted by path regardless of
/// scheduling.
pub fn extract_files(
    files: &[SourceFile],
    per_file_timeout: Duration,
    cancel: &CancellationToken,
) -> Vec<StructuralSummary> {
    let mut summaries: Vec<StructuralSummary> = files
        .par_iter()
        .map(|file| {
            if cancel.is_cancelled() {
                return StructuralSummary::timed_out(file.relative_path.clone(), file.language);
            }
            extract_file(file, Deadline::after(per_file_timeout).or_cancelled(cancel))
        })
        .collect();

    summaries.sort_by(|a, b| a.path.cmp(&b.path));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_language_for_extension() {
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("TSX"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("mjs"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("rs"), Some(Language::Rust));
        assert_eq!(Language::from_extension("go"), Some(Language::Go));
        assert_eq!(Language::from_extension("java"), Some(Language::Java));
        assert_eq!(Language::from_extension("cpp"), None);
    }

    #[test]
    fn test_detect_shebang() {
        let path = PathBuf::from("bin/tool");
        assert_eq!(
            Language::detect(&path, b"#!/usr/bin/env python3\nprint(1)\n"),
            Some(Language::Python)
        );
        assert_eq!(
            Language::detect(&path, b"#!/usr/bin/env node\n"),
            Some(Language::JavaScript)
        );
        assert_eq!(Language::detect(&path, b"#!/bin/sh\n"), None);
        assert_eq!(Language::detect(&path, b"plain text"), None);
    }

    #[test]
    fn test_module_id() {
        assert_eq!(module_id("src/app/models.py"), "src/app/models");
        assert_eq!(module_id("src\\lib.rs"), "src/lib");
        assert_eq!(module_id("Makefile"), "Makefile");
        assert_eq!(module_id(".hidden/file"), ".hidden/file");
    }

    #[test]
    fn test_count_lines_python() {
        let source = "# header\nimport os\n\n\"\"\"\nDocstring\n\"\"\"\nx = 1\n";
        let counts = count_lines(source, &grammar::PYTHON);
        assert_eq!(counts.total, 7);
        assert_eq!(counts.comment, 4);
        assert_eq!(counts.code, 2);
    }

    #[test]
    fn test_count_lines_block_comment() {
        let source = "/*\n * doc\n */\nfn main() {} // TODO: args\n// trailing";
        let counts = count_lines(source, &grammar::RUST);
        assert_eq!(counts.total, 5);
        assert_eq!(counts.comment, 4);
        assert_eq!(counts.code, 1);
        assert_eq!(counts.todo, 1);
    }

    #[test]
    fn test_extract_python_structure() {
        let source = r#"
import os
from app.models import User

class Service:
    def handle(self, request, retries=3):
        if request and retries:
            for item in request:
                if item:
                    return item
        return None

def helper():
    return 1
"#;
        let summary = Language::Python
            .extract(source, Path::new("svc.py"))
            .expect("should parse Python");
        assert!(summary.is_parsed());
        assert_eq!(summary.classes.len(), 1);
        assert_eq!(summary.classes[0].name, "Service");
        assert_eq!(summary.classes[0].method_count, 1);
        assert_eq!(summary.functions.len(), 2);

        let handle = &summary.functions[0];
        assert_eq!(handle.qualified_name, "Service.handle");
        assert_eq!(handle.parameter_count, 2);
        // base 1 + if + and + for + if
        assert_eq!(handle.cyclomatic, 5);
        assert_eq!(handle.max_nesting, 3);
        assert!(handle.cognitive > handle.cyclomatic);

        let targets: Vec<_> = summary.imports.iter().map(|i| i.target.as_str()).collect();
        assert_eq!(targets, vec!["os", "app.models.User"]);
    }

    #[test]
    fn test_extract_unparseable_garbage() {
        let source = ")))) ]]]] }}}} :::: ;;;; )))) \n".repeat(20);
        let result = Language::Python.extract(&source, Path::new("bad.py"));
        assert!(matches!(result, Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn test_extract_files_marks_unparseable_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.py"), "def ok():\n    return 1\n").unwrap();
        std::fs::write(
            dir.path().join("a.py"),
            ")))) ]]]] }}}} :::: ;;;; ))))\n".repeat(20),
        )
        .unwrap();

        let files: Vec<SourceFile> = ["b.py", "a.py"]
            .iter()
            .map(|name| SourceFile {
                path: dir.path().join(name),
                relative_path: name.to_string(),
                language: Language::Python,
                size_bytes: 0,
            })
            .collect();

        let summaries = extract_files(&files, Duration::from_secs(10), &CancellationToken::new());
        assert_eq!(summaries[0].path, "a.py");
        assert_eq!(summaries[0].status, ParseStatus::Unparseable);
        assert_eq!(summaries[0].lines.total, 20);
        assert_eq!(summaries[1].status, ParseStatus::Parsed);
        assert_eq!(summaries[1].functions.len(), 1);
    }

    fn python_file(dir: &Path, name: &str, content: &str) -> SourceFile {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        SourceFile {
            path,
            relative_path: name.to_string(),
            language: Language::Python,
            size_bytes: content.len() as u64,
        }
    }

    #[test]
    fn test_per_file_budget_bounds_the_parse() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = String::new();
        for i in 0..20_000 {
            source.push_str(&format!("def f{}(a, b):\n    if a and b:\n        return a\n    return b\n\n", i));
        }
        let big = python_file(dir.path(), "big.py", &source);

        let started = Instant::now();
        let summaries = extract_files(&[big], Duration::from_millis(1), &CancellationToken::new());
        let elapsed = started.elapsed();

        assert_eq!(summaries[0].status, ParseStatus::TimedOut);
        assert!(summaries[0].functions.is_empty());
        assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);
    }

    #[test]
    fn test_cancelled_extraction_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            python_file(dir.path(), "a.py", "def a():\n    return 1\n"),
            python_file(dir.path(), "b.py", "def b():\n    return 2\n"),
        ];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summaries = extract_files(&files, Duration::from_secs(10), &cancel);
        assert!(summaries.iter().all(|s| s.status == ParseStatus::TimedOut));
    }

    #[test]
    fn test_deadline() {
        assert!(!Deadline::none().expired());
        assert!(Deadline::after(Duration::ZERO).expired());
        assert!(!Deadline::after(Duration::from_secs(60)).expired());

        let cancel = CancellationToken::new();
        let deadline = Deadline::none().or_cancelled(&cancel);
        assert!(!deadline.expired());
        cancel.cancel();
        assert!(deadline.expired());
    }
}
