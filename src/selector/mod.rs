//! Source file selection
//!
//! Walks a working tree, drops vendored, generated and binary paths, and
//! classifies what is left by language. Ceilings never fail a run: files over
//! the per-file cap are skipped, and a tree over the aggregate caps is
//! truncated deterministically (sorted by path, first N kept).

use crate::parsers::Language;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directories never worth analyzing
pub const IGNORED_DIRECTORIES: &[&str] = &[
    "__pycache__",
    "node_modules",
    ".git",
    ".svn",
    ".hg",
    "venv",
    "env",
    ".venv",
    ".env",
    "dist",
    "build",
    "target",
    ".idea",
    ".vscode",
    "vendor",
    "packages",
    ".next",
    ".nuxt",
    "coverage",
    ".pytest_cache",
    ".mypy_cache",
    ".tox",
    "third_party",
];

/// Binary and media extensions
const IGNORED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "mp3", "mp4", "wav", "avi", "mov",
    "pdf", "zip", "gz", "tar", "tgz", "bz2", "xz", "7z", "rar", "jar", "war", "class", "so",
    "dll", "dylib", "exe", "bin", "o", "a", "pyc", "pyo", "wasm", "woff", "woff2", "ttf", "eot",
    "otf", "db", "sqlite",
];

/// Lock files and editor noise
const IGNORED_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
    "Pipfile.lock",
    "go.sum",
    ".DS_Store",
    "Thumbs.db",
];

/// Suffixes of generated or minified sources
const GENERATED_SUFFIXES: &[&str] = &[
    ".min.js",
    ".bundle.js",
    ".min.mjs",
    ".pb.go",
    "_pb2.py",
    "_pb2_grpc.py",
    ".generated.ts",
    ".d.ts",
];

/// Size and count ceilings for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorLimits {
    /// Files larger than this are skipped
    pub max_file_bytes: u64,
    /// At most this many files are kept
    pub max_files: usize,
    /// Selection stops before the kept files exceed this many bytes in total
    pub max_total_bytes: u64,
}

impl Default for SelectorLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 5 * 1024 * 1024,
            max_files: 10_000,
            max_total_bytes: 500 * 1024 * 1024,
        }
    }
}

/// A file chosen for analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path inside the working tree
    pub path: PathBuf,
    /// Path relative to the tree root, `/`-separated
    pub relative_path: String,
    pub language: Language,
    pub size_bytes: u64,
}

/// Why a candidate file was not selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge,
    OverLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub relative_path: String,
    pub size_bytes: u64,
    pub reason: SkipReason,
}

/// Result of walking a working tree
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub files: Vec<SourceFile>,
    pub skipped: Vec<SkippedFile>,
    /// True when aggregate ceilings cut the selection short
    pub truncated: bool,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

fn is_ignored_dir(name: &str) -> bool {
    IGNORED_DIRECTORIES.contains(&name) || name.ends_with(".egg-info")
}

fn is_ignored_file(name: &str) -> bool {
    if IGNORED_FILES.contains(&name) {
        return true;
    }
    if GENERATED_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        return true;
    }
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| IGNORED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// First bytes of a file, for shebang sniffing
fn read_head(path: &Path) -> Vec<u8> {
    let mut buf = [0u8; 128];
    match std::fs::File::open(path).and_then(|mut f| f.read(&mut buf)) {
        Ok(n) => buf[..n].to_vec(),
        Err(_) => Vec::new(),
    }
}

fn relative_string(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk `root` and select analyzable source files.
pub fn select(root: &Path, limits: &SelectorLimits) -> Result<Selection> {
    if !root.is_dir() {
        anyhow::bail!("Working tree {} is not a directory", root.display());
    }
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", root.display()))?;

    let mut builder = WalkBuilder::new(&root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .require_git(false)
        .follow_links(false)
        .add_custom_ignore_filename(".repolensignore")
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            match entry.file_type() {
                Some(ft) if ft.is_dir() => !is_ignored_dir(&name),
                _ => !is_ignored_file(&name),
            }
        });

    let mut candidates = Vec::new();
    let mut skipped = Vec::new();

    for entry in builder.build().flatten() {
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let head = if path.extension().is_none() {
            read_head(path)
        } else {
            Vec::new()
        };
        let Some(language) = Language::detect(path, &head) else {
            continue;
        };

        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let relative_path = relative_string(&root, path);

        if size_bytes > limits.max_file_bytes {
            debug!("Skipping {} ({} bytes over per-file cap)", relative_path, size_bytes);
            skipped.push(SkippedFile {
                relative_path,
                size_bytes,
                reason: SkipReason::TooLarge,
            });
            continue;
        }

        candidates.push(SourceFile {
            path: path.to_path_buf(),
            relative_path,
            language,
            size_bytes,
        });
    }

    candidates.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let mut selection = Selection {
        skipped,
        ..Default::default()
    };
    let mut total_bytes = 0u64;
    for file in candidates {
        let over_count = selection.files.len() >= limits.max_files;
        let over_bytes = total_bytes + file.size_bytes > limits.max_total_bytes;
        if selection.truncated || over_count || over_bytes {
            selection.truncated = true;
            selection.skipped.push(SkippedFile {
                relative_path: file.relative_path,
                size_bytes: file.size_bytes,
                reason: SkipReason::OverLimit,
            });
            continue;
        }
        total_bytes += file.size_bytes;
        selection.files.push(file);
    }

    selection
        .skipped
        .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    info!(
        "Selected {} files ({} bytes), skipped {}{}",
        selection.files.len(),
        total_bytes,
        selection.skipped.len(),
        if selection.truncated { ", truncated" } else { "" }
    );

    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_select_classifies_and_excludes() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "src/app.py", "print('hi')\n");
        write(root, "src/ui/view.tsx", "export const x = 1;\n");
        write(root, "node_modules/lib/index.js", "module.exports = 1;\n");
        write(root, "vendor/dep.go", "package dep\n");
        write(root, "pkg.egg-info/setup.py", "x = 1\n");
        write(root, "dist/bundle.min.js", "var a=1;\n");
        write(root, "static/app.min.js", "var a=1;\n");
        write(root, "README.md", "# readme\n");
        write(root, "logo.png", "not really a png");
        write(root, "bin/tool", "#!/usr/bin/env python3\nprint(1)\n");

        let selection = select(root, &SelectorLimits::default()).unwrap();
        let paths: Vec<_> = selection
            .files
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(paths, vec!["bin/tool", "src/app.py", "src/ui/view.tsx"]);
        assert_eq!(selection.files[0].language, Language::Python);
        assert_eq!(selection.files[2].language, Language::TypeScript);
        assert!(!selection.truncated);
    }

    #[test]
    fn test_oversized_file_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        write(dir.path(), "big.py", &"x = 1\n".repeat(100));
        write(dir.path(), "small.py", "x = 1\n");

        let limits = SelectorLimits {
            max_file_bytes: 100,
            ..Default::default()
        };
        let selection = select(dir.path(), &limits).unwrap();
        assert_eq!(selection.files.len(), 1);
        assert_eq!(selection.skipped.len(), 1);
        assert_eq!(selection.skipped[0].reason, SkipReason::TooLarge);
        assert!(!selection.truncated);
    }

    #[test]
    fn test_truncation_is_deterministic() {
        let dir = tempdir().unwrap();
        for name in ["d.py", "a.py", "c.py", "b.py"] {
            write(dir.path(), name, "x = 1\n");
        }
        let limits = SelectorLimits {
            max_files: 2,
            ..Default::default()
        };
        let first = select(dir.path(), &limits).unwrap();
        let second = select(dir.path(), &limits).unwrap();
        let names: Vec<_> = first.files.iter().map(|f| f.relative_path.clone()).collect();
        assert_eq!(names, vec!["a.py", "b.py"]);
        assert_eq!(
            names,
            second
                .files
                .iter()
                .map(|f| f.relative_path.clone())
                .collect::<Vec<_>>()
        );
        assert!(first.truncated);
        assert!(first
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::OverLimit));
    }

    #[test]
    fn test_empty_tree() {
        let dir = tempdir().unwrap();
        let selection = select(dir.path(), &SelectorLimits::default()).unwrap();
        assert!(selection.is_empty());
    }

    #[test]
    fn test_missing_root_errors() {
        let dir = tempdir().unwrap();
        assert!(select(&dir.path().join("nope"), &SelectorLimits::default()).is_err());
    }
}
