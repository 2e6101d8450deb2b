//! CLI contract tests
//!
//! Runs the built binary against a local fixture directory. Every run gets
//! its own config home and project config, so the user's real settings and
//! saved results are never touched.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn repolens_bin() -> String {
    env!("CARGO_BIN_EXE_repolens").to_string()
}

/// A project dir with a `repolens.toml` pointing storage into it, and a
/// source tree with a single hardcoded password
struct Workspace {
    root: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("results");
        let work = root.path().join("work");
        std::fs::write(
            root.path().join("repolens.toml"),
            format!(
                "[storage]\ndata_dir = {:?}\nwork_dir = {:?}\n\n[llm]\nenabled = false\n",
                data.display().to_string(),
                work.display().to_string()
            ),
        )
        .unwrap();
        std::fs::create_dir_all(root.path().join("src/app")).unwrap();
        std::fs::write(
            root.path().join("src/app/settings.py"),
            "import os\n\nDB_PASSWORD = \"s3cr3t-prod-pw\"\n",
        )
        .unwrap();
        Self { root }
    }

    fn source(&self) -> PathBuf {
        self.root.path().join("src")
    }

    fn run(&self, args: &[&str]) -> (i32, String, String) {
        let output = Command::new(repolens_bin())
            .args(args)
            .current_dir(self.root.path())
            .env("XDG_CONFIG_HOME", self.root.path().join("config-home"))
            .env_remove("GROQ_API_KEY")
            .env_remove("OPENAI_API_KEY")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to run repolens");
        (
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        )
    }

    fn analyze_json(&self, extra: &[&str]) -> serde_json::Value {
        let source = self.source();
        let mut args = vec!["local", source.to_str().unwrap(), "-q", "--format", "json"];
        args.extend_from_slice(extra);
        let (code, stdout, stderr) = self.run(&args);
        assert_eq!(code, 0, "stderr: {}", stderr);
        serde_json::from_str(&stdout).expect("stdout should be JSON")
    }
}

fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
}

// ============================================================================
// local / analyze
// ============================================================================

#[test]
fn test_local_json_output() {
    let ws = Workspace::new();
    let result = ws.analyze_json(&["--no-save"]);

    assert_eq!(result["branch"], "local");
    assert_eq!(result["files_analyzed"], 1);
    let findings = result["metrics"]["security"]["findings"].as_array().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["severity"], "HIGH");
    assert!(result["scores"]["security_score"].as_f64().unwrap() < 100.0);
    assert!(result["llm_explanation"]
        .as_str()
        .unwrap()
        .contains("## Executive Summary"));
    assert!(dir_is_empty(&ws.root.path().join("work")));
    assert!(dir_is_empty(&ws.root.path().join("results")));
}

#[test]
fn test_output_flag_writes_file() {
    let ws = Workspace::new();
    let report = ws.root.path().join("report.txt");
    let source = ws.source();
    let (code, stdout, _) = ws.run(&[
        "local",
        source.to_str().unwrap(),
        "-q",
        "--no-save",
        "-o",
        report.to_str().unwrap(),
    ]);

    assert_eq!(code, 0);
    assert!(stdout.trim().is_empty());
    let text = std::fs::read_to_string(&report).unwrap();
    assert!(text.contains("Hardcoded password"));
}

#[test]
fn test_unknown_format_rejected() {
    let ws = Workspace::new();
    let (code, _, _) = ws.run(&["local", ".", "--format", "sarif"]);
    assert_ne!(code, 0);
}

#[test]
fn test_invalid_url_fails_with_hint() {
    let ws = Workspace::new();
    let (code, _, stderr) = ws.run(&["analyze", "not a url", "-q", "--no-save"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Invalid repository URL"), "stderr: {}", stderr);
    assert!(stderr.contains("hint:"));
}

// ============================================================================
// history / show / delete
// ============================================================================

#[test]
fn test_saved_result_lifecycle() {
    let ws = Workspace::new();
    let saved = ws.analyze_json(&[]);
    let id = saved["id"].as_str().unwrap().to_string();

    let (code, stdout, _) = ws.run(&["history"]);
    assert_eq!(code, 0);
    assert!(stdout.contains(&id));

    let (code, stdout, _) = ws.run(&["history", "--owner", "nobody"]);
    assert_eq!(code, 0);
    assert!(!stdout.contains(&id));

    let (code, stdout, _) = ws.run(&["show", &id, "--format", "json"]);
    assert_eq!(code, 0);
    let shown: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(shown["id"], saved["id"]);
    assert_eq!(shown["scores"], saved["scores"]);

    let (code, _, _) = ws.run(&["delete", &id]);
    assert_eq!(code, 0);
    let (code, _, stderr) = ws.run(&["show", &id]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_config_show_prints_effective_config() {
    let ws = Workspace::new();
    let (code, stdout, _) = ws.run(&["config", "show"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("[timeouts]"));
    assert!(stdout.contains("enabled = false"));
}
