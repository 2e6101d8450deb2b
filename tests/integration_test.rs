//! Integration tests for the analysis pipeline
//!
//! These drive a full [`Orchestrator`] over fixture trees written by a test
//! fetcher, so no network or git binary is involved. They verify:
//! - Empty and clean trees score neutrally
//! - Findings and cycles move the matching scores
//! - Runs are deterministic and independent of file order
//! - Identical concurrent requests share one run
//! - Cancellation and failures leave no work trees and persist nothing
//! - Cancellation reaches a running fetch, and abandoned runs stop
//! - Overall and per-file timeouts behave as documented
//! - Analyzer faults are isolated (security excepted)
//!
//! Each test uses its own temp directories.

use repolens::ai::{NarrativeService, NarrativeServiceError};
use repolens::complexity::ComplexityReport;
use repolens::error::{AcquisitionError, AnalysisError, Dimension};
use repolens::fetch::{FetchedTree, RepoFetcher};
use repolens::models::Severity;
use repolens::architecture::ArchitectureMetrics;
use repolens::parsers::StructuralSummary;
use repolens::pipeline::{Analyzers, Orchestrator, OrchestratorConfig, Stage};
use repolens::scoring::RefactorUrgency;
use repolens::security::SecurityReport;
use repolens::selector::SourceFile;
use repolens::storage::{MemoryStore, ResultStore};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const URL: &str = "https://github.com/acme/widgets";

const CREDENTIAL_FILE: &str = "import os\n\nDB_PASSWORD = \"s3cr3t-prod-pw\"\n\ndef connect():\n    return os.getenv(\"HOST\")\n";

/// How often a slow fixture fetch checks for cancellation
const FETCH_POLL: Duration = Duration::from_millis(10);

/// Writes a fixed set of files into the destination, optionally slowly
struct FixtureFetcher {
    files: Vec<(String, String)>,
    delay: Duration,
    fetches: AtomicUsize,
    saw_cancel: AtomicBool,
}

impl FixtureFetcher {
    fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
            saw_cancel: AtomicBool::new(false),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn saw_cancel(&self) -> bool {
        self.saw_cancel.load(Ordering::SeqCst)
    }
}

impl RepoFetcher for FixtureFetcher {
    fn fetch(
        &self,
        _url: &str,
        branch: &str,
        dest: &Path,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<FetchedTree, AcquisitionError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        while started.elapsed() < self.delay {
            if cancel.is_cancelled() {
                self.saw_cancel.store(true, Ordering::SeqCst);
                return Err(AcquisitionError::Cancelled);
            }
            std::thread::sleep(FETCH_POLL);
        }
        fs::create_dir_all(dest)?;
        for (path, content) in &self.files {
            let target = dest.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, content)?;
        }
        Ok(FetchedTree {
            root: dest.to_path_buf(),
            branch: branch.to_string(),
            commit: None,
        })
    }
}

struct CannedNarrative;

impl NarrativeService for CannedNarrative {
    fn generate(&self, _prompt: &str) -> Result<String, NarrativeServiceError> {
        Ok("## Executive Summary\nCanned narrative.".to_string())
    }
}

struct BrokenNarrative;

impl NarrativeService for BrokenNarrative {
    fn generate(&self, _prompt: &str) -> Result<String, NarrativeServiceError> {
        Err(NarrativeServiceError::Http {
            status: 503,
            message: "overloaded".to_string(),
        })
    }
}

struct Harness {
    work_root: TempDir,
    fetcher: Arc<FixtureFetcher>,
    store: Arc<MemoryStore>,
    orchestrator: Orchestrator,
}

impl Harness {
    fn new(fetcher: FixtureFetcher) -> Self {
        Self::with(fetcher, Arc::new(CannedNarrative), Analyzers::default())
    }

    fn with(fetcher: FixtureFetcher, narrator: Arc<dyn NarrativeService>, analyzers: Analyzers) -> Self {
        Self::build(fetcher, narrator, analyzers, |_| {})
    }

    fn configured(fetcher: FixtureFetcher, tweak: impl FnOnce(&mut OrchestratorConfig)) -> Self {
        Self::build(fetcher, Arc::new(CannedNarrative), Analyzers::default(), tweak)
    }

    fn build(
        fetcher: FixtureFetcher,
        narrator: Arc<dyn NarrativeService>,
        analyzers: Analyzers,
        tweak: impl FnOnce(&mut OrchestratorConfig),
    ) -> Self {
        let work_root = tempfile::tempdir().expect("should create work root");
        let fetcher = Arc::new(fetcher);
        let store = Arc::new(MemoryStore::new());
        let mut config = OrchestratorConfig {
            work_root: work_root.path().to_path_buf(),
            ..Default::default()
        };
        tweak(&mut config);
        let orchestrator = Orchestrator::with_analyzers(
            config,
            fetcher.clone(),
            narrator,
            Some(store.clone() as Arc<dyn ResultStore>),
            analyzers,
        );
        Self {
            work_root,
            fetcher,
            store,
            orchestrator,
        }
    }

    fn work_entries(&self) -> usize {
        fs::read_dir(self.work_root.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Poll `done` until it holds or `limit` passes
async fn eventually(limit: Duration, done: impl Fn() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < limit {
        if done() {
            return true;
        }
        tokio::time::sleep(FETCH_POLL).await;
    }
    done()
}

// ============================================================================
// Scoring through the full pipeline
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_empty_tree_scores_neutral() {
    let h = Harness::new(FixtureFetcher::new(&[("README.md", "# widgets\n")]));
    let result = h.orchestrator.analyze(URL, "main").await.expect("should analyze");

    assert_eq!(result.files_analyzed, 0);
    assert_eq!(result.scores.security_score, 100.0);
    assert_eq!(result.scores.maintainability_score, 100.0);
    assert_eq!(result.scores.architecture_score, 100.0);
    assert_eq!(result.scores.tech_debt_index, 0.0);
    assert_eq!(result.scores.refactor_urgency, RefactorUrgency::Low);
    assert!(!result.llm_explanation.is_empty());
    assert_eq!(result.repo_name, "acme/widgets");
    assert_eq!(result.branch, "main");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_credential_one_high_finding() {
    let h = Harness::new(FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]));
    let result = h.orchestrator.analyze(URL, "main").await.expect("should analyze");

    let findings = &result.metrics.security.findings;
    assert_eq!(findings.len(), 1, "findings: {:?}", findings);
    assert_eq!(findings[0].severity, Severity::High);
    assert_eq!(findings[0].cwe.map(|c| c.to_string()).as_deref(), Some("CWE-798"));
    assert_eq!(findings[0].file, "app/settings.py");
    assert_eq!(findings[0].line, 3);
    assert!(result.scores.security_score < 100.0);
    assert_eq!(result.files_analyzed, 1);
    assert_eq!(result.total_lines, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_import_cycle_lowers_architecture_score() {
    let chain = Harness::new(FixtureFetcher::new(&[
        ("pkg/a.py", "import pkg.b\n"),
        ("pkg/b.py", "import pkg.c\n"),
        ("pkg/c.py", "import os\n"),
    ]));
    let cycle = Harness::new(FixtureFetcher::new(&[
        ("pkg/a.py", "import pkg.b\n"),
        ("pkg/b.py", "import pkg.c\n"),
        ("pkg/c.py", "import pkg.a\n"),
    ]));

    let acyclic = chain.orchestrator.analyze(URL, "main").await.expect("should analyze");
    let cyclic = cycle.orchestrator.analyze(URL, "main").await.expect("should analyze");

    assert!(acyclic.metrics.architecture.cycles.is_empty());
    assert_eq!(cyclic.metrics.architecture.cycle_count(), 1);
    assert!(cyclic.scores.architecture_score < acyclic.scores.architecture_score);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_runs_are_deterministic_and_order_independent() {
    let files = [
        ("app/settings.py", CREDENTIAL_FILE),
        ("app/views.py", "from app import settings\n\ndef index(req):\n    if req:\n        return 1\n    return 0\n"),
        ("web/main.js", "const x = require('./util');\nfunction run(a) { return eval(a); }\n"),
        ("web/util.js", "module.exports = {};\n"),
    ];
    let mut reversed = files;
    reversed.reverse();

    let first = Harness::new(FixtureFetcher::new(&files));
    let a = first.orchestrator.analyze(URL, "main").await.expect("should analyze");
    let b = first.orchestrator.analyze(URL, "main").await.expect("should analyze");
    let other = Harness::new(FixtureFetcher::new(&reversed));
    let c = other.orchestrator.analyze(URL, "main").await.expect("should analyze");

    assert_ne!(a.id, b.id);
    assert_eq!(a.scores, b.scores);
    assert_eq!(a.metrics, b.metrics);
    assert_eq!(a.scores, c.scores);
    assert_eq!(a.metrics, c.metrics);
}

// ============================================================================
// Coalescing, cancellation and cleanup
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_identical_requests_share_one_run() {
    let h = Harness::new(
        FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]).slow(Duration::from_millis(300)),
    );
    let (a, b) = tokio::join!(
        h.orchestrator.analyze(URL, "main"),
        h.orchestrator.analyze(URL, "  "),
    );
    let (a, b) = (a.expect("first caller"), b.expect("second caller"));

    assert_eq!(h.fetcher.fetch_count(), 1);
    assert_eq!(a.id, b.id);
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.orchestrator.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_run_leaves_nothing_behind() {
    let h = Harness::new(
        FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]).slow(Duration::from_millis(400)),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let outcome = h.orchestrator.analyze_with_cancel(URL, "main", cancel).await;
    assert_eq!(outcome.unwrap_err(), AnalysisError::Cancelled);

    assert!(eventually(Duration::from_secs(2), || h.work_entries() == 0).await);
    assert!(h.store.is_empty());
    assert_eq!(h.orchestrator.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_reaches_running_fetch() {
    let h = Harness::new(
        FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]).slow(Duration::from_secs(10)),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = h.orchestrator.analyze_with_cancel(URL, "main", cancel).await;
    assert_eq!(outcome.unwrap_err(), AnalysisError::Cancelled);

    // well within the fetch's own delay
    assert!(eventually(Duration::from_millis(500), || h.fetcher.saw_cancel()).await);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(eventually(Duration::from_secs(1), || h.work_entries() == 0).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dropped_caller_cancels_run() {
    let h = Harness::new(
        FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]).slow(Duration::from_millis(400)),
    );
    let orchestrator = h.orchestrator.clone();
    let caller = tokio::spawn(async move { orchestrator.analyze(URL, "main").await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.orchestrator.in_flight(), 1);
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    assert_eq!(h.orchestrator.in_flight(), 0);
    assert!(eventually(Duration::from_millis(500), || h.fetcher.saw_cancel()).await);
    assert!(eventually(Duration::from_secs(1), || h.work_entries() == 0).await);
    // past the point where an unattended run would have finished
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(h.store.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remaining_caller_keeps_shared_run() {
    let h = Harness::new(
        FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]).slow(Duration::from_millis(300)),
    );
    let orchestrator = h.orchestrator.clone();
    let dropped = tokio::spawn(async move { orchestrator.analyze(URL, "main").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let kept = h.orchestrator.analyze(URL, "main");
    let abort_soon = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        dropped.abort();
    };
    let (result, _) = tokio::join!(kept, abort_soon);

    let result = result.expect("remaining caller should get the result");
    assert_eq!(h.fetcher.fetch_count(), 1);
    assert!(!h.fetcher.saw_cancel());
    assert_eq!(h.store.get(&result.id).expect("should be stored"), result);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overall_timeout_fails_cleanly() {
    let h = Harness::configured(
        FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]).slow(Duration::from_secs(10)),
        |config| config.overall_timeout = Duration::from_millis(100),
    );
    let started = Instant::now();
    let err = h.orchestrator.analyze(URL, "main").await.unwrap_err();

    match err {
        AnalysisError::Timeout { ref stage, .. } => assert_eq!(stage, "pending"),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!err.is_repository_error());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(eventually(Duration::from_millis(500), || h.fetcher.saw_cancel()).await);
    assert!(eventually(Duration::from_secs(1), || h.work_entries() == 0).await);
    assert!(h.store.is_empty());
    assert_eq!(h.orchestrator.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_completed_run_removes_work_tree() {
    let h = Harness::new(FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]));
    h.orchestrator.analyze(URL, "main").await.expect("should analyze");
    assert_eq!(h.work_entries(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalid_url_is_repository_error() {
    let h = Harness::new(FixtureFetcher::new(&[]));
    let err = h
        .orchestrator
        .analyze("not a url", "main")
        .await
        .unwrap_err();

    assert!(err.is_repository_error());
    assert!(matches!(
        err,
        AnalysisError::Acquisition(AcquisitionError::InvalidUrl(_))
    ));
    assert_eq!(h.fetcher.fetch_count(), 0);
    assert_eq!(h.work_entries(), 0);
    assert!(h.store.is_empty());
}

// ============================================================================
// Fault isolation
// ============================================================================

fn exploding_complexity(_: &[StructuralSummary]) -> ComplexityReport {
    panic!("complexity analyzer exploded")
}

fn exploding_architecture(_: &[StructuralSummary]) -> ArchitectureMetrics {
    panic!("architecture analyzer exploded")
}

fn failing_security(_: &[SourceFile], _: Duration, _: &CancellationToken) -> anyhow::Result<SecurityReport> {
    anyhow::bail!("scanner offline")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_complexity_failure_is_absorbed() {
    let analyzers = Analyzers {
        complexity: exploding_complexity,
        ..Analyzers::default()
    };
    let h = Harness::with(
        FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]),
        Arc::new(CannedNarrative),
        analyzers,
    );
    let result = h.orchestrator.analyze(URL, "main").await.expect("should still complete");

    assert!(result.metrics.complexity.degraded);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("complexity analysis failed")));
    assert_eq!(result.metrics.security.findings.len(), 1);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_architecture_failure_is_absorbed() {
    let analyzers = Analyzers {
        architecture: exploding_architecture,
        ..Analyzers::default()
    };
    let h = Harness::with(
        FixtureFetcher::new(&[
            ("pkg/a.py", "import pkg.b\n"),
            ("pkg/b.py", "import pkg.c\n"),
            ("pkg/c.py", "import pkg.a\n"),
        ]),
        Arc::new(CannedNarrative),
        analyzers,
    );
    let result = h.orchestrator.analyze(URL, "main").await.expect("should still complete");

    assert!(result.metrics.architecture.degraded);
    assert!(result.metrics.architecture.cycles.is_empty());
    assert_eq!(result.scores.architecture_score, 100.0);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("architecture analysis failed")));
    assert!(!result.metrics.complexity.degraded);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_file_timeout_marks_files_without_failing() {
    let h = Harness::configured(
        FixtureFetcher::new(&[
            ("app/settings.py", CREDENTIAL_FILE),
            ("web/main.js", "function run(a) { return a; }\n"),
        ]),
        |config| config.per_file_timeout = Duration::ZERO,
    );
    let result = h.orchestrator.analyze(URL, "main").await.expect("should still complete");

    assert_eq!(result.files_analyzed, 2);
    assert_eq!(result.metrics.structural.files_timed_out, 2);
    assert_eq!(result.metrics.structural.files_parsed, 0);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("2 files exceeded the per-file extraction timeout")));
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.work_entries(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_security_failure_fails_run() {
    let analyzers = Analyzers {
        security: failing_security,
        ..Analyzers::default()
    };
    let h = Harness::with(
        FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]),
        Arc::new(CannedNarrative),
        analyzers,
    );
    let err = h.orchestrator.analyze(URL, "main").await.unwrap_err();

    match err {
        AnalysisError::Analyzer { dimension, message } => {
            assert_eq!(dimension, Dimension::Security);
            assert!(message.contains("scanner offline"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(h.store.is_empty());
    assert_eq!(h.work_entries(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_narrative_failure_uses_fallback() {
    let h = Harness::with(
        FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]),
        Arc::new(BrokenNarrative),
        Analyzers::default(),
    );
    let result = h.orchestrator.analyze(URL, "main").await.expect("should analyze");

    assert!(result.llm_explanation.starts_with("## Executive Summary"));
    assert!(result.llm_explanation.contains("Found 1 security issues."));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_narrative_service_text_is_used() {
    let h = Harness::new(FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]));
    let result = h.orchestrator.analyze(URL, "main").await.expect("should analyze");
    assert!(result.llm_explanation.contains("Canned narrative."));
}

// ============================================================================
// Persistence and progress
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_completed_result_is_persisted() {
    let h = Harness::new(FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]));
    let result = h.orchestrator.analyze(URL, "main").await.expect("should analyze");

    let stored = h.store.get(&result.id).expect("should be stored");
    assert_eq!(stored, result);
    let listed = h.store.list(Some("acme"), 10, 0).expect("should list");
    assert_eq!(listed.len(), 1);
    assert!(h.store.list(Some("someone-else"), 10, 0).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_progress_events_follow_stage_order() {
    let h = Harness::new(FixtureFetcher::new(&[("app/settings.py", CREDENTIAL_FILE)]));
    let mut events = h.orchestrator.subscribe();
    let result = h.orchestrator.analyze(URL, "main").await.expect("should analyze");

    let mut stages = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.run_id, result.id);
        assert_eq!(event.repo_url, URL);
        if stages.last() != Some(&event.stage) {
            stages.push(event.stage);
        }
    }
    assert_eq!(
        stages,
        vec![
            Stage::Pending,
            Stage::Selecting,
            Stage::Extracting,
            Stage::Analyzing,
            Stage::Aggregating,
            Stage::Narrating,
            Stage::Completed,
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_local_directory_analysis() {
    let src = tempfile::tempdir().unwrap();
    fs::create_dir_all(src.path().join("app")).unwrap();
    fs::write(src.path().join("app/settings.py"), CREDENTIAL_FILE).unwrap();

    let h = Harness::new(FixtureFetcher::new(&[]));
    let result = h
        .orchestrator
        .analyze_local(src.path())
        .await
        .expect("should analyze local dir");

    assert!(result.repo_name.starts_with("local/"));
    assert_eq!(result.branch, "local");
    assert_eq!(result.metrics.security.findings.len(), 1);
    assert_eq!(h.fetcher.fetch_count(), 0);
    assert!(src.path().join("app/settings.py").exists());
    assert_eq!(h.work_entries(), 0);
}
