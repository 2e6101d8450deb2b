//! Analysis orchestrator
//!
//! Drives one run through its stages:
//! 1. Fetch the repository into a private work tree
//! 2. Select analyzable source files
//! 3. Extract structure from every file (rayon)
//! 4. Run complexity, security and architecture analysis concurrently
//! 5. Aggregate scores
//! 6. Narrate, falling back to a deterministic summary
//!
//! Complexity and architecture failures are absorbed as neutral results
//! with a warning; a security failure fails the run. The work tree is
//! removed before a run reports its outcome, and a run that was cancelled
//! is never persisted. Concurrent requests for the same repository and
//! branch share a single run, which is cancelled once every caller waiting
//! on it has gone away.

mod progress;
mod worktree;

pub use progress::{ProgressEvent, Stage};
pub use worktree::WorkTree;

use crate::ai::{build_analysis_prompt, fallback_explanation, NarrativeService, NarrativeServiceError};
use crate::architecture::{self, ArchitectureMetrics};
use crate::complexity::{self, ComplexityReport};
use crate::error::{AcquisitionError, AnalysisError, Dimension};
use crate::fetch::{FetchedTree, LocalFetcher, RepoFetcher, RepoRef};
use crate::models::{AnalysisMetrics, AnalysisResult, StructuralMetrics};
use crate::parsers::{self, ParseStatus, StructuralSummary};
use crate::scoring::{self, ScoreSet, ScoreWeights};
use crate::security::{self, SecurityReport};
use crate::selector::{self, Selection, SelectorLimits, SourceFile};
use crate::storage::ResultStore;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Extra time the orchestrator allows a fetcher beyond its own timeout
const FETCH_GRACE: Duration = Duration::from_secs(5);

/// Branch label used for local directory analysis
pub const LOCAL_BRANCH: &str = "local";

/// Runtime limits and knobs for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Parent of every run's work tree
    pub work_root: PathBuf,
    pub limits: SelectorLimits,
    /// Bounds everything from fetch through narration
    pub overall_timeout: Duration,
    pub fetch_timeout: Duration,
    pub per_file_timeout: Duration,
    pub narrative_timeout: Duration,
    pub weights: ScoreWeights,
    /// Buffered progress events per subscriber
    pub progress_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("repolens-work"),
            limits: SelectorLimits::default(),
            overall_timeout: Duration::from_secs(600),
            fetch_timeout: Duration::from_secs(120),
            per_file_timeout: Duration::from_secs(5),
            narrative_timeout: Duration::from_secs(30),
            weights: ScoreWeights::default(),
            progress_capacity: 256,
        }
    }
}

/// What to analyze. Identical requests in flight are coalesced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisRequest {
    pub repo_url: String,
    pub branch: String,
}

impl AnalysisRequest {
    /// Blank branches mean `main`
    pub fn new(repo_url: impl Into<String>, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        let branch = branch.trim();
        Self {
            repo_url: repo_url.into().trim().to_string(),
            branch: if branch.is_empty() { "main" } else { branch }.to_string(),
        }
    }
}

/// Analyzer entry points.
///
/// [`Analyzers::default`] wires the real analyzers; tests substitute
/// failing ones to exercise fault isolation.
#[derive(Clone, Copy)]
pub struct Analyzers {
    pub complexity: fn(&[StructuralSummary]) -> ComplexityReport,
    pub security: fn(&[SourceFile], Duration, &CancellationToken) -> anyhow::Result<SecurityReport>,
    pub architecture: fn(&[StructuralSummary]) -> ArchitectureMetrics,
}

impl Default for Analyzers {
    fn default() -> Self {
        Self {
            complexity: complexity::analyze,
            security: security::analyze,
            architecture: architecture::analyze,
        }
    }
}

type SharedOutcome = Arc<Result<AnalysisResult, AnalysisError>>;

/// A run that callers can attach to
struct InFlight {
    /// Tells this run apart from a later run of the same request
    generation: u64,
    rx: watch::Receiver<Option<SharedOutcome>>,
    /// Callers currently attached
    waiters: usize,
    token: CancellationToken,
}

type InFlightMap = HashMap<AnalysisRequest, InFlight>;

struct Inner {
    config: OrchestratorConfig,
    fetcher: Arc<dyn RepoFetcher>,
    narrator: Arc<dyn NarrativeService>,
    store: Option<Arc<dyn ResultStore>>,
    analyzers: Analyzers,
    progress: broadcast::Sender<ProgressEvent>,
    /// Parent of every run's token
    shutdown: CancellationToken,
    in_flight: Mutex<InFlightMap>,
    generations: AtomicU64,
}

/// Runs analyses. Cheap to clone; clones share runs and subscribers.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn join_error_message(e: JoinError) -> String {
    if e.is_panic() {
        let payload = e.into_panic();
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panicked".to_string())
    } else {
        e.to_string()
    }
}

async fn blocking<T, F>(what: &str, f: F) -> Result<T, AnalysisError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AnalysisError::Internal(format!("{} task failed: {}", what, join_error_message(e))))
}

async fn wait_for(mut rx: watch::Receiver<Option<SharedOutcome>>) -> SharedOutcome {
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(outcome) = current {
            return outcome;
        }
        if rx.changed().await.is_err() {
            return Arc::new(Err(AnalysisError::Internal(
                "analysis task ended without a result".to_string(),
            )));
        }
    }
}

/// Removes a request from the in-flight map when its run ends, even by panic
struct Registration {
    inner: Arc<Inner>,
    request: AnalysisRequest,
    generation: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut in_flight = lock(&self.inner.in_flight);
        if in_flight.get(&self.request).map(|e| e.generation) == Some(self.generation) {
            in_flight.remove(&self.request);
        }
    }
}

/// One caller attached to a run. Dropping the last one cancels the run.
struct Waiter {
    inner: Arc<Inner>,
    request: AnalysisRequest,
    generation: u64,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let mut in_flight = lock(&self.inner.in_flight);
        let Some(entry) = in_flight.get_mut(&self.request) else {
            return;
        };
        if entry.generation != self.generation {
            return;
        }
        entry.waiters = entry.waiters.saturating_sub(1);
        if entry.waiters == 0 {
            debug!(
                "No callers left for {}@{}; cancelling its run",
                self.request.repo_url, self.request.branch
            );
            entry.token.cancel();
            in_flight.remove(&self.request);
        }
    }
}

/// Identity and current stage of one run
struct RunContext {
    run_id: String,
    repo_url: String,
    branch: String,
    stage: Mutex<Stage>,
}

impl RunContext {
    fn new(request: &AnalysisRequest) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            repo_url: request.repo_url.clone(),
            branch: request.branch.clone(),
            stage: Mutex::new(Stage::Pending),
        }
    }

    fn stage(&self) -> Stage {
        *lock(&self.stage)
    }
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        fetcher: Arc<dyn RepoFetcher>,
        narrator: Arc<dyn NarrativeService>,
        store: Option<Arc<dyn ResultStore>>,
    ) -> Self {
        Self::with_analyzers(config, fetcher, narrator, store, Analyzers::default())
    }

    pub fn with_analyzers(
        config: OrchestratorConfig,
        fetcher: Arc<dyn RepoFetcher>,
        narrator: Arc<dyn NarrativeService>,
        store: Option<Arc<dyn ResultStore>>,
        analyzers: Analyzers,
    ) -> Self {
        let (progress, _) = broadcast::channel(config.progress_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                narrator,
                store,
                analyzers,
                progress,
                shutdown: CancellationToken::new(),
                in_flight: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Receive progress events for every run started after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.progress.subscribe()
    }

    /// Number of distinct runs currently executing
    pub fn in_flight(&self) -> usize {
        lock(&self.inner.in_flight).len()
    }

    /// Cancel every run, current and future
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub async fn analyze(&self, repo_url: &str, branch: &str) -> Result<AnalysisResult, AnalysisError> {
        self.analyze_with_cancel(repo_url, branch, CancellationToken::new())
            .await
    }

    /// Like [`analyze`](Self::analyze), stopping when `cancel` fires.
    ///
    /// Cancelling the caller that started a run cancels the run itself.
    /// A caller that joined an in-flight run only stops waiting, unless it
    /// was the last one attached. Dropping the returned future counts as
    /// going away too.
    pub async fn analyze_with_cancel(
        &self,
        repo_url: &str,
        branch: &str,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let request = AnalysisRequest::new(repo_url, branch);
        self.submit(request, Arc::clone(&self.inner.fetcher), cancel)
            .await
    }

    /// Analyze a directory on disk. The directory is copied into a work
    /// tree first, so it is never modified.
    pub async fn analyze_local(&self, path: &Path) -> Result<AnalysisResult, AnalysisError> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let request = AnalysisRequest::new(path.display().to_string(), LOCAL_BRANCH);
        self.submit(request, Arc::new(LocalFetcher::new()), CancellationToken::new())
            .await
    }

    async fn submit(
        &self,
        request: AnalysisRequest,
        fetcher: Arc<dyn RepoFetcher>,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let (rx, generation, leader) = {
            let mut in_flight = lock(&self.inner.in_flight);
            match in_flight.get_mut(&request) {
                Some(entry) => {
                    debug!("Joining in-flight analysis of {}@{}", request.repo_url, request.branch);
                    entry.waiters += 1;
                    (entry.rx.clone(), entry.generation, false)
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
                    let token = self.inner.shutdown.child_token();
                    in_flight.insert(
                        request.clone(),
                        InFlight {
                            generation,
                            rx: rx.clone(),
                            waiters: 1,
                            token: token.clone(),
                        },
                    );
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(inner.run(request.clone(), generation, fetcher, token, cancel.clone(), tx));
                    (rx, generation, true)
                }
            }
        };
        let _waiter = Waiter {
            inner: Arc::clone(&self.inner),
            request,
            generation,
        };

        // The leader waits for the run itself, which observes the token and
        // cleans up before publishing.
        let outcome = if leader {
            wait_for(rx).await
        } else {
            tokio::select! {
                outcome = wait_for(rx) => outcome,
                _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
            }
        };

        match outcome.as_ref() {
            Ok(result) => Ok(result.clone()),
            Err(e) => Err(e.clone()),
        }
    }
}

impl Inner {
    async fn run(
        self: Arc<Self>,
        request: AnalysisRequest,
        generation: u64,
        fetcher: Arc<dyn RepoFetcher>,
        token: CancellationToken,
        caller: CancellationToken,
        tx: watch::Sender<Option<SharedOutcome>>,
    ) {
        let registration = Registration {
            inner: Arc::clone(&self),
            request: request.clone(),
            generation,
        };
        let link = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = caller.cancelled() => token.cancel(),
                    _ = token.cancelled() => {}
                }
            })
        };

        let outcome = self.execute(&request, fetcher, &token).await;

        link.abort();
        drop(registration);
        tx.send_replace(Some(Arc::new(outcome)));
    }

    fn emit(&self, run: &RunContext, stage: Stage, detail: Option<String>) {
        let previous = std::mem::replace(&mut *lock(&run.stage), stage);
        if previous != stage {
            debug!("Run {} {} -> {}", run.run_id, previous, stage);
        }
        // no subscribers is fine
        let _ = self.progress.send(ProgressEvent {
            run_id: run.run_id.clone(),
            repo_url: run.repo_url.clone(),
            branch: run.branch.clone(),
            stage,
            timestamp: Utc::now(),
            detail,
        });
    }

    /// Record an absorbed problem on the result and announce it
    fn warn_run(&self, run: &RunContext, warnings: &mut Vec<String>, message: String) {
        warn!("{}: {}", run.repo_url, message);
        self.emit(run, run.stage(), Some(message.clone()));
        warnings.push(message);
    }

    async fn execute(
        &self,
        request: &AnalysisRequest,
        fetcher: Arc<dyn RepoFetcher>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let run = RunContext::new(request);
        info!("Analyzing {} ({}) as run {}", run.repo_url, run.branch, run.run_id);
        self.emit(&run, Stage::Pending, None);

        let outcome = self.execute_in_work_tree(&run, fetcher, cancel).await;
        match &outcome {
            Ok(result) => {
                info!(
                    "Analysis of {} complete in {:.1}s: security {:.1}, maintainability {:.1}, architecture {:.1}, debt {:.1} ({})",
                    result.repo_name,
                    result.analysis_duration_seconds,
                    result.scores.security_score,
                    result.scores.maintainability_score,
                    result.scores.architecture_score,
                    result.scores.tech_debt_index,
                    result.scores.refactor_urgency
                );
                self.emit(&run, Stage::Completed, None);
            }
            Err(e) => {
                warn!("Analysis of {} failed: {}", run.repo_url, e);
                self.emit(&run, Stage::Failed, Some(e.to_string()));
            }
        }
        outcome
    }

    async fn execute_in_work_tree(
        &self,
        run: &RunContext,
        fetcher: Arc<dyn RepoFetcher>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();
        let repo = fetcher.repo_ref(&run.repo_url)?;
        let work = WorkTree::create(&self.config.work_root, &run.run_id)
            .map_err(|e| AnalysisError::Internal(format!("Failed to create work tree: {}", e)))?;

        let seconds = self.config.overall_timeout.as_secs();
        let staged = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AnalysisError::Cancelled),
            res = tokio::time::timeout(
                self.config.overall_timeout,
                self.run_stages(run, &repo, fetcher, &work, cancel),
            ) => res.unwrap_or_else(|_| Err(AnalysisError::Timeout {
                stage: run.stage().to_string(),
                seconds,
            })),
        };
        if staged.is_err() {
            // tells any still-running blocking stage to discard its output
            cancel.cancel();
        }
        drop(work);

        let mut result = staged?;
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        result.analysis_duration_seconds = started.elapsed().as_secs_f64();
        self.persist(&mut result).await;
        Ok(result)
    }

    async fn run_stages(
        &self,
        run: &RunContext,
        repo: &RepoRef,
        fetcher: Arc<dyn RepoFetcher>,
        work: &WorkTree,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let config = &self.config;
        let mut warnings = Vec::new();

        self.emit(run, Stage::Pending, Some(format!("fetching {}", repo.full_name())));
        let tree = self.fetch(run, fetcher, work, cancel).await?;
        if tree.branch != run.branch {
            info!("Branch {} not found; analyzed {}", run.branch, tree.branch);
        }

        self.emit(run, Stage::Selecting, None);
        let root = tree.root.clone();
        let limits = config.limits;
        let selection = blocking("selection", move || selector::select(&root, &limits))
            .await?
            .map_err(|e| AnalysisError::Internal(format!("{:#}", e)))?;
        if !selection.skipped.is_empty() {
            self.warn_run(
                run,
                &mut warnings,
                format!("{} files skipped by size limits", selection.skipped.len()),
            );
        }
        if selection.truncated {
            self.warn_run(
                run,
                &mut warnings,
                format!("selection truncated to {} files", selection.files.len()),
            );
        }

        self.emit(run, Stage::Extracting, Some(format!("{} files", selection.files.len())));
        let files = Arc::new(selection.files.clone());
        let summaries = {
            let files = Arc::clone(&files);
            let per_file = config.per_file_timeout;
            let cancel = cancel.clone();
            blocking("extraction", move || parsers::extract_files(&files, per_file, &cancel)).await?
        };
        let summaries = Arc::new(summaries);
        let unparseable = summaries
            .iter()
            .filter(|s| s.status == ParseStatus::Unparseable)
            .count();
        if unparseable > 0 {
            self.warn_run(run, &mut warnings, format!("{} files could not be parsed", unparseable));
        }
        let timed_out = summaries
            .iter()
            .filter(|s| s.status == ParseStatus::TimedOut)
            .count();
        if timed_out > 0 {
            self.warn_run(
                run,
                &mut warnings,
                format!("{} files exceeded the per-file extraction timeout", timed_out),
            );
        }

        self.emit(run, Stage::Analyzing, None);
        let (complexity, security, architecture) = self
            .analyze_dimensions(run, &files, &summaries, cancel, &mut warnings)
            .await?;

        self.emit(run, Stage::Aggregating, None);
        let scores = if files.is_empty() {
            info!("No analyzable files in {}; reporting neutral scores", repo.full_name());
            ScoreSet::neutral()
        } else {
            scoring::aggregate(&complexity, &security, &architecture, &config.weights)
        };

        let metrics = AnalysisMetrics {
            structural: structural_metrics(&selection, &summaries, tree.commit.clone()),
            complexity,
            security,
            architecture,
        };

        self.emit(run, Stage::Narrating, None);
        let llm_explanation = self.narrate(&repo.full_name(), &scores, &metrics).await;

        Ok(AnalysisResult {
            id: run.run_id.clone(),
            repo_name: repo.full_name(),
            repo_url: run.repo_url.clone(),
            branch: tree.branch,
            metrics,
            scores,
            llm_explanation,
            files_analyzed: files.len(),
            total_lines: summaries.iter().map(|s| s.lines.total).sum(),
            analysis_duration_seconds: 0.0,
            warnings,
            created_at: Utc::now(),
        })
    }

    async fn fetch(
        &self,
        run: &RunContext,
        fetcher: Arc<dyn RepoFetcher>,
        work: &WorkTree,
        cancel: &CancellationToken,
    ) -> Result<FetchedTree, AnalysisError> {
        let timeout = self.config.fetch_timeout;
        let url = run.repo_url.clone();
        let branch = run.branch.clone();
        let scratch = work.path().to_path_buf();
        let dest = work.checkout_dir();
        let token = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            let fetched = fetcher.fetch(&url, &branch, &dest, timeout, &token);
            if token.is_cancelled() {
                // the run already removed its work tree; drop whatever arrived late
                let _ = std::fs::remove_dir_all(&scratch);
            }
            fetched
        });

        match tokio::time::timeout(timeout + FETCH_GRACE, task).await {
            Ok(Ok(Err(AcquisitionError::Cancelled))) => Err(AnalysisError::Cancelled),
            Ok(Ok(fetched)) => Ok(fetched?),
            Ok(Err(e)) => Err(AnalysisError::Internal(format!(
                "fetch task failed: {}",
                join_error_message(e)
            ))),
            Err(_) => Err(AcquisitionError::Timeout(timeout.as_secs()).into()),
        }
    }

    /// Run the three analyzers concurrently and join them
    async fn analyze_dimensions(
        &self,
        run: &RunContext,
        files: &Arc<Vec<SourceFile>>,
        summaries: &Arc<Vec<StructuralSummary>>,
        cancel: &CancellationToken,
        warnings: &mut Vec<String>,
    ) -> Result<(ComplexityReport, SecurityReport, ArchitectureMetrics), AnalysisError> {
        let Analyzers {
            complexity: complexity_fn,
            security: security_fn,
            architecture: architecture_fn,
        } = self.analyzers;
        let per_file = self.config.per_file_timeout;
        let complexity_input = Arc::clone(summaries);
        let architecture_input = Arc::clone(summaries);
        let security_input = Arc::clone(files);
        let security_cancel = cancel.clone();

        let (complexity, security, architecture) = tokio::join!(
            tokio::task::spawn_blocking(move || complexity_fn(&complexity_input)),
            tokio::task::spawn_blocking(move || security_fn(&security_input, per_file, &security_cancel)),
            tokio::task::spawn_blocking(move || architecture_fn(&architecture_input)),
        );

        let security = match security {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                return Err(AnalysisError::Analyzer {
                    dimension: Dimension::Security,
                    message: format!("{:#}", e),
                })
            }
            Err(e) => {
                return Err(AnalysisError::Analyzer {
                    dimension: Dimension::Security,
                    message: join_error_message(e),
                })
            }
        };
        if !security.timed_out.is_empty() {
            self.warn_run(
                run,
                warnings,
                format!(
                    "security scan cut short in {} files by the per-file timeout",
                    security.timed_out.len()
                ),
            );
        }

        let complexity = match complexity {
            Ok(report) => report,
            Err(e) => {
                self.warn_run(
                    run,
                    warnings,
                    format!("{} analysis failed ({}); using neutral metrics", Dimension::Complexity, join_error_message(e)),
                );
                ComplexityReport::neutral()
            }
        };
        let architecture = match architecture {
            Ok(metrics) => metrics,
            Err(e) => {
                self.warn_run(
                    run,
                    warnings,
                    format!("{} analysis failed ({}); using neutral metrics", Dimension::Architecture, join_error_message(e)),
                );
                ArchitectureMetrics::neutral()
            }
        };

        Ok((complexity, security, architecture))
    }

    /// Narrative text for a result. Never fails: any service problem yields
    /// the deterministic fallback.
    async fn narrate(&self, repo_name: &str, scores: &ScoreSet, metrics: &AnalysisMetrics) -> String {
        let prompt = build_analysis_prompt(repo_name, scores, metrics);
        let narrator = Arc::clone(&self.narrator);
        let timeout = self.config.narrative_timeout;
        let call = tokio::task::spawn_blocking(move || narrator.generate(&prompt));

        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(generated)) => generated,
            Ok(Err(e)) => Err(NarrativeServiceError::Transport(join_error_message(e))),
            Err(_) => Err(NarrativeServiceError::Timeout(timeout.as_secs())),
        };

        match outcome {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                debug!("Narrative service returned empty text; using fallback");
                fallback_explanation(scores, &metrics.security)
            }
            Err(NarrativeServiceError::NotConfigured(reason)) => {
                debug!("Narrative service not configured ({}); using fallback", reason);
                fallback_explanation(scores, &metrics.security)
            }
            Err(e) => {
                warn!("Narrative generation failed: {}; using fallback", e);
                fallback_explanation(scores, &metrics.security)
            }
        }
    }

    async fn persist(&self, result: &mut AnalysisResult) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let record = result.clone();
        match tokio::task::spawn_blocking(move || store.save(&record)).await {
            Ok(Ok(id)) => debug!("Persisted analysis {}", id),
            Ok(Err(e)) => {
                warn!("Failed to persist analysis {}: {}", result.id, e);
                result.warnings.push(format!("result was not persisted: {}", e));
            }
            Err(e) => {
                let message = join_error_message(e);
                warn!("Failed to persist analysis {}: {}", result.id, message);
                result.warnings.push(format!("result was not persisted: {}", message));
            }
        }
    }
}

/// Roll per-file summaries up into tree-level structural facts
pub fn structural_metrics(
    selection: &Selection,
    summaries: &[StructuralSummary],
    commit: Option<String>,
) -> StructuralMetrics {
    let mut metrics = StructuralMetrics {
        files_selected: selection.files.len(),
        files_skipped: selection.skipped.len(),
        selection_truncated: selection.truncated,
        commit,
        ..Default::default()
    };

    for summary in summaries {
        match summary.status {
            ParseStatus::Parsed => metrics.files_parsed += 1,
            ParseStatus::Unparseable => metrics.files_unparseable += 1,
            ParseStatus::TimedOut => metrics.files_timed_out += 1,
        }
        metrics.total_functions += summary.functions.len();
        metrics.total_classes += summary.classes.len();
        metrics.total_imports += summary.imports.len();
        metrics.code_lines += summary.lines.code;
        metrics.comment_lines += summary.lines.comment;
        *metrics
            .languages
            .entry(summary.language.name().to_string())
            .or_insert(0) += 1;
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::{Language, LineCounts, ParseError};

    #[test]
    fn test_request_defaults_branch() {
        let req = AnalysisRequest::new(" https://github.com/a/b ", "  ");
        assert_eq!(req.repo_url, "https://github.com/a/b");
        assert_eq!(req.branch, "main");
        assert_eq!(req, AnalysisRequest::new("https://github.com/a/b", "main"));
    }

    #[test]
    fn test_structural_metrics_rollup() {
        let lines = LineCounts {
            total: 10,
            code: 8,
            comment: 2,
            ..Default::default()
        };
        let err = ParseError::Syntax {
            path: "b.py".into(),
            error_ratio: 0.9,
        };
        let summaries = vec![
            StructuralSummary::unparseable("b.py".into(), Language::Python, lines, &err),
            StructuralSummary::timed_out("c.go".into(), Language::Go),
        ];
        let selection = Selection {
            truncated: true,
            ..Default::default()
        };
        let metrics = structural_metrics(&selection, &summaries, Some("abc123".into()));

        assert_eq!(metrics.files_unparseable, 1);
        assert_eq!(metrics.files_timed_out, 1);
        assert_eq!(metrics.files_parsed, 0);
        assert_eq!(metrics.code_lines, 8);
        assert_eq!(metrics.languages.get("python"), Some(&1));
        assert!(metrics.selection_truncated);
        assert_eq!(metrics.commit.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_join_error_message_reports_panic() {
        let err = tokio::task::spawn_blocking(|| panic!("analyzer exploded"))
            .await
            .unwrap_err();
        assert_eq!(join_error_message(err), "analyzer exploded");
    }

    #[test]
    fn test_stage_terminal() {
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Analyzing.is_terminal());
    }
}
