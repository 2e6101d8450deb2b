//! `analyze` and `local` commands

use super::OutputArgs;
use crate::ai::{DisabledNarrative, NarrativeService};
use crate::config::Config;
use crate::error::AnalysisError;
use crate::fetch::GitFetcher;
use crate::models::AnalysisResult;
use crate::pipeline::{Orchestrator, ProgressEvent, Stage};
use crate::reporters::{self, OutputFormat};
use crate::storage::{JsonDirStore, ResultStore};
use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub(super) enum Target {
    Remote { url: String, branch: String },
    Local(PathBuf),
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn stage_message(event: &ProgressEvent) -> String {
    let label = match event.stage {
        Stage::Pending => "Fetching repository",
        Stage::Selecting => "Selecting source files",
        Stage::Extracting => "Extracting structure",
        Stage::Analyzing => "Analyzing complexity, security and architecture",
        Stage::Aggregating => "Scoring",
        Stage::Narrating => "Writing summary",
        Stage::Completed => "Done",
        Stage::Failed => "Failed",
    };
    match &event.detail {
        Some(detail) => format!("{} ({})", label, detail),
        None => format!("{}...", label),
    }
}

/// Mirror progress events onto the spinner until the channel closes
async fn follow_progress(mut events: broadcast::Receiver<ProgressEvent>, spinner: ProgressBar) {
    loop {
        match events.recv().await {
            Ok(event) => {
                debug!("{}", event);
                spinner.set_message(stage_message(&event));
                if event.stage.is_terminal() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub(super) fn run(config: &Config, target: Target, args: &OutputArgs) -> Result<()> {
    let format: OutputFormat = args.format.parse()?;

    let store: Option<Arc<dyn ResultStore>> = if args.no_save {
        None
    } else {
        let dir = config.storage.data_dir();
        match JsonDirStore::open(&dir) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!("Results will not be saved: cannot open {}: {}", dir.display(), e);
                None
            }
        }
    };
    let narrator: Arc<dyn NarrativeService> = if args.no_llm {
        Arc::new(DisabledNarrative)
    } else {
        config.narrative_service()
    };
    let fetcher = Arc::new(GitFetcher::new().with_max_checkout_bytes(config.limits.max_total_bytes.saturating_mul(2)));
    let orchestrator = Orchestrator::new(config.to_orchestrator_config(), fetcher, narrator, store);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let outcome = runtime.block_on(async {
        let spinner = if args.quiet {
            ProgressBar::hidden()
        } else {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(spinner_style());
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        };
        let follower = tokio::spawn(follow_progress(orchestrator.subscribe(), spinner.clone()));

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let outcome = match &target {
            Target::Remote { url, branch } => orchestrator.analyze_with_cancel(url, branch, cancel).await,
            Target::Local(path) => orchestrator.analyze_local(path).await,
        };

        follower.abort();
        spinner.finish_and_clear();
        outcome
    });

    let result = match outcome {
        Ok(result) => result,
        Err(e) => return Err(report_failure(e)),
    };
    emit(&result, format, args.output.as_ref())
}

fn report_failure(e: AnalysisError) -> anyhow::Error {
    if e.is_repository_error() {
        eprintln!(
            "{} Check the URL and branch, and that the repository is public.",
            style("hint:").yellow()
        );
    }
    anyhow::Error::new(e)
}

fn emit(result: &AnalysisResult, format: OutputFormat, output: Option<&PathBuf>) -> Result<()> {
    let rendered = reporters::report(result, format)?;
    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("{} Report written to {}", style("✓").green(), path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
