//! `studio-cli` -- submit studio generation jobs and follow them to the end.
//!
//! # Environment variables
//!
//! See [`config::StudioConfig::from_env`]. A `.env` file in the working
//! directory is loaded first. Command-line flags override both.

mod config;
mod payload;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use studio_client::StudioApi;
use studio_core::reducer::{reduce, UiState};
use studio_core::{JobEvent, JobKind};
use studio_tracker::{Callbacks, JobTracker, PollOptions, PollOutcome, TrackedJob};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::StudioConfig;

const DEFAULT_LOG_FILTER: &str = "studio_cli=info,studio_tracker=info,studio_client=info";
const VERBOSE_LOG_FILTER: &str = "studio_cli=debug,studio_tracker=debug,studio_client=debug";

#[derive(Parser)]
#[command(name = "studio-cli")]
#[command(about = "Submit and track studio edit, upscale and video jobs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL (overrides STUDIO_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job and wait for it to finish
    Submit {
        /// Feature to run (edit, upscale, video)
        #[arg(short, long)]
        kind: JobKind,

        /// JSON request body
        #[arg(long)]
        json: Option<PathBuf>,

        /// Extra request field, repeatable
        #[arg(long = "field", value_name = "KEY=VALUE", value_parser = payload::parse_key_value)]
        fields: Vec<(String, String)>,

        /// File attachment, repeatable; switches to a multipart request
        #[arg(long = "file", value_name = "FIELD=PATH", value_parser = payload::parse_key_value)]
        files: Vec<(String, String)>,

        #[command(flatten)]
        poll: PollArgs,
    },

    /// Follow jobs that were already submitted
    Watch {
        /// Feature the jobs belong to
        #[arg(short, long)]
        kind: JobKind,

        /// Job ids to follow
        #[arg(required = true)]
        job_ids: Vec<String>,

        #[command(flatten)]
        poll: PollArgs,
    },
}

#[derive(Args)]
struct PollArgs {
    /// Milliseconds between status requests
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Status requests before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Consecutive failed requests tolerated
    #[arg(long)]
    retry_budget: Option<u32>,
}

impl PollArgs {
    fn apply(&self, mut options: PollOptions) -> PollOptions {
        if let Some(ms) = self.interval_ms {
            options = options.with_interval(Duration::from_millis(ms));
        }
        if let Some(n) = self.max_attempts {
            options = options.with_max_attempts(n);
        }
        if let Some(n) = self.retry_budget {
            options = options.with_retry_budget(n);
        }
        options
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let fallback = if cli.verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = StudioConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    tracing::debug!(api_url = %config.api_url, "Configuration loaded");

    let api = Arc::new(
        StudioApi::with_timeout(&config.api_url, config.request_timeout)
            .context("Failed to build HTTP client")?,
    );
    let tracker = JobTracker::new(api.clone());
    let summary = spawn_summary(&tracker);

    let handles = match cli.command {
        Commands::Submit {
            kind,
            json,
            fields,
            files,
            poll,
        } => {
            let json = json.as_deref().map(payload::load_json).transpose()?;
            let files = files
                .iter()
                .map(|(field, path)| payload::load_file(field, Path::new(path)))
                .collect::<Result<Vec<_>>>()?;
            let request = payload::build(json, fields, files)?;

            let options = poll.apply(config.poll_options(kind));
            let handle = tracker
                .submit_and_track(api.as_ref(), kind, request, options, observer())
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("submitted {}", handle.job_id());
            vec![handle]
        }
        Commands::Watch {
            kind,
            job_ids,
            poll,
        } => {
            let options = poll.apply(config.poll_options(kind));
            let observer = observer();
            job_ids
                .into_iter()
                .map(|id| tracker.start(id, kind, options, observer.clone()))
                .collect()
        }
    };

    let outcomes = tokio::select! {
        outcomes = wait_all(&handles) => outcomes,
        () = shutdown_signal() => {
            tracker.shutdown().await;
            wait_all(&handles).await
        }
    };

    tracker.shutdown().await;
    drop(tracker);
    let state = summary.await.unwrap_or_default();

    Ok(report(&handles, &outcomes, &state))
}

/// Observer that logs progress as it happens.
fn observer() -> Arc<Callbacks> {
    Arc::new(
        Callbacks::new()
            .on_tick(|job| {
                tracing::info!(
                    job_id = %job.id,
                    status = %job.status,
                    attempt = job.attempts,
                    progress = job.progress,
                    "Waiting for job",
                );
            })
            .on_error(|job_id, error| {
                tracing::warn!(job_id, reason = ?error.kind(), "{}", error.user_message());
            }),
    )
}

async fn wait_all(handles: &[TrackedJob]) -> Vec<PollOutcome> {
    futures::future::join_all(handles.iter().map(TrackedJob::outcome)).await
}

/// Subscribe before any job starts, so the summary sees every event.
fn spawn_summary(tracker: &JobTracker) -> tokio::task::JoinHandle<UiState> {
    tokio::spawn(collect_ui_state(tracker.subscribe()))
}

/// Fold every published event into a [`UiState`] until the tracker is gone.
async fn collect_ui_state(mut events: tokio::sync::broadcast::Receiver<JobEvent>) -> UiState {
    let mut state = UiState::default();
    loop {
        match events.recv().await {
            Ok(event) => state = reduce(state, &event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event receiver lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
    state
}

/// Print the outcome of every job and compute the exit status.
fn report(handles: &[TrackedJob], outcomes: &[PollOutcome], state: &UiState) -> ExitCode {
    let mut all_succeeded = true;
    for (handle, outcome) in handles.iter().zip(outcomes) {
        match outcome {
            PollOutcome::Succeeded(result) => {
                for artifact in result.artifacts() {
                    println!("{}\t{}", handle.job_id(), artifact.url);
                }
                if result.artifacts().is_empty() {
                    println!("{}\t(no artifacts)", handle.job_id());
                }
            }
            PollOutcome::Failed(error) => {
                all_succeeded = false;
                let message = state
                    .error_for(handle.job_id())
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| error.user_message());
                eprintln!("{}\tfailed: {message}", handle.job_id());
            }
            PollOutcome::Cancelled => {
                all_succeeded = false;
                eprintln!("{}\tcancelled", handle.job_id());
            }
        }
    }

    tracing::info!(
        jobs = handles.len(),
        artifacts = state.results.len(),
        errors = state.errors.len(),
        "Done",
    );

    if all_succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), stopping jobs"),
        () = terminate => tracing::info!("Received SIGTERM, stopping jobs"),
    }
}
