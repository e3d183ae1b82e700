// Crate-level lint configuration for pedantic clippy
#![allow(clippy::doc_markdown)] // Missing backticks - low priority

//! proofserve server binary
//!
//! Starts the verification dispatcher and serves it over HTTP. On Ctrl+C or
//! SIGTERM the health endpoint flips to 503, in-flight requests finish, and
//! the dispatcher drains its queue before the process exits.

use anyhow::Context;
use clap::Parser;
use proofserve_dispatcher::{Dispatcher, DispatcherConfig, QueuePolicy, RewardConfig};
use proofserve_server::routes::{AppState, ShutdownState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// proofserve verification server
#[derive(Parser, Debug)]
#[command(name = "proofserve-server")]
#[command(about = "Lean proof verification service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "PROOFSERVE_PORT")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "PROOFSERVE_HOST")]
    host: String,

    /// Upper bound on worker count (the pool never exceeds the CPU count)
    #[arg(long, default_value = "64", env = "PROOFSERVE_MAX_WORKERS")]
    max_workers: usize,

    /// Jobs that may wait in the queue at once
    #[arg(long, default_value = "1024", env = "PROOFSERVE_QUEUE_CAPACITY")]
    queue_capacity: usize,

    /// What to do when the queue is full: reject or wait
    #[arg(long, default_value = "reject", env = "PROOFSERVE_QUEUE_POLICY")]
    queue_policy: QueuePolicy,

    /// Default checker executable
    #[arg(long, default_value = "lake", env = "PROOFSERVE_LAKE_PATH")]
    lake_path: PathBuf,

    /// Checker arguments (defaults to `exe repl`); repeat for each argument
    #[arg(long = "checker-arg", value_name = "ARG", allow_hyphen_values = true)]
    checker_args: Vec<String>,

    /// Default Lean workspace the checker runs in
    #[arg(long, default_value = ".", env = "PROOFSERVE_LEAN_WORKSPACE")]
    lean_workspace: PathBuf,

    /// Default per-job timeout in seconds
    #[arg(long, default_value = "1200", env = "PROOFSERVE_TIMEOUT")]
    timeout: u64,

    /// Extra seconds a request waits beyond its timeout before giving up
    #[arg(long, env = "PROOFSERVE_QUEUE_WAIT_BOUND")]
    queue_wait_bound: Option<u64>,

    /// Append one JSON line per completed job to this file
    #[arg(long, env = "PROOFSERVE_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Run at most one checker per workspace directory at a time
    #[arg(long, env = "PROOFSERVE_SERIALIZE_WORKSPACE")]
    serialize_workspace: bool,

    /// Seconds an uncollected verdict is kept before the sweeper drops it
    #[arg(long, default_value = "600", env = "PROOFSERVE_STALE_GRACE")]
    stale_grace: u64,

    /// Seconds between sweeps of the result store
    #[arg(long, default_value = "60", env = "PROOFSERVE_SWEEP_INTERVAL")]
    sweep_interval: u64,

    /// Reward for a completion with an extractable proof
    #[arg(long, default_value = "0.5", env = "PROOFSERVE_FORMAT_SCORE")]
    format_score: f64,

    /// Additional reward when the extracted proof checks
    #[arg(long, default_value = "4.0", env = "PROOFSERVE_PROOF_SCORE")]
    proof_score: f64,
}

impl Args {
    fn dispatcher_config(&self) -> DispatcherConfig {
        let mut config = DispatcherConfig::new()
            .with_max_workers(self.max_workers)
            .with_queue_capacity(self.queue_capacity)
            .with_queue_policy(self.queue_policy)
            .with_workspace(&self.lean_workspace)
            .with_default_timeout(Duration::from_secs(self.timeout))
            .with_serialized_workspace(self.serialize_workspace)
            .with_sweep(
                Duration::from_secs(self.stale_grace),
                Duration::from_secs(self.sweep_interval),
            );
        config = if self.checker_args.is_empty() {
            let args = config.checker_args.clone();
            config.with_checker(&self.lake_path, args)
        } else {
            config.with_checker(&self.lake_path, self.checker_args.iter().cloned())
        };
        if let Some(bound) = self.queue_wait_bound {
            config = config.with_queue_wait_bound(Duration::from_secs(bound));
        }
        if let Some(path) = &self.log_file {
            config = config.with_log_path(path);
        }
        config
    }

    fn reward_config(&self) -> RewardConfig {
        RewardConfig {
            format_score: self.format_score,
            proof_score: self.proof_score,
            ..RewardConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.dispatcher_config();
    info!(
        checker = %config.checker_path.display(),
        workspace = %config.workspace_path.display(),
        workers = config.worker_count(),
        "Starting dispatcher"
    );

    let dispatcher = Arc::new(
        Dispatcher::with_repl_checker(config)
            .await
            .context("failed to start dispatcher")?,
    );
    let health = dispatcher.health_check().await;
    if !health.is_healthy() {
        error!(?health, "Checker is not usable; /health will report degraded");
    }

    let state = Arc::new(AppState::new(Arc::clone(&dispatcher)).with_reward(args.reward_config()));
    let app = proofserve_server::app(Arc::clone(&state));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("proofserve listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
        .await
        .context("server error")?;

    // All HTTP requests are done; let the workers finish anything still queued
    state.set_shutdown_state(ShutdownState::ShuttingDown);
    dispatcher.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM after flipping the server to draining
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    state.set_shutdown_state(ShutdownState::Draining);
    info!("Shutdown state set to Draining - health endpoint now returns 503");
}
