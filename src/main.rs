//! Cadence worker process.
//!
//! Wires the stores, the message bus and the media toolkit into a worker
//! pool, then runs until Ctrl-C or SIGTERM.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

use cadence_core::config::AppConfig;
use cadence_core::error::AppError;
use cadence_database::{AssetRepository, DatabasePool, JobRepository};
use cadence_media::FfmpegToolkit;
use cadence_worker::lifecycle::JobLifecycle;
use cadence_worker::{MetricsSnapshot, StageExecutor, WorkerPool, WorkerRunner};

#[tokio::main]
async fn main() {
    let env = std::env::var("CADENCE_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Worker exited with error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Cadence worker v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection + migrations ─────────────────
    let db = DatabasePool::connect_with_retry(&config.database).await?;
    if config.database.run_migrations {
        cadence_database::migration::run_migrations(db.pool()).await?;
    }
    let jobs = Arc::new(JobRepository::new(db.pool().clone()));
    let assets = Arc::new(AssetRepository::new(
        db.pool().clone(),
        &config.storage.data_root,
    ));

    // ── Step 2: Media toolkit and stage pipelines ────────────────
    let toolkit = Arc::new(FfmpegToolkit::new(config.pipeline.clone()));
    let executor = StageExecutor::with_default_pipelines(
        JobLifecycle::new(jobs.clone()),
        assets,
        toolkit,
        config.pipeline.clone(),
    );
    tracing::info!(job_types = ?executor.registered_types(), "Pipelines registered");

    // ── Step 3: Worker pool ──────────────────────────────────────
    let pool = Arc::new(WorkerPool::new(config.worker.clone(), jobs, executor));

    // ── Step 4: Message bus subscription ─────────────────────────
    let bus = cadence_bus::connect(&config.bus, pool.instance()).await?;
    let runner = WorkerRunner::new(Arc::clone(&pool), bus, &config.bus);
    let cancel = CancellationToken::new();
    runner.start(cancel.clone()).await?;

    // ── Step 5: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!(
        grace_secs = config.worker.shutdown_grace_seconds,
        "Shutdown signal received, draining in-flight jobs"
    );
    cancel.cancel();
    let stopped = runner.shutdown(config.worker.shutdown_grace()).await;

    log_metrics(&pool.metrics().snapshot());
    db.close().await;

    stopped?;
    tracing::info!("Worker stopped");
    Ok(())
}

fn log_metrics(m: &MetricsSnapshot) {
    tracing::info!(
        received = m.received,
        rejected = m.rejected,
        claimed = m.claimed,
        contended = m.contended,
        claim_errors = m.claim_errors,
        completed = m.completed,
        retried = m.retried,
        dead_lettered = m.dead_lettered,
        failed_non_retryable = m.failed_non_retryable,
        retries_dropped = m.retries_dropped,
        in_flight = m.in_flight,
        p50_ms = m.duration_p50.map(|d| d.as_millis() as u64),
        p95_ms = m.duration_p95.map(|d| d.as_millis() as u64),
        "Worker pool metrics"
    );
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
