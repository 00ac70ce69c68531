//! Job inspection, submission and recovery commands.

use chrono::{Duration, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use cadence_core::config::AppConfig;
use cadence_core::error::AppError;
use cadence_core::traits::MessageBus;
use cadence_core::types::{JobId, JobStatus, PageRequest};
use cadence_database::repositories::job::JobFilter;
use cadence_database::{AssetRepository, DatabasePool, JobRepository};
use cadence_entity::asset::CreateAsset;
use cadence_entity::job::{CreateJob, DEFAULT_JOB_TYPE, DEFAULT_MAX_RETRIES, Job};

use crate::output::{self, OutputFormat};

/// Arguments for job commands
#[derive(Debug, Args)]
pub struct JobArgs {
    /// Job subcommand
    #[command(subcommand)]
    pub command: JobCommand,
}

/// Job subcommands
#[derive(Debug, Subcommand)]
pub enum JobCommand {
    /// Register an uploaded file and queue a job for it
    Submit {
        /// File path relative to `storage.data_root`
        path: String,
        /// Original file name (defaults to the last path component)
        #[arg(long)]
        name: Option<String>,
        /// Pipeline to run
        #[arg(long, default_value = DEFAULT_JOB_TYPE)]
        job_type: String,
        /// Retry ceiling
        #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
        max_retries: i32,
    },
    /// Show one job with its log trail
    Show {
        /// Job ID
        id: i64,
    },
    /// List jobs, newest first
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<JobStatus>,
        /// Filter by job type
        #[arg(short = 't', long)]
        job_type: Option<String>,
        /// Page number
        #[arg(long, default_value_t = 1)]
        page: u64,
        /// Page size
        #[arg(long, default_value_t = 25)]
        page_size: u64,
    },
    /// Count jobs per status
    Stats,
    /// Publish the message of a queued job again
    Republish {
        /// Job ID
        id: i64,
    },
    /// Re-queue running jobs whose worker stopped reporting
    Recover {
        /// Minutes without an update before a running job counts as stale
        #[arg(long, default_value_t = 30)]
        stale_minutes: i64,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

/// Job display row for table output
#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    /// Job ID
    id: i64,
    /// Asset ID
    asset: i64,
    /// Pipeline
    #[tabled(rename = "type")]
    job_type: String,
    /// Status
    status: String,
    /// Progress
    progress: String,
    /// Retries used / allowed
    retries: String,
    /// Last claiming worker
    worker: String,
    /// Last change
    updated: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.0,
            asset: job.asset_id.0,
            job_type: job.job_type.clone(),
            status: job.status.to_string(),
            progress: format!("{}%", job.progress),
            retries: format!("{}/{}", job.retry_count, job.max_retries),
            worker: output::or_dash(job.worker_id.as_deref()),
            updated: job.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Status count row for table output
#[derive(Debug, Serialize, Tabled)]
struct StatusCountRow {
    /// Status
    status: String,
    /// Number of jobs
    count: i64,
}

/// Zero-filled counts for every status, in lifecycle order.
fn status_counts(counts: &[(JobStatus, i64)]) -> Vec<StatusCountRow> {
    JobStatus::ALL
        .iter()
        .map(|status| StatusCountRow {
            status: status.to_string(),
            count: counts
                .iter()
                .find(|(s, _)| s == status)
                .map_or(0, |(_, n)| *n),
        })
        .collect()
}

/// Name stored for an upload when none is given.
fn original_name(path: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => name.to_string(),
        None => path.rsplit('/').next().unwrap_or(path).to_string(),
    }
}

/// Execute job commands
pub async fn execute(
    args: &JobArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let db = super::create_db_pool(config).await?;
    let jobs = JobRepository::new(db.pool().clone());

    let result = match &args.command {
        JobCommand::Submit {
            path,
            name,
            job_type,
            max_retries,
        } => submit(config, &db, &jobs, path, name.as_deref(), job_type, *max_retries, format).await,
        JobCommand::Show { id } => show(&db, &jobs, JobId(*id), format).await,
        JobCommand::List {
            status,
            job_type,
            page,
            page_size,
        } => {
            let filter = JobFilter {
                status: *status,
                job_type: job_type.clone(),
            };
            let page = PageRequest::new(*page, *page_size);
            let rows: Vec<JobRow> = jobs
                .list(&filter, &page)
                .await?
                .iter()
                .map(JobRow::from)
                .collect();
            output::print_list(&rows, format);
            Ok(())
        }
        JobCommand::Stats => {
            let rows = status_counts(&jobs.count_by_status().await?);
            output::print_list(&rows, format);
            Ok(())
        }
        JobCommand::Republish { id } => republish(config, &jobs, JobId(*id)).await,
        JobCommand::Recover {
            stale_minutes,
            force,
        } => recover(config, &jobs, *stale_minutes, *force, format).await,
    };

    db.close().await;
    result
}

#[allow(clippy::too_many_arguments)]
async fn submit(
    config: &AppConfig,
    db: &DatabasePool,
    jobs: &JobRepository,
    path: &str,
    name: Option<&str>,
    job_type: &str,
    max_retries: i32,
    format: OutputFormat,
) -> Result<(), AppError> {
    if max_retries < 1 {
        return Err(AppError::validation("--max-retries must be at least 1"));
    }

    let assets = AssetRepository::new(db.pool().clone(), &config.storage.data_root);
    let absolute = assets.data_root().join(path);
    if !tokio::fs::try_exists(&absolute).await.unwrap_or(false) {
        output::print_warning(&format!(
            "{} does not exist yet; the job will fail if it is still missing when claimed",
            absolute.display()
        ));
    }

    let bus = super::connect_bus(config).await?;
    let asset = assets
        .create(&CreateAsset {
            original_name: original_name(path, name),
            path: path.to_string(),
        })
        .await?;
    let job = jobs
        .create(&CreateJob {
            asset_id: asset.id,
            job_type: job_type.to_string(),
            max_retries,
        })
        .await?;
    publish(bus.as_ref(), config, &job).await?;

    match format {
        OutputFormat::Table => {
            output::print_success(&format!("Queued job {} for asset {}", job.id, asset.id))
        }
        OutputFormat::Json => output::print_json(&job),
    }
    Ok(())
}

async fn show(
    db: &DatabasePool,
    jobs: &JobRepository,
    id: JobId,
    format: OutputFormat,
) -> Result<(), AppError> {
    let job = jobs
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;

    if format == OutputFormat::Json {
        output::print_json(&job);
        return Ok(());
    }

    // Asset lookup needs no data root: only stored metrics are shown.
    let asset = AssetRepository::new(db.pool().clone(), "")
        .find_by_id(job.asset_id)
        .await?;

    println!("Job {}", job.id);
    output::print_kv("Type", &job.job_type);
    output::print_kv("Status", job.status.as_str());
    output::print_kv("Progress", &format!("{}%", job.progress));
    output::print_kv("Retries", &format!("{}/{}", job.retry_count, job.max_retries));
    output::print_kv("Worker", &output::or_dash(job.worker_id.as_deref()));
    output::print_kv("Created", &job.created_at.to_rfc3339());
    output::print_kv("Started", &output::or_dash(job.started_at.map(|t| t.to_rfc3339())));
    output::print_kv("Finished", &output::or_dash(job.finished_at.map(|t| t.to_rfc3339())));
    if !job.last_error.is_empty() {
        output::print_kv("Last error", &job.last_error);
    }

    if let Some(asset) = asset {
        println!();
        println!("Asset {} ({})", asset.id, asset.original_name);
        output::print_kv("Input", &asset.path);
        output::print_kv("Output", &output::or_dash(asset.output_path.as_deref()));
        output::print_kv("Waveform", &output::or_dash(asset.waveform_path.as_deref()));
        output::print_kv("Duration (s)", &output::or_dash(asset.duration_seconds));
        output::print_kv("Loudness (LUFS)", &output::or_dash(asset.integrated_lufs));
        output::print_kv("BPM", &output::or_dash(asset.bpm));
        output::print_kv("Key", &output::or_dash(asset.musical_key.as_deref()));
    }

    println!();
    println!("Log:");
    for line in job.log_lines() {
        println!("  {line}");
    }
    Ok(())
}

async fn republish(config: &AppConfig, jobs: &JobRepository, id: JobId) -> Result<(), AppError> {
    let job = jobs
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;

    if job.status != JobStatus::Queued {
        return Err(AppError::conflict(format!(
            "Job {id} is {}; only queued jobs can be republished",
            job.status
        )));
    }

    let bus = super::connect_bus(config).await?;
    publish(bus.as_ref(), config, &job).await?;
    output::print_success(&format!("Republished job {id}"));
    Ok(())
}

async fn recover(
    config: &AppConfig,
    jobs: &JobRepository,
    stale_minutes: i64,
    force: bool,
    format: OutputFormat,
) -> Result<(), AppError> {
    if stale_minutes < 1 {
        return Err(AppError::validation("--stale-minutes must be at least 1"));
    }

    if !force {
        let confirm = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Re-queue every running job idle for {stale_minutes} minutes or more? \
                 Only do this when its worker is gone."
            ))
            .default(false)
            .interact()
            .map_err(|e| AppError::internal(format!("Input error: {e}")))?;

        if !confirm {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let bus = super::connect_bus(config).await?;
    let cutoff = Utc::now() - Duration::minutes(stale_minutes);
    let recovered = jobs.requeue_stale(cutoff).await?;

    let mut unpublished = 0usize;
    for job in &recovered {
        tracing::info!(job_id = %job.id, "Re-queued stale job");
        if let Err(e) = publish(bus.as_ref(), config, job).await {
            unpublished += 1;
            output::print_warning(&format!("Job {} re-queued but not published: {e}", job.id));
        }
    }

    let rows: Vec<JobRow> = recovered.iter().map(JobRow::from).collect();
    output::print_list(&rows, format);
    if format == OutputFormat::Table {
        output::print_success(&format!(
            "Recovered {} job(s), {} published",
            recovered.len(),
            recovered.len() - unpublished
        ));
    }
    Ok(())
}

async fn publish(bus: &dyn MessageBus, config: &AppConfig, job: &Job) -> Result<(), AppError> {
    let payload = job.message().to_bytes()?;
    bus.publish(&config.bus.topic, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_counts_fill_missing_statuses() {
        let rows = status_counts(&[(JobStatus::Done, 7), (JobStatus::Queued, 2)]);
        let pairs: Vec<(&str, i64)> = rows.iter().map(|r| (r.status.as_str(), r.count)).collect();
        assert_eq!(
            pairs,
            vec![("queued", 2), ("running", 0), ("done", 7), ("failed", 0)]
        );
    }

    #[test]
    fn test_original_name_defaults_to_file_name() {
        assert_eq!(original_name("uploads/2024/take1.wav", None), "take1.wav");
        assert_eq!(original_name("take1.wav", None), "take1.wav");
        assert_eq!(original_name("uploads/x.wav", Some("Take One.wav")), "Take One.wav");
    }
}
