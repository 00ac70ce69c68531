//! Worker pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Worker pool and retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent executors.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Capacity of the bounded intake queue.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Deadline for a single job attempt, in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,
    /// Base delay for exponential retry backoff, in milliseconds.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    /// Upper bound on retries waiting in the backoff scheduler.
    #[serde(default = "default_max_pending_retries")]
    pub max_pending_retries: usize,
    /// Seconds to wait for in-flight jobs after a shutdown signal.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// Instance label prefix for worker names; a random suffix is added when empty.
    #[serde(default)]
    pub instance_name: String,
}

impl WorkerConfig {
    /// Per-attempt deadline.
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_seconds)
    }

    /// Backoff base delay.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Graceful shutdown window.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_size: default_queue_size(),
            job_timeout_seconds: default_job_timeout(),
            retry_base_delay_ms: default_retry_base_delay(),
            max_pending_retries: default_max_pending_retries(),
            shutdown_grace_seconds: default_shutdown_grace(),
            instance_name: String::new(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_queue_size() -> usize {
    64
}

fn default_job_timeout() -> u64 {
    600
}

fn default_retry_base_delay() -> u64 {
    2_000
}

fn default_max_pending_retries() -> usize {
    1_024
}

fn default_shutdown_grace() -> u64 {
    660
}
