//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod bus;
pub mod database;
pub mod logging;
pub mod pipeline;
pub mod storage;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use self::bus::BusConfig;
pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::pipeline::{PipelineConfig, StageTimeouts};
pub use self::storage::StorageConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Message bus settings.
    #[serde(default)]
    pub bus: BusConfig,
    /// Worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Processing pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// File storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `CADENCE__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        Self::load_from("config/default", env)
    }

    /// Load configuration from an explicit base file plus the environment overlay.
    pub fn load_from(base: &str, env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(base).required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("CADENCE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.worker.concurrency == 0 {
            return Err(AppError::configuration("worker.concurrency must be at least 1"));
        }
        if self.worker.queue_size == 0 {
            return Err(AppError::configuration("worker.queue_size must be at least 1"));
        }
        if self.worker.max_pending_retries == 0 {
            return Err(AppError::configuration(
                "worker.max_pending_retries must be at least 1",
            ));
        }

        let longest_stage = self.pipeline.timeouts.longest();
        if longest_stage >= self.worker.job_timeout() {
            return Err(AppError::configuration(format!(
                "every stage timeout must be shorter than worker.job_timeout_seconds ({}s), \
                 longest stage timeout is {}s",
                self.worker.job_timeout_seconds,
                longest_stage.as_secs()
            )));
        }

        match self.bus.provider.as_str() {
            "redis" | "memory" => Ok(()),
            other => Err(AppError::configuration(format!(
                "Unknown bus provider '{other}', expected 'redis' or 'memory'"
            ))),
        }
    }
}
