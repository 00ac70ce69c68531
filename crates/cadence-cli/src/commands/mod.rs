//! CLI command definitions and dispatch.

pub mod job;
pub mod migrate;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use cadence_core::config::AppConfig;
use cadence_core::error::AppError;
use cadence_core::traits::MessageBus;
use cadence_database::DatabasePool;

use crate::output::OutputFormat;

/// Cadence: audio processing job operations
#[derive(Debug, Parser)]
#[command(name = "cadence", version, about, long_about = None)]
pub struct Cli {
    /// Base configuration file, without extension
    #[arg(short, long, default_value = "config/default")]
    pub config: String,

    /// Environment overlay (`config/<env>.toml`)
    #[arg(short, long, env = "CADENCE_ENV", default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Job inspection and recovery
    Job(job::JobArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config = AppConfig::load_from(&self.config, &self.env)?;
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &config).await,
            Commands::Job(args) => job::execute(args, &config, self.format).await,
        }
    }
}

/// Helper: create database pool from config
pub async fn create_db_pool(config: &AppConfig) -> Result<DatabasePool, AppError> {
    DatabasePool::connect(&config.database).await
}

/// Helper: connect to the configured message bus for publishing
pub async fn connect_bus(config: &AppConfig) -> Result<Arc<dyn MessageBus>, AppError> {
    let bus = cadence_bus::connect(&config.bus, "cadence-cli").await?;
    tracing::debug!(bus = bus.bus_type(), topic = %config.bus.topic, "Connected to message bus");
    if bus.bus_type() == "memory" {
        crate::output::print_warning(
            "bus.provider is 'memory'; published messages stay inside this process",
        );
    }
    Ok(bus)
}
