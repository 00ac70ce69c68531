//! Database migration management commands.

use clap::{Args, Subcommand};

use cadence_core::config::AppConfig;
use cadence_core::error::AppError;

use crate::output;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand
    #[command(subcommand)]
    pub command: MigrateCommand,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// List the migrations embedded in this binary
    List,
}

/// Execute migration commands
pub async fn execute(args: &MigrateArgs, config: &AppConfig) -> Result<(), AppError> {
    match &args.command {
        MigrateCommand::Run => {
            let pool = super::create_db_pool(config).await?;
            println!("Running database migrations...");
            cadence_database::migration::run_migrations(pool.pool()).await?;
            output::print_success("All migrations applied successfully.");
            pool.close().await;
        }
        MigrateCommand::List => {
            for (version, description) in cadence_database::migration::embedded() {
                println!("  {version:>14}  {description}");
            }
        }
    }

    Ok(())
}
