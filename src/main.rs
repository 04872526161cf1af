//! Document database backup/restore tool
//!
//! Provides CLI interface for backup, restore and most-recent lookup

// docbackup/src/main.rs
mod backup;
mod config;
mod database;
mod errors;
mod restore;
mod session;
mod snapshot;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::AppConfig;
use errors::AppError;
use session::Session;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Backup and restore a document database to S3, FTP or a local directory
#[derive(Parser)]
#[command(name = "docbackup", version)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump the database and upload a new archive
    Backup {
        /// Number of most recent backups to keep (0 keeps all)
        #[arg(long, default_value_t = 0)]
        keep: usize,
    },

    /// Restore an archive into the configured database
    Restore {
        /// Archive name, http(s) URL, or "latest"
        #[arg(default_value = restore::MOST_RECENT_SOURCE)]
        source: String,

        /// Read a named archive from the local filesystem instead of storage
        #[arg(long)]
        no_fetch: bool,
    },

    /// Print the reference of the most recent backup
    MostRecent,
}

/// Main entry point for the backup/restore tool
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run_app(cli).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

async fn run_app(cli: Cli) -> Result<()> {
    let app_config = AppConfig::load(&cli.config).context(format!(
        "Failed to load application configuration from {}",
        cli.config.display()
    ))?;

    match cli.command {
        Command::Backup { keep } => {
            println!("🚀 Starting Backup Process...");
            let session = Session::open(&app_config)
                .await
                .context("Failed to open backup session")?;
            backup::run_backup_flow(&session, keep).await?;
        }
        Command::Restore { source, no_fetch } => {
            println!("🔄 Starting Restore Process...");
            let session = Session::open(&app_config)
                .await
                .context("Failed to open restore session")?;
            restore::run_restore_flow(&session, &source, !no_fetch).await?;
        }
        Command::MostRecent => {
            let storage = storage::from_config(&app_config.storage)
                .await
                .context("Failed to set up backup storage")?;
            restore::show_most_recent(storage.as_ref()).await?;
        }
    }
    Ok(())
}

/// Exit code of the first [`AppError`] in the error chain, `1` otherwise.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<AppError>())
        .map_or(1, AppError::exit_code)
}
