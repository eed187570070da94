//! Nightly Backup - Main entry point
//!
//! Runs one backup pass and exits; scheduling is left to cron.

use anyhow::Result;
use clap::Parser;
use nightly_backup::{config::Config, pipeline::RunPlan, utils, Pipeline};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "NIGHTLY_BACKUP_CONFIG",
        default_value = "nightly-backup.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration and print the plan without running it
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)?;

    // Initialize logging; a dry run writes no log file
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    let log_file = config.log_file();
    utils::logger::init(log_level, (!args.dry_run).then_some(log_file.as_path()))?;

    tracing::info!(
        "Starting nightly-backup v{} (config: {})",
        env!("CARGO_PKG_VERSION"),
        args.config.display()
    );

    if args.dry_run {
        RunPlan::new(&config, chrono::Local::now()).log();
        return Ok(());
    }

    let pipeline = Pipeline::from_config(&config)?;
    let summary = pipeline.run().await?;

    tracing::info!(
        bundle = %summary.bundle.display(),
        key = %summary.uploaded_key,
        archives = summary.archives,
        "Backup run complete"
    );

    Ok(())
}
