//! medallion: standalone bronze/silver ETL runner.
//!
//! Each invocation runs exactly one stage against the configured stores
//! and exits: zero on success, non-zero on any failure, leaving retry
//! decisions to the external scheduler.

use clap::{Parser, Subcommand};
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use medallion::config::Config;
use medallion::error::{AddressParseSnafu, ConfigSnafu, MetricsSnafu, PipelineError};
use medallion::metrics;
use medallion::pipeline::{run_bronze, run_check, run_silver};

/// Chunked bronze/silver batch ETL over delimited accident data.
#[derive(Parser, Debug)]
#[command(name = "medallion")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration and endpoint connectivity
    /// without processing.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    stage: Stage,
}

/// Pipeline stage to run.
#[derive(Subcommand, Debug)]
enum Stage {
    /// Read the raw delimited source and publish the normalized bronze artifact.
    Bronze,
    /// Load the bronze artifact into the relational table and publish the
    /// silver artifact.
    Silver,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("medallion starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    // Initialize metrics if enabled
    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    if args.dry_run {
        info!("Dry run mode - validating configuration and connectivity");
        info!("Source: {}", config.source.path);
        info!("Bronze artifact: {}/{}", config.bronze.url, config.bronze.key);
        info!("Silver artifact: {}/{}", config.silver.url, config.silver.key);
        info!("Table: {}", config.database.table);
        info!("Chunk size: {}", config.database.chunk_size);
        run_check(&config).await?;
        info!("Configuration is valid");
        return Ok(());
    }

    match args.stage {
        Stage::Bronze => {
            let stats = run_bronze(&config).await?;
            info!("Bronze stage completed successfully");
            info!("  Rows read: {}", stats.rows_read);
            info!("  Batches: {}", stats.batches);
            info!("  Null coercions: {}", stats.null_coercions);
            info!(
                "  Artifact: {} ({} bytes)",
                stats.artifact_url, stats.artifact_size
            );
        }
        Stage::Silver => {
            let stats = run_silver(&config).await?;
            info!("Silver stage completed successfully");
            info!("  Rows loaded: {}", stats.rows_loaded);
            info!("  Chunks: {}", stats.chunks);
            info!("  Table: {}", stats.table);
            info!(
                "  Artifact: {} ({} bytes)",
                stats.artifact_url, stats.artifact_size
            );
        }
    }

    Ok(())
}
