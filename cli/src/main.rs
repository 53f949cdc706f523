//! pulseindex CLI: run the replicator and inspect its state.
//!
//! Usage:
//! ```bash
//! pulseindex run    --config pulseindex.yaml
//! pulseindex status --db sqlite:pulseindex.db
//! pulseindex info
//! ```

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use pulseindex_core::types::pulse_timestamp;
use pulseindex_core::{PositionTracker, ReplicatorConfig};
use pulseindex_observability::init_tracing;
use pulseindex_replicator::{HttpExportClient, Replicator};

use crate::config::{AppConfig, DatabaseConfig};

#[derive(Parser, Debug)]
#[command(
    name = "pulseindex",
    about = "Pulse-ledger replicator: correlates exported records into relational entities",
    long_about = "
Pulse-ledger replicator: correlates exported records into relational entities.

ENVIRONMENT VARIABLES:
  PULSEINDEX_SOURCE_URL     Export service URL
  PULSEINDEX_DATABASE_URL   Database URL (memory, sqlite:<path>, postgres://...)
  PULSEINDEX_LOG_LEVEL      Default log level
",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replicate until Ctrl-C
    Run {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show the resume position and the last synced pulse
    Status {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Database URL, overrides the configuration
        #[arg(long)]
        db: Option<String>,
    },

    /// Show defaults and backends
    Info,

    /// Print version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => cmd_run(config.as_deref()).await,
        Commands::Status { config, db } => cmd_status(config.as_deref(), db).await,
        Commands::Info => {
            cmd_info();
            Ok(())
        }
        Commands::Version => {
            println!("pulseindex {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn cmd_run(config: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config)?;
    init_tracing(&config.log);

    let storage = config.database.open().await?;
    let client = Arc::new(HttpExportClient::new(&config.source)?);

    let replicator = Replicator::init(config.replicator.clone(), storage, client.clone(), client)
        .await
        .context("initialising replicator")?;
    let resume = replicator.resume_point();
    info!(
        position = %resume.cursor.position(),
        source = %config.source.url,
        database = %config.database.url,
        "Replicator initialised"
    );

    let handle = replicator.start();
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    let stats = handle.stop().await?;
    info!(
        records = stats.records,
        commits = stats.commits,
        committed_pulse = ?stats.committed_pulse,
        "Replicator stopped"
    );
    Ok(())
}

async fn cmd_status(config: Option<&Path>, db: Option<String>) -> Result<()> {
    let mut config = AppConfig::load(config)?;
    if let Some(url) = db {
        config.database = DatabaseConfig { url };
    }

    let storage = config.database.open().await?;
    let resume = PositionTracker::new(storage)
        .with_start_pulse(config.replicator.start_pulse)
        .resume()
        .await?;

    println!("Database:          {}", config.database.url);
    println!("Resume position:   {}", resume.cursor.position());
    match resume.last_synced_pulse {
        Some(pulse) => {
            let time = chrono::DateTime::from_timestamp(pulse_timestamp(pulse), 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            println!("Last synced pulse: {pulse} ({time})");
        }
        None => println!("Last synced pulse: none"),
    }
    Ok(())
}

fn cmd_info() {
    let defaults = ReplicatorConfig::default();
    println!("PulseIndex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default batch size: {} records/pull", defaults.batch_size);
    println!("  Default drained-stream delay: {} ms", defaults.request_delay_ms);
    println!("  Default commit retry delay: {} ms", defaults.commit_retry_delay_ms);
    println!("  Default pulse batch size: {} pulses/pull", defaults.pulse_batch_size);
    println!("  Storage backends: memory, SQLite (sqlite:<path>), PostgreSQL (postgres://...)");
    println!("  Entities: members, balance updates, transfers, deposits, migration addresses");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn status_reads_config_and_db() {
        let cli = Cli::try_parse_from([
            "pulseindex", "status", "--config", "x.yaml", "--db", "memory",
        ])
        .unwrap();
        match cli.command {
            Commands::Status { config, db } => {
                assert_eq!(config, Some(PathBuf::from("x.yaml")));
                assert_eq!(db.as_deref(), Some("memory"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn db_without_value_is_a_usage_error() {
        let parsed = Cli::try_parse_from(["pulseindex", "status", "--db", "--config", "x.yaml"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn run_defaults_to_no_config_file() {
        let cli = Cli::try_parse_from(["pulseindex", "run"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { config: None }));
    }
}
