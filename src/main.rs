//! # Paperdrop CLI
//!
//! The `paperdrop` binary ingests PDF attachments from a chat channel into
//! a SQLite metadata store.
//!
//! ## Usage
//!
//! ```bash
//! paperdrop --config ./config/paperdrop.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `paperdrop init` | Create the SQLite database and run schema migrations |
//! | `paperdrop run` | Execute one full ingestion run against the channel |
//! | `paperdrop stats` | Print a summary of what is in the store |
//!
//! Credentials come from the environment: `SLACK_BOT_TOKEN` for the message
//! source, `OPENAI_API_KEY` for metadata inference. Both are checked before
//! any work starts.

mod config;
mod db;
mod download;
mod enrich;
mod extract;
mod fetch;
mod metadata;
mod migrate;
mod models;
mod persist;
mod pipeline;
mod progress;
mod source;
mod stats;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::progress::ProgressMode;

/// Paperdrop — batch ingestion of channel PDF attachments into a metadata
/// store.
#[derive(Parser)]
#[command(
    name = "paperdrop",
    about = "Ingest PDF attachments from a chat channel into a metadata store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/paperdrop.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents table. Idempotent;
    /// running it multiple times is safe. `run` also applies migrations, so
    /// this is mainly useful for provisioning.
    Init,

    /// Execute one ingestion run.
    ///
    /// Scans the channel for PDF attachments, downloads new ones, extracts
    /// text, infers title/date metadata, and upserts everything into the
    /// store. Safe to re-run: already-downloaded files and already-persisted
    /// records are skipped or updated in place.
    Run {
        /// Override the configured channel (name or native id).
        #[arg(long)]
        channel: Option<String>,

        /// Progress reporting on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a TTY.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Print store statistics.
    ///
    /// Document counts, metadata coverage, and extracted-text volume.
    Stats,
}

fn parse_progress_mode(arg: Option<&str>) -> Result<ProgressMode> {
    match arg {
        None => Ok(ProgressMode::default_for_tty()),
        Some("off") => Ok(ProgressMode::Off),
        Some("human") => Ok(ProgressMode::Human),
        Some("json") => Ok(ProgressMode::Json),
        Some(other) => bail!("Unknown progress mode: '{}'. Must be off, human, or json.", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Run { channel, progress } => {
            if let Some(channel) = channel {
                cfg.source.channel = channel;
            }
            let reporter = parse_progress_mode(progress.as_deref())?.reporter();

            // Credential checks happen here, before the store probe or any
            // network work.
            let slack = source::SlackSource::new()?;
            let inference = metadata::OpenAiInference::new(&cfg.enrich)?;

            let pool = db::wait_for_store(&cfg).await?;
            migrate::run_migrations(&pool).await?;

            pipeline::run_pipeline(&cfg, &slack, &slack, &inference, &pool, reporter.as_ref())
                .await?;
            pool.close().await;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
