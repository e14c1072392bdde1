//! # Belly Buzz CLI (`buzz`)
//!
//! ## Usage
//!
//! ```bash
//! buzz --config ./config/buzz.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `buzz init` | Create the SQLite database and run schema migrations |
//! | `buzz run` | Collect, resolve, score, persist, and export |
//! | `buzz stats` | Print database counts and the top restaurants by buzz |
//!
//! ## Examples
//!
//! ```bash
//! # Offline run against the bundled sample posts, nothing written to the db
//! buzz run --mock-data --dry-run --output ./out/data.json
//!
//! # Last three days of the configured sources
//! buzz run --days 3 --limit 25
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `belly_buzz=info`).

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use belly_buzz::config;
use belly_buzz::migrate;
use belly_buzz::pipeline::{run_pipeline, RunOptions};
use belly_buzz::stats;

/// Belly Buzz: restaurant mention aggregation and buzz scoring.
#[derive(Parser)]
#[command(
    name = "buzz",
    about = "Belly Buzz — turns restaurant chatter into ranked, deduplicated restaurant records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/buzz.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Run the pipeline once.
    Run {
        /// Maximum items per source (defaults to `pipeline.limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Only consider content from the last N days (defaults to `pipeline.days_back`).
        #[arg(long)]
        days: Option<u32>,

        /// Use the bundled sample posts instead of the configured sources.
        #[arg(long)]
        mock_data: bool,

        /// Run the full pipeline against an in-memory store.
        #[arg(long)]
        dry_run: bool,

        /// Export path (defaults to `export.output`).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show database statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("belly_buzz=info,belly_buzz_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Run {
            limit,
            days,
            mock_data,
            dry_run,
            output,
        } => {
            let mut opts = RunOptions::from_config(&cfg);
            if let Some(limit) = limit {
                opts.limit = limit;
            }
            if let Some(days) = days {
                opts.days_back = days;
            }
            opts.mock_data = mock_data;
            opts.dry_run = dry_run;
            opts.output = output;

            let report = run_pipeline(&cfg, &opts).await?;
            println!("{}", report);
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
