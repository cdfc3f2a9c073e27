//! sift - hybrid vector + keyword memory search
//!
//! Main entry point for the sift CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{maintenance, record, search, stats, store};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// sift - hybrid vector + keyword memory search
#[derive(Parser)]
#[command(name = "sift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Database file (overrides [database] path)
    #[arg(long, global = true, env = "SIFT_DATABASE")]
    pub database: Option<PathBuf>,

    /// Disable the vector index for this invocation
    #[arg(long, global = true)]
    pub keyword_only: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a new memory
    Store(store::StoreArgs),

    /// Hybrid search over stored memories
    Search(search::SearchArgs),

    /// Show one memory
    Get(record::GetArgs),

    /// Change a memory's content, type or relevance
    Update(record::UpdateArgs),

    /// Delete a memory
    Delete(record::DeleteArgs),

    /// Show database and index statistics
    Stats(stats::StatsArgs),

    /// Re-embed all memories with the configured provider
    Reindex(maintenance::ReindexArgs),

    /// Check that both indexes match the records table
    Check(maintenance::CheckArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "sift=debug,sift_memory=debug,sift_embed=debug,sift_config=debug,info"
    } else {
        "sift=info,sift_memory=warn,sift_embed=warn,sift_config=warn,warn"
    };

    let log_dir = sift_config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "sift.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "sift=trace,sift_memory=trace,sift_embed=trace,sift_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        database: cli.database,
        keyword_only: cli.keyword_only,
    };

    match cli.command {
        Commands::Store(args) => store::run(args, &ctx).await,
        Commands::Search(args) => search::run(args, &ctx).await,
        Commands::Get(args) => record::get(args, &ctx).await,
        Commands::Update(args) => record::update(args, &ctx).await,
        Commands::Delete(args) => record::delete(args, &ctx).await,
        Commands::Stats(args) => stats::run(args, &ctx).await,
        Commands::Reindex(args) => maintenance::reindex(args, &ctx).await,
        Commands::Check(args) => maintenance::check(args, &ctx).await,
    }
}
