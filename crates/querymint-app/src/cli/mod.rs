use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "querymint",
    version,
    author,
    about = "Generate search queries for content hits"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Enrich a hits dataset with generated queries, checkpointing as it goes.
    Enrich(EnrichArgs),
    /// Flatten a checkpoint into a CSV table.
    Export(ExportArgs),
}

#[derive(Debug, Args)]
pub struct EnrichArgs {
    /// JSON dataset of hits (array or `{ "hits": [...] }`).
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,
    /// Checkpoint file; defaults to `storage.checkpoint_path` from config.
    #[arg(long, value_name = "FILE")]
    pub checkpoint: Option<PathBuf>,
    /// Hits per batch; the checkpoint is flushed on batch boundaries.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Maximum number of generation calls in flight.
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Flush the checkpoint every N batches.
    #[arg(long)]
    pub save_every: Option<usize>,
    /// Continue from an existing checkpoint, skipping enriched hits.
    #[arg(long)]
    pub resume: bool,
    /// Only consider the first N hits of the dataset.
    #[arg(long)]
    pub limit: Option<usize>,
    /// Override the generation model key.
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Checkpoint file; defaults to `storage.checkpoint_path` from config.
    #[arg(long, value_name = "FILE")]
    pub checkpoint: Option<PathBuf>,
    /// Destination CSV file.
    #[arg(long, value_name = "FILE")]
    pub output: PathBuf,
}
