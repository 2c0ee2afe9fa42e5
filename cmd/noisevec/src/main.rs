//! noisevec - speech/noise vector estimation for noise-robust ASR.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod archive;
mod commands;

use commands::{
    CopyCommand, EdgesCommand, OnlineCommand, PriorCommand, SegmentCommand, ShowCommand,
};

/// noisevec - speech/noise vector estimation for noise-robust ASR.
///
/// Typical pipeline:
///   - `segment` turns labeled training features into per-utterance vectors
///   - `prior` estimates a noise prior from those vectors
///   - `online` extracts vectors every `period` frames using the prior
///
/// Archives are JSON Lines files of `{"key": ..., "value": ...}` objects;
/// `-` reads stdin or writes stdout.
///
/// Configuration is stored in ~/.giztoy/noisevec/config.yaml.
#[derive(Parser)]
#[command(name = "noisevec")]
#[command(about = "Online speech/noise vector estimation")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.giztoy/noisevec/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output summaries as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Estimate a noise prior from training vectors
    Prior(PriorCommand),
    /// Extract vectors online with a prior
    Online(OnlineCommand),
    /// Per-utterance speech and silence means
    Segment(SegmentCommand),
    /// Per-utterance mean of the edge frames
    Edges(EdgesCommand),
    /// Summarize a prior file
    Show(ShowCommand),
    /// Rewrite a prior file in binary or text form
    Copy(CopyCommand),
}

impl Cli {
    pub fn run(&self) -> anyhow::Result<()> {
        match &self.command {
            Commands::Prior(cmd) => cmd.run(self),
            Commands::Online(cmd) => cmd.run(self),
            Commands::Segment(cmd) => cmd.run(self),
            Commands::Edges(cmd) => cmd.run(self),
            Commands::Show(cmd) => cmd.run(self),
            Commands::Copy(cmd) => cmd.run(self),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout may carry an archive.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    cli.run()
}
