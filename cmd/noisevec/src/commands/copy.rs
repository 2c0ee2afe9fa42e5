//! Prior format conversion.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use giztoy_noisevec::NoisePrior;
use tracing::info;

use super::{get_config, ModeArgs};
use crate::Cli;

/// Rewrite a prior file, for example to turn a binary prior into text.
#[derive(Args)]
pub struct CopyCommand {
    /// Input prior file (binary or text)
    input: PathBuf,

    /// Output prior file
    output: PathBuf,

    #[command(flatten)]
    mode: ModeArgs,
}

impl CopyCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let prior = NoisePrior::load(&self.input)
            .with_context(|| format!("read prior {}", self.input.display()))?;
        let binary = self.mode.binary(&cfg);
        prior
            .save(&self.output, binary)
            .with_context(|| format!("write prior {}", self.output.display()))?;
        info!(output = %self.output.display(), binary, "wrote prior");
        Ok(())
    }
}
