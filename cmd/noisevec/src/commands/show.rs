//! Prior inspection.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use giztoy_noisevec::NoisePrior;
use serde::Serialize;

use super::output;
use crate::archive::matrix_to_rows;
use crate::Cli;

/// Summarize a prior file as YAML (or JSON with --json).
#[derive(Args)]
pub struct ShowCommand {
    /// Prior file (binary or text)
    prior: PathBuf,

    /// Include the B, Lambda_n and Lambda_s matrices
    #[arg(long)]
    full: bool,

    /// Output file (default: stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct PriorSummary {
    dim: usize,
    r_s: f64,
    r_n: f64,
    mu_n: Vec<f64>,
    a: Vec<f64>,
    zero_evidence: Vec<f64>,
    /// trace(Lambda_s) and trace(Lambda_n): rough precision magnitudes.
    trace_lambda_s: f64,
    trace_lambda_n: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    matrices: Option<PriorMatrices>,
}

#[derive(Debug, Serialize)]
struct PriorMatrices {
    b: Vec<Vec<f64>>,
    lambda_n: Vec<Vec<f64>>,
    lambda_s: Vec<Vec<f64>>,
}

impl PriorSummary {
    fn new(prior: &NoisePrior, full: bool) -> Self {
        Self {
            dim: prior.dim(),
            r_s: prior.r_s(),
            r_n: prior.r_n(),
            mu_n: prior.mu_n().iter().copied().collect(),
            a: prior.a().iter().copied().collect(),
            zero_evidence: prior.zero_evidence_vector().iter().copied().collect(),
            trace_lambda_s: prior.lambda_s().trace(),
            trace_lambda_n: prior.lambda_n().trace(),
            matrices: full.then(|| PriorMatrices {
                b: matrix_to_rows(prior.b()),
                lambda_n: matrix_to_rows(prior.lambda_n()),
                lambda_s: matrix_to_rows(prior.lambda_s()),
            }),
        }
    }
}

impl ShowCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let prior = NoisePrior::load(&self.prior)
            .with_context(|| format!("read prior {}", self.prior.display()))?;
        output(cli, self.output.clone()).write(&PriorSummary::new(&prior, self.full))
    }
}
