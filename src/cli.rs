//! Command-line surface for the `sim-harness` binary.

use clap::Parser;

/// Cooperative discrete-event simulation harness.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// RNG seed for stimulus generation. Drawn from the OS entropy source
    /// when omitted, so unseeded runs are non-reproducible by design.
    #[arg(long)]
    pub seed: Option<u32>,

    /// Number of scheduler cycles to run before stopping.
    #[arg(long, default_value_t = 100)]
    pub cycles: u64,
}

impl Cli {
    /// The seed to actually use this run: the one given, or a freshly
    /// drawn one (logged so the run can be reproduced later).
    pub fn resolved_seed(&self) -> u32 {
        self.seed.unwrap_or_else(rand::random)
    }
}
