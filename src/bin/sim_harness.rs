//! Entry point: parse CLI flags, run a demo kernel for the requested
//! number of cycles, and map the outcome onto the documented exit codes.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use coro_sim_kernel::cli::Cli;
use coro_sim_kernel::error::SimError;
use coro_sim_kernel::kernel::Kernel;
use coro_sim_kernel::{logging, Failure};

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "simulation run failed");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(cli: &Cli) -> Result<(), SimError> {
    let seed = cli.resolved_seed();
    info!(seed, cycles = cli.cycles, "starting sim-harness");

    let mut kernel = Kernel::new();
    let scheduler = kernel.scheduler().clone();
    kernel.spawn_future(Box::pin(async move {
        coro_sim_kernel::delay::delay_ns(&scheduler, 1).await;
        Ok::<(), Failure>(())
    }));
    kernel.start_root_tasks();

    let report = kernel.run_report(cli.cycles);
    let json = serde_json::to_string(&report).map_err(|e| SimError::Cli(e.to_string()))?;
    println!("{json}");

    match report.failure {
        Some(failure) => Err(SimError::Kernel(failure)),
        None => {
            info!("simulation finished");
            Ok(())
        }
    }
}
