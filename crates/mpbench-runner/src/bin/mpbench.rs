//! mpbench
//!
//! Runs the configured experiment matrix against the benchmark server:
//! every (congestion, scheduler, delay, loss, interrupt) case, repeated for
//! the configured number of iterations, resuming from existing artifacts.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use mpbench_common::config::BenchConfig;
use mpbench_netem::controller::{paths_from_config, NetemController, PathShaper};
use mpbench_runner::coordinator::RunCoordinator;
use mpbench_runner::host::result_root;
use mpbench_runner::matrix::MatrixDriver;
use mpbench_runner::telemetry::CwndFileSampler;
use mpbench_runner::workload::QperfWorkload;
use tracing_subscriber::EnvFilter;

/// Multipath transport benchmark runner.
#[derive(Parser, Debug)]
#[command(name = "mpbench", about = "Run the multipath benchmark matrix")]
struct Cli {
    /// Experiment table (TOML).
    #[arg(long, default_value = "mpbench.toml")]
    config: PathBuf,

    /// Artifact root override. Defaults to `<output.root>/result<host group>`.
    #[arg(long)]
    result_root: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = BenchConfig::from_path(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let paths = paths_from_config(&config.paths);
    let controller = NetemController::new(paths.to_vec());
    let sampler = CwndFileSampler::new(&config.telemetry.cwnd_dir);
    let workload = QperfWorkload::from_config(&config.workload);
    let root = cli
        .result_root
        .unwrap_or_else(|| result_root(&config.output));

    tracing::info!(
        server = %config.workload.server_host,
        root = %root.display(),
        cases = config.matrix.len(),
        iterations = config.iterations,
        "client up"
    );

    let coordinator = RunCoordinator::new(
        PathShaper::new(&controller, &paths),
        &sampler,
        &workload,
        config.workload.server_host.clone(),
    )
    .with_sample_interval(config.sample_interval);

    let summary = MatrixDriver::new(&config, coordinator, root).run_campaign();

    tracing::info!(
        succeeded = summary.succeeded,
        abandoned = summary.abandoned,
        skipped = summary.skipped,
        "client down"
    );
    Ok(())
}
