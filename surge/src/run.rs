use std::sync::Arc;

use anyhow::Context as _;
use surge_core::{HttpClient, RunOptions, StopHandle};
use tracing::{debug, warn};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::simulation_yaml::{self, LoadedSimulation};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let LoadedSimulation {
        simulation,
        settings,
    } = simulation_yaml::load(&args.simulation)
        .await
        .map_err(RunError::InvalidInput)?;

    let stop = StopHandle::new();
    let opts = RunOptions {
        max_concurrent_users: args.max_concurrent_users.or(settings.max_concurrent_users),
        saturation: settings.saturation,
        max_duration: args.max_duration.or(settings.max_duration),
        request_timeout: settings.request_timeout,
        percentiles: settings.percentiles,
        progress: out.progress(),
        stop: stop.clone(),
        ..RunOptions::default()
    };
    opts.validate()
        .context("invalid run options")
        .map_err(RunError::InvalidInput)?;
    debug!(options = ?opts, "run options resolved");

    out.print_header(&simulation);

    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping virtual users");
            stop.stop();
        }
    });

    let result = surge_core::run(simulation, Arc::new(HttpClient::default()), opts).await;
    ctrl_c.abort();

    let report = result
        .context("run failed")
        .map_err(RunError::RuntimeError)?;

    out.print_report(&report)
        .context("failed to write report")
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_verdict(report.passed()))
}
