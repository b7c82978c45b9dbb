use std::sync::Arc;
use std::time::Duration;

use surge_metrics::{Aggregator, UserCounters};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::options::{RunOptions, SaturationPolicy};
use super::progress;
use super::report::RunReport;
use super::signal::StopReason;
use super::vu::{self, UserContext};
use crate::assertions;
use crate::error::Result;
use crate::executor::RequestExecutor;
use crate::scenario::Simulation;

/// Runs a simulation to completion (or until stopped) and evaluates its assertions.
///
/// Users start at the offsets of the injection profile, each as its own task. Per-user failures
/// never end the run; only invalid options do, before any user starts.
pub async fn run<E: RequestExecutor>(
    simulation: Simulation,
    executor: Arc<E>,
    options: RunOptions,
) -> Result<RunReport> {
    options.validate()?;

    let simulation = Arc::new(simulation);
    let aggregator = Arc::new(Aggregator::new(options.percentiles));
    let stop = options.stop.clone();
    let profile = simulation.injection().clone();
    let users = aggregator.users();

    users.on_scheduled(profile.total_users());
    info!(
        simulation = %simulation.name(),
        users = profile.total_users(),
        steps = simulation.chain().len(),
        max_concurrent_users = ?options.max_concurrent_users,
        "run started"
    );

    let started = Instant::now();

    let deadline_task = options.max_duration.map(|d| {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(started + d).await;
            stop.trigger(StopReason::Deadline);
        })
    });

    let progress_task = options.progress.clone().map(|f| {
        progress::spawn(
            f,
            options.progress_interval,
            started,
            Arc::clone(&aggregator),
            profile.clone(),
        )
    });

    let semaphore = options.max_concurrent_users.map(|n| {
        let permits = usize::try_from(n)
            .unwrap_or(Semaphore::MAX_PERMITS)
            .min(Semaphore::MAX_PERMITS);
        Arc::new(Semaphore::new(permits))
    });

    let mut tasks: JoinSet<()> = JoinSet::new();

    'inject: for (idx, offset) in profile.start_offsets().iter().enumerate() {
        tokio::select! {
            biased;
            _ = stop.wait() => break 'inject,
            _ = tokio::time::sleep_until(started + *offset) => {}
        }

        let permit = match &semaphore {
            None => None,
            Some(sem) => match options.saturation {
                SaturationPolicy::Wait => tokio::select! {
                    biased;
                    _ = stop.wait() => break 'inject,
                    permit = Arc::clone(sem).acquire_owned() => match permit {
                        Ok(p) => Some(p),
                        Err(_) => break 'inject,
                    },
                },
                SaturationPolicy::Drop => match Arc::clone(sem).try_acquire_owned() {
                    Ok(p) => Some(p),
                    Err(_) => {
                        users.on_dropped();
                        debug!(user = idx, "concurrency limit reached, user dropped");
                        continue;
                    }
                },
            },
        };

        users.on_started();
        let ctx = UserContext {
            id: idx as u64,
            simulation: Arc::clone(&simulation),
            executor: Arc::clone(&executor),
            aggregator: Arc::clone(&aggregator),
            stop: stop.clone(),
            request_timeout: options.request_timeout,
        };
        tasks.spawn(vu::run_user(ctx, permit));

        while let Some(res) = tasks.try_join_next() {
            reap(res, users);
        }
    }

    drain(&mut tasks, &stop, options.shutdown_grace, users).await;

    let stop_reason = stop.reason().unwrap_or(StopReason::Completed);
    if let Some(h) = deadline_task {
        h.abort();
    }
    if let Some(h) = progress_task {
        h.abort();
        let _ = h.await;
    }

    let elapsed = started.elapsed();
    let stats = aggregator.snapshot();
    let verdict = assertions::evaluate(simulation.assertions(), &stats);
    let user_counts = users.snapshot();

    info!(
        simulation = %simulation.name(),
        elapsed = ?elapsed,
        requests = stats.global.count,
        failed = stats.global.ko,
        users_completed = user_counts.completed,
        users_failed = user_counts.failed,
        stop_reason = %stop_reason,
        passed = verdict.is_pass(),
        "run finished"
    );

    Ok(RunReport {
        simulation: Arc::from(simulation.name()),
        stats,
        users: user_counts,
        verdict,
        elapsed,
        stop_reason,
    })
}

/// Waits for every user task. Once the stop signal fires, stragglers get `grace` to flush
/// their records and are aborted afterwards.
async fn drain(
    tasks: &mut JoinSet<()>,
    stop: &super::signal::StopHandle,
    grace: Duration,
    users: &UserCounters,
) {
    let mut abort_at: Option<Instant> = None;

    while !tasks.is_empty() {
        let deadline = abort_at.unwrap_or_else(Instant::now);
        tokio::select! {
            biased;
            res = tasks.join_next() => match res {
                Some(res) => reap(res, users),
                None => break,
            },
            _ = stop.wait(), if abort_at.is_none() => {
                abort_at = Some(Instant::now() + grace);
            }
            _ = tokio::time::sleep_until(deadline), if abort_at.is_some() => {
                warn!(remaining = tasks.len(), "aborting users still running after stop");
                tasks.abort_all();
                while let Some(res) = tasks.join_next().await {
                    reap(res, users);
                }
                break;
            }
        }
    }
}

fn reap(res: std::result::Result<(), JoinError>, users: &UserCounters) {
    let Err(err) = res else {
        return;
    };
    if err.is_panic() {
        error!(error = %err, "virtual user panicked");
        users.on_failed();
    } else {
        users.on_cancelled();
    }
}
