use std::sync::Arc;
use std::time::Duration;

use surge_metrics::{Aggregator, LiveStats};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::injection::InjectionProfile;

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// 1-based.
    pub tick: u64,
    pub elapsed: Duration,
    pub live: LiveStats,
    /// Requests/sec over the last interval.
    pub rps_now: f64,
    /// 0-based injection step active now; `None` once every user has been scheduled.
    pub injection_step: Option<usize>,
    pub injection_steps: usize,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

pub(super) fn spawn(
    progress: ProgressFn,
    every: Duration,
    started: Instant,
    aggregator: Arc<Aggregator>,
    profile: InjectionProfile,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(started + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tick: u64 = 0;
        let mut last_at = started;
        let mut last_requests = 0u64;

        loop {
            interval.tick().await;

            tick = tick.saturating_add(1);
            let now = Instant::now();
            let dt = now.duration_since(last_at);
            last_at = now;

            let live = aggregator.live();
            let delta = live.requests.saturating_sub(last_requests);
            last_requests = live.requests;
            let elapsed = now.duration_since(started);

            (progress)(ProgressUpdate {
                tick,
                elapsed,
                live,
                rps_now: delta as f64 / dt.as_secs_f64().max(1e-9),
                injection_step: profile.step_at(elapsed),
                injection_steps: profile.steps().len(),
            });
        }
    })
}
