use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::latency::{LatencyStore, PercentileMode};
use crate::record::{MetricRecord, Outcome};
use crate::running::RunningStats;
use crate::stats::{AggregatedStats, LiveStats, RequestStats};
use crate::users::UserCounters;

pub const GLOBAL_NAME: &str = "Global";

#[derive(Debug)]
struct Series {
    seq: u64,
    ok: u64,
    ko: u64,
    latency: RunningStats,
    store: LatencyStore,
    errors: HashMap<Arc<str>, u64>,
}

impl Series {
    fn new(mode: PercentileMode, seq: u64) -> Self {
        Self {
            seq,
            ok: 0,
            ko: 0,
            latency: RunningStats::default(),
            store: LatencyStore::new(mode),
            errors: HashMap::new(),
        }
    }

    fn push(&mut self, rec: &MetricRecord) {
        let micros = u64::try_from(rec.latency.as_micros()).unwrap_or(u64::MAX);
        self.latency.push(micros as f64);
        self.store.record(micros);

        match rec.outcome {
            Outcome::Success => self.ok = self.ok.saturating_add(1),
            Outcome::Failure => {
                self.ko = self.ko.saturating_add(1);
                if let Some(reason) = &rec.error {
                    *self.errors.entry(Arc::clone(reason)).or_insert(0) += 1;
                }
            }
        }
    }

    fn to_stats(&self, name: Arc<str>, elapsed: Duration) -> RequestStats {
        RequestStats {
            name,
            count: self.ok.saturating_add(self.ko),
            ok: self.ok,
            ko: self.ko,
            elapsed,
            latency: self.latency,
            distribution: self.store.distribution(),
            errors: sorted_errors(&self.errors),
        }
    }
}

fn sorted_errors(errors: &HashMap<Arc<str>, u64>) -> Vec<(Arc<str>, u64)> {
    let mut out: Vec<(Arc<str>, u64)> = errors
        .iter()
        .map(|(k, v)| (Arc::clone(k), *v))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Thread-safe sink for [`MetricRecord`]s.
///
/// Each request name owns one series behind its own lock, so concurrent users recording
/// different requests do not contend. The global rollup is merged from the per-name series at
/// snapshot time. Elapsed time follows the tokio clock, so it matches the runner's timeline.
#[derive(Debug)]
pub struct Aggregator {
    mode: PercentileMode,
    started: Instant,
    series: DashMap<Arc<str>, Arc<Mutex<Series>>>,
    next_seq: AtomicU64,
    users: UserCounters,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(PercentileMode::default())
    }
}

impl Aggregator {
    pub fn new(mode: PercentileMode) -> Self {
        Self {
            mode,
            started: Instant::now(),
            series: DashMap::new(),
            next_seq: AtomicU64::new(0),
            users: UserCounters::new(),
        }
    }

    pub fn mode(&self) -> PercentileMode {
        self.mode
    }

    pub fn users(&self) -> &UserCounters {
        &self.users
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn record(&self, rec: MetricRecord) {
        let series = match self.series.get(&rec.name) {
            Some(s) => Arc::clone(s.value()),
            None => {
                let entry = self.series.entry(Arc::clone(&rec.name)).or_insert_with(|| {
                    let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                    Arc::new(Mutex::new(Series::new(self.mode, seq)))
                });
                Arc::clone(entry.value())
            }
        };
        series.lock().push(&rec);
    }

    fn series_handles(&self) -> Vec<(Arc<str>, Arc<Mutex<Series>>)> {
        self.series
            .iter()
            .map(|e| (Arc::clone(e.key()), Arc::clone(e.value())))
            .collect()
    }

    pub fn snapshot(&self) -> AggregatedStats {
        let elapsed = self.elapsed();
        let handles = self.series_handles();

        let mut requests: Vec<(u64, RequestStats)> = Vec::with_capacity(handles.len());
        let mut global = Series::new(self.mode, u64::MAX);

        for (name, series) in handles {
            let series = series.lock();
            requests.push((series.seq, series.to_stats(name, elapsed)));

            global.ok = global.ok.saturating_add(series.ok);
            global.ko = global.ko.saturating_add(series.ko);
            global.latency.merge(&series.latency);
            global.store.merge(&series.store);
            for (reason, n) in &series.errors {
                *global.errors.entry(Arc::clone(reason)).or_insert(0) += *n;
            }
        }

        requests.sort_by_key(|(seq, _)| *seq);

        AggregatedStats {
            elapsed,
            global: global.to_stats(Arc::from(GLOBAL_NAME), elapsed),
            requests: requests.into_iter().map(|(_, s)| s).collect(),
        }
    }

    pub fn live(&self) -> LiveStats {
        let mut live = LiveStats {
            elapsed: self.elapsed(),
            users: self.users.snapshot(),
            ..LiveStats::default()
        };
        for (_, series) in self.series_handles() {
            let series = series.lock();
            live.ok = live.ok.saturating_add(series.ok);
            live.ko = live.ko.saturating_add(series.ko);
        }
        live.requests = live.ok.saturating_add(live.ko);
        live
    }
}
