use std::sync::Arc;
use std::time::Duration;

use crate::latency::Distribution;
use crate::running::RunningStats;
use crate::users::UserCounts;

const MICROS_PER_MS: f64 = 1_000.0;

/// Final or point-in-time statistics for one request name (or the global rollup).
///
/// Latency figures cover every record of the series, successful or not, and are reported in
/// milliseconds.
#[derive(Debug, Clone)]
pub struct RequestStats {
    pub name: Arc<str>,
    pub count: u64,
    pub ok: u64,
    pub ko: u64,
    pub(crate) elapsed: Duration,
    pub(crate) latency: RunningStats,
    pub(crate) distribution: Distribution,
    pub(crate) errors: Vec<(Arc<str>, u64)>,
}

impl RequestStats {
    pub fn min_ms(&self) -> Option<f64> {
        self.latency.min().map(|v| v / MICROS_PER_MS)
    }

    pub fn max_ms(&self) -> Option<f64> {
        self.latency.max().map(|v| v / MICROS_PER_MS)
    }

    pub fn mean_ms(&self) -> Option<f64> {
        self.latency.mean().map(|v| v / MICROS_PER_MS)
    }

    pub fn stdev_ms(&self) -> Option<f64> {
        self.latency.stdev().map(|v| v / MICROS_PER_MS)
    }

    /// `p` in 0..=100. `percentile_ms(100.0)` is always the maximum recorded latency.
    pub fn percentile_ms(&self, p: f64) -> Option<f64> {
        if p >= 100.0 {
            return self.max_ms();
        }
        let v = self.distribution.percentile(p)? as f64 / MICROS_PER_MS;
        // Histogram buckets may round past the true extremes.
        match (self.min_ms(), self.max_ms()) {
            (Some(min), Some(max)) => Some(v.clamp(min, max)),
            _ => Some(v),
        }
    }

    pub fn ok_percent(&self) -> Option<f64> {
        percent(self.ok, self.count)
    }

    pub fn ko_percent(&self) -> Option<f64> {
        percent(self.ko, self.count)
    }

    pub fn requests_per_sec(&self) -> f64 {
        per_sec(self.count, self.elapsed.as_secs_f64())
    }

    /// Failure reasons with their counts, most frequent first.
    pub fn errors(&self) -> &[(Arc<str>, u64)] {
        &self.errors
    }
}

#[derive(Debug, Clone)]
pub struct AggregatedStats {
    pub elapsed: Duration,
    pub global: RequestStats,
    /// Per request name, in first-recorded order.
    pub requests: Vec<RequestStats>,
}

impl AggregatedStats {
    pub fn request(&self, name: &str) -> Option<&RequestStats> {
        self.requests.iter().find(|r| r.name.as_ref() == name)
    }
}

/// Cheap counters for progress reporting; no latency data is copied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveStats {
    pub elapsed: Duration,
    pub requests: u64,
    pub ok: u64,
    pub ko: u64,
    pub users: UserCounts,
}

impl LiveStats {
    pub fn requests_per_sec(&self) -> f64 {
        per_sec(self.requests, self.elapsed.as_secs_f64())
    }
}

fn percent(part: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| part as f64 * 100.0 / total as f64)
}

#[inline]
fn per_sec(count: u64, dt_secs: f64) -> f64 {
    let dt = dt_secs.max(1e-9);
    count as f64 / dt
}
