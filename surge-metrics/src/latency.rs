use std::sync::Arc;

use hdrhistogram::Histogram;

/// How a series retains latencies for percentile queries.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum PercentileMode {
    /// Every latency is kept; percentiles use the nearest-rank method.
    #[default]
    Exact,
    /// Bounded-memory hdrhistogram with 3 significant digits.
    Histogram,
}

pub(crate) fn new_default_histogram() -> Histogram<u64> {
    // Microseconds, up to one hour.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

fn add_histogram(h: &mut Histogram<u64>, more: &Histogram<u64>) {
    // Every series histogram comes from `new_default_histogram`, so the bounds always match.
    let added = h.add(more);
    debug_assert!(added.is_ok(), "histogram merge failed: {added:?}");
}

/// Write side: latencies in microseconds.
#[derive(Debug, Clone)]
pub(crate) enum LatencyStore {
    Exact(Vec<u64>),
    Histogram(Histogram<u64>),
}

impl LatencyStore {
    pub(crate) fn new(mode: PercentileMode) -> Self {
        match mode {
            PercentileMode::Exact => Self::Exact(Vec::new()),
            PercentileMode::Histogram => Self::Histogram(new_default_histogram()),
        }
    }

    pub(crate) fn record(&mut self, micros: u64) {
        match self {
            Self::Exact(values) => values.push(micros),
            Self::Histogram(h) => h.saturating_record(micros),
        }
    }

    pub(crate) fn merge(&mut self, other: &Self) {
        match (&mut *self, other) {
            (Self::Exact(values), Self::Exact(more)) => values.extend_from_slice(more),
            (Self::Histogram(h), Self::Histogram(more)) => add_histogram(h, more),
            (Self::Histogram(h), Self::Exact(more)) => {
                more.iter().for_each(|v| h.saturating_record(*v));
            }
            (Self::Exact(values), Self::Histogram(more)) => {
                let mut h = new_default_histogram();
                values.iter().for_each(|v| h.saturating_record(*v));
                add_histogram(&mut h, more);
                *self = Self::Histogram(h);
            }
        }
    }

    pub(crate) fn distribution(&self) -> Distribution {
        match self {
            Self::Exact(values) => {
                let mut sorted = values.clone();
                sorted.sort_unstable();
                Distribution::Exact(sorted.into())
            }
            Self::Histogram(h) => Distribution::Histogram(Arc::new(h.clone())),
        }
    }
}

/// Read side: a frozen, query-only view of a [`LatencyStore`].
#[derive(Debug, Clone)]
pub enum Distribution {
    /// Sorted ascending.
    Exact(Arc<[u64]>),
    Histogram(Arc<Histogram<u64>>),
}

impl Distribution {
    pub fn len(&self) -> u64 {
        match self {
            Self::Exact(values) => values.len() as u64,
            Self::Histogram(h) => h.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Latency in microseconds at percentile `p` (0..=100).
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.is_empty() || !p.is_finite() {
            return None;
        }
        let p = p.clamp(0.0, 100.0);
        match self {
            Self::Exact(values) => {
                let n = values.len();
                let rank = ((p / 100.0) * n as f64).ceil() as usize;
                let idx = rank.clamp(1, n) - 1;
                values.get(idx).copied()
            }
            Self::Histogram(h) => {
                if p >= 100.0 {
                    Some(h.max())
                } else {
                    Some(h.value_at_quantile(p / 100.0))
                }
            }
        }
    }
}
