use std::fmt;
use std::sync::Arc;

use surge_metrics::{AggregatedStats, RequestStats};

use crate::compare::CompareOp;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssertionScope {
    Global,
    Request(Arc<str>),
}

impl fmt::Display for AssertionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Request(name) => write!(f, "request `{name}`"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseTimeStat {
    Min,
    Max,
    Mean,
    Stdev,
    Percentile(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssertionMetric {
    /// Milliseconds.
    ResponseTime(ResponseTimeStat),
    SuccessfulPercent,
    SuccessfulCount,
    FailedPercent,
    FailedCount,
    AllCount,
    RequestsPerSec,
}

impl AssertionMetric {
    fn parse(raw: &str) -> std::result::Result<Self, String> {
        let lower = raw.to_ascii_lowercase();
        let metric = match lower.as_str() {
            "response_time.min" => Self::ResponseTime(ResponseTimeStat::Min),
            "response_time.max" => Self::ResponseTime(ResponseTimeStat::Max),
            "response_time.mean" => Self::ResponseTime(ResponseTimeStat::Mean),
            "response_time.stdev" => Self::ResponseTime(ResponseTimeStat::Stdev),
            "response_time.p50" => Self::ResponseTime(ResponseTimeStat::Percentile(50.0)),
            "response_time.p75" => Self::ResponseTime(ResponseTimeStat::Percentile(75.0)),
            "response_time.p95" => Self::ResponseTime(ResponseTimeStat::Percentile(95.0)),
            "response_time.p99" => Self::ResponseTime(ResponseTimeStat::Percentile(99.0)),
            "successful_requests.percent" => Self::SuccessfulPercent,
            "successful_requests.count" => Self::SuccessfulCount,
            "failed_requests.percent" => Self::FailedPercent,
            "failed_requests.count" => Self::FailedCount,
            "all_requests.count" => Self::AllCount,
            "requests_per_sec" => Self::RequestsPerSec,
            other => {
                let Some(inner) = other
                    .strip_prefix("response_time.p(")
                    .and_then(|v| v.strip_suffix(')'))
                else {
                    return Err(format!("unknown metric `{raw}`"));
                };
                let p: f64 = inner
                    .parse()
                    .map_err(|_| format!("invalid percentile `{inner}`"))?;
                if !(p > 0.0 && p <= 100.0) {
                    return Err(format!("percentile out of range: {inner}"));
                }
                Self::ResponseTime(ResponseTimeStat::Percentile(p))
            }
        };
        Ok(metric)
    }

    fn observe(&self, stats: &RequestStats) -> Option<f64> {
        match *self {
            Self::ResponseTime(ResponseTimeStat::Min) => stats.min_ms(),
            Self::ResponseTime(ResponseTimeStat::Max) => stats.max_ms(),
            Self::ResponseTime(ResponseTimeStat::Mean) => stats.mean_ms(),
            Self::ResponseTime(ResponseTimeStat::Stdev) => stats.stdev_ms(),
            Self::ResponseTime(ResponseTimeStat::Percentile(p)) => stats.percentile_ms(p),
            Self::SuccessfulPercent => stats.ok_percent(),
            Self::SuccessfulCount => Some(stats.ok as f64),
            Self::FailedPercent => stats.ko_percent(),
            Self::FailedCount => Some(stats.ko as f64),
            Self::AllCount => Some(stats.count as f64),
            Self::RequestsPerSec => Some(stats.requests_per_sec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub scope: AssertionScope,
    pub metric: AssertionMetric,
    pub op: CompareOp,
    pub threshold: f64,
    /// Expression as written, for diagnostics.
    pub expression: Arc<str>,
}

impl Assertion {
    /// Parses `<metric> <op> <number>`, e.g. `response_time.p95 < 1000`.
    pub fn parse(scope: AssertionScope, raw: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidAssertion {
            expression: raw.to_string(),
            reason,
        };

        let (left, op, right) =
            CompareOp::split(raw).ok_or_else(|| invalid("missing operator".to_string()))?;
        if left.is_empty() || right.is_empty() {
            return Err(invalid("expected `<metric> <op> <number>`".to_string()));
        }

        let metric = AssertionMetric::parse(&left).map_err(invalid)?;
        let threshold: f64 = right
            .parse()
            .map_err(|_| invalid(format!("invalid number `{right}`")))?;
        if !threshold.is_finite() {
            return Err(invalid(format!("invalid number `{right}`")));
        }

        Ok(Self {
            scope,
            metric,
            op,
            threshold,
            expression: Arc::from(raw.trim()),
        })
    }

    pub fn global(raw: &str) -> Result<Self> {
        Self::parse(AssertionScope::Global, raw)
    }

    pub fn request(name: impl Into<Arc<str>>, raw: &str) -> Result<Self> {
        Self::parse(AssertionScope::Request(name.into()), raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssertionViolation {
    pub scope: AssertionScope,
    pub expression: Arc<str>,
    /// `None` when the scope has no data.
    pub observed: Option<f64>,
    pub threshold: f64,
}

impl fmt::Display for AssertionViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.observed {
            Some(v) => write!(
                f,
                "{}: `{}` failed (observed {v:.2}, threshold {})",
                self.scope, self.expression, self.threshold
            ),
            None => write!(
                f,
                "{}: `{}` failed (no data, threshold {})",
                self.scope, self.expression, self.threshold
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Fail(Vec<AssertionViolation>),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn violations(&self) -> &[AssertionViolation] {
        match self {
            Self::Pass => &[],
            Self::Fail(v) => v,
        }
    }
}

/// Checks every assertion against final statistics. Pure: same input, same verdict.
pub fn evaluate(assertions: &[Assertion], stats: &AggregatedStats) -> Verdict {
    let mut violations = Vec::new();

    for assertion in assertions {
        let series = match &assertion.scope {
            AssertionScope::Global => Some(&stats.global),
            AssertionScope::Request(name) => stats.request(name),
        };
        let observed = series.and_then(|s| assertion.metric.observe(s));
        let passed = observed
            .map(|v| assertion.op.apply(v, assertion.threshold))
            .unwrap_or(false);

        if !passed {
            violations.push(AssertionViolation {
                scope: assertion.scope.clone(),
                expression: Arc::clone(&assertion.expression),
                observed,
                threshold: assertion.threshold,
            });
        }
    }

    if violations.is_empty() {
        Verdict::Pass
    } else {
        Verdict::Fail(violations)
    }
}
