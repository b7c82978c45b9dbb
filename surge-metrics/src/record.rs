use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// One executed HTTP action.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub name: Arc<str>,
    pub started_at: SystemTime,
    pub latency: Duration,
    pub outcome: Outcome,
    /// Failure reason; always `None` for successful records.
    pub error: Option<Arc<str>>,
}

impl MetricRecord {
    pub fn success(name: impl Into<Arc<str>>, started_at: SystemTime, latency: Duration) -> Self {
        Self {
            name: name.into(),
            started_at,
            latency,
            outcome: Outcome::Success,
            error: None,
        }
    }

    pub fn failure(
        name: impl Into<Arc<str>>,
        started_at: SystemTime,
        latency: Duration,
        error: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            name: name.into(),
            started_at,
            latency,
            outcome: Outcome::Failure,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}
