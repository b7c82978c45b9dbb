use std::sync::Arc;
use std::time::Duration;

use surge_metrics::{AggregatedStats, UserCounts};

use super::signal::StopReason;
use crate::assertions::Verdict;

#[derive(Debug, Clone)]
pub struct RunReport {
    pub simulation: Arc<str>,
    pub stats: AggregatedStats,
    pub users: UserCounts,
    pub verdict: Verdict,
    pub elapsed: Duration,
    pub stop_reason: StopReason,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }
}
