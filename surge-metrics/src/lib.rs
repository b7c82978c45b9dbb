pub mod aggregator;
pub mod latency;
pub mod record;
pub mod running;
pub mod stats;
pub mod users;

pub use aggregator::Aggregator;
pub use latency::PercentileMode;
pub use record::{MetricRecord, Outcome};
pub use running::RunningStats;
pub use stats::{AggregatedStats, LiveStats, RequestStats};
pub use users::{UserCounters, UserCounts};
