use std::fmt;
use std::time::Duration;

use surge_metrics::PercentileMode;

use super::progress::ProgressFn;
use super::signal::StopHandle;
use crate::error::{Error, Result};

/// What to do with a user due to start while `max_concurrent_users` are running.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum SaturationPolicy {
    /// Delay the start until a slot frees up.
    #[default]
    Wait,
    /// Skip the user and count it as dropped.
    Drop,
}

#[derive(Clone)]
pub struct RunOptions {
    pub max_concurrent_users: Option<u64>,
    pub saturation: SaturationPolicy,
    /// Stops the run and cancels in-flight users once elapsed.
    pub max_duration: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub percentiles: PercentileMode,
    pub progress_interval: Duration,
    pub progress: Option<ProgressFn>,
    pub stop: StopHandle,
    /// How long cancelled users get to flush their records before being aborted.
    pub shutdown_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_concurrent_users: None,
            saturation: SaturationPolicy::default(),
            max_duration: None,
            request_timeout: None,
            percentiles: PercentileMode::default(),
            progress_interval: Duration::from_secs(5),
            progress: None,
            stop: StopHandle::new(),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_users == Some(0) {
            return Err(Error::InvalidMaxConcurrentUsers);
        }
        if self.progress_interval.is_zero() {
            return Err(Error::InvalidProgressInterval);
        }
        Ok(())
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("max_concurrent_users", &self.max_concurrent_users)
            .field("saturation", &self.saturation)
            .field("max_duration", &self.max_duration)
            .field("request_timeout", &self.request_timeout)
            .field("percentiles", &self.percentiles)
            .field("progress_interval", &self.progress_interval)
            .field("progress", &self.progress.is_some())
            .field("shutdown_grace", &self.shutdown_grace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_concurrency_is_rejected() {
        let opts = RunOptions {
            max_concurrent_users: Some(0),
            ..RunOptions::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(Error::InvalidMaxConcurrentUsers)
        ));
        assert!(RunOptions::default().validate().is_ok());
    }

    #[test]
    fn saturation_policy_parses_snake_case() {
        assert_eq!("drop".parse::<SaturationPolicy>().ok(), Some(SaturationPolicy::Drop));
        assert_eq!(SaturationPolicy::Wait.to_string(), "wait");
    }
}
