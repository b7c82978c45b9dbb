use std::sync::atomic::{AtomicU64, Ordering};

/// Virtual-user lifecycle counters, updated by the scheduler and user tasks.
#[derive(Debug, Default)]
pub struct UserCounters {
    scheduled: AtomicU64,
    started: AtomicU64,
    active: AtomicU64,
    peak_active: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    dropped: AtomicU64,
    feeder_exhausted: AtomicU64,
}

/// Point-in-time copy of [`UserCounters`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UserCounts {
    pub scheduled: u64,
    pub started: u64,
    pub active: u64,
    pub peak_active: u64,
    pub completed: u64,
    /// Users whose chain aborted on a failed step, a template error, or an empty feeder.
    pub failed: u64,
    pub cancelled: u64,
    pub dropped: u64,
    /// Subset of `failed`.
    pub feeder_exhausted: u64,
}

impl UserCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn on_scheduled(&self, n: u64) {
        self.scheduled.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn on_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        let now = self.active.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        self.peak_active.fetch_max(now, Ordering::AcqRel);
    }

    #[inline]
    pub fn on_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.leave();
    }

    #[inline]
    pub fn on_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.leave();
    }

    #[inline]
    pub fn on_feeder_exhausted(&self) {
        self.feeder_exhausted.fetch_add(1, Ordering::Relaxed);
        self.on_failed();
    }

    #[inline]
    pub fn on_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        self.leave();
    }

    /// A scheduled user that never started because the concurrency bound was saturated.
    #[inline]
    pub fn on_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn leave(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
    }

    pub fn snapshot(&self) -> UserCounts {
        UserCounts {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Acquire),
            peak_active: self.peak_active.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            feeder_exhausted: self.feeder_exhausted.load(Ordering::Relaxed),
        }
    }
}
