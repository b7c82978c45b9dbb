use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// Every virtual user finished on its own.
    Completed,
    /// `max_duration` elapsed.
    Deadline,
    /// [`StopHandle::stop`] was called.
    Interrupted,
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: AtomicBool,
    reason: OnceLock<StopReason>,
    notify: Notify,
}

/// Cancels a run from the outside. Cloning shares the same signal; a handle stays stopped
/// once triggered, so use a fresh one per run.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    signal: Arc<StopSignal>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.trigger(StopReason::Interrupted);
    }

    pub fn is_stopped(&self) -> bool {
        self.signal.stopped.load(Ordering::Acquire)
    }

    /// The first trigger wins.
    pub(crate) fn trigger(&self, reason: StopReason) {
        let _ = self.signal.reason.set(reason);
        self.signal.stopped.store(true, Ordering::Release);
        self.signal.notify.notify_waiters();
    }

    pub(crate) fn reason(&self) -> Option<StopReason> {
        self.signal.reason.get().copied()
    }

    pub(crate) async fn wait(&self) {
        loop {
            let notified = self.signal.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent trigger is not missed.
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}
