//! Reconnection timer for the exponential backoff path.
//!
//! The manager owns one [`RetryTimer`]. Scheduling a retry arms it;
//! `connect`, `disconnect` and `reconnect` disarm it. A disarmed timer never
//! fires, so a cancelled retry cannot open a connection later.

use std::time::Duration;

use tokio::time::Instant;

/// A single-slot, cancellable deadline.
#[derive(Debug, Default)]
pub(crate) struct RetryTimer {
    deadline: Option<Instant>,
}

impl RetryTimer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arms the timer `delay` from now, replacing any pending deadline.
    pub(crate) fn arm(&mut self, delay: Duration) -> Instant {
        let deadline = Instant::now() + delay;
        self.deadline = Some(deadline);
        deadline
    }

    /// Disarms the timer. Returns whether a retry was pending.
    pub(crate) fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves at `deadline`, or never when there is none.
    pub(crate) async fn fired(deadline: Option<Instant>) {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}
