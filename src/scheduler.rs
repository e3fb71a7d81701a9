//! Cycle scheduling.

use std::time::{Duration, Instant};

/// Decides whether a tick should trigger a new cycle.
///
/// The cursor holds the earliest instant at which the next cycle may
/// trigger. It only moves when a cycle is triggered, so tick cadence has
/// no influence on when cycles happen.
#[derive(Clone, Debug)]
pub(crate) struct Scheduler {
    interval: Duration,
    cursor: Instant,
}

impl Scheduler {
    /// Create a scheduler whose first cycle is due at `now`.
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            cursor: now,
        }
    }

    /// Evaluate a tick observed at `now`.
    ///
    /// Returns `true` when a cycle must be triggered; the cursor is then
    /// moved to `now + interval`, before the cycle outcome is known.
    pub(crate) fn on_tick(&mut self, now: Instant) -> bool {
        if now < self.cursor {
            return false;
        }

        self.cursor = now + self.interval;
        true
    }

    /// Next instant at which a cycle may trigger.
    pub(crate) fn cursor(&self) -> Instant {
        self.cursor
    }
}
