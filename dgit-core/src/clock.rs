//! Time source for commit timestamps.
//!
//! The timestamp is part of the commit digest, so tests swap the wall clock
//! for a [`ManualClock`] to get reproducible ids.

use std::cell::Cell;

/// Source of commit timestamps in Unix seconds.
pub trait Clock {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Deterministic clock: returns `start`, then advances by `step` on every read.
#[derive(Debug)]
pub struct ManualClock {
    next: Cell<i64>,
    step: i64,
}

impl ManualClock {
    pub fn new(start: i64, step: i64) -> Self {
        Self {
            next: Cell::new(start),
            step,
        }
    }

    /// A clock frozen at `at`.
    pub fn fixed(at: i64) -> Self {
        Self::new(at, 0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        let now = self.next.get();
        self.next.set(now + self.step);
        now
    }
}
