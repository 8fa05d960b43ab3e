//! Clock abstraction for testable time handling.
//!
//! Schedules, segment names and retention thresholds are all expressed in
//! local wall-clock time, so the clock hands out naive local timestamps.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime, TimeDelta};
use parking_lot::Mutex;

/// A clock that provides the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Fake clock for testing with controllable time.
#[derive(Debug, Clone)]
pub struct FakeClock {
    current: Arc<Mutex<NaiveDateTime>>,
}

impl FakeClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, delta: TimeDelta) {
        let mut current = self.current.lock();
        *current += delta;
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, now: NaiveDateTime) {
        *self.current.lock() = now;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> NaiveDateTime {
        *self.current.lock()
    }
}
