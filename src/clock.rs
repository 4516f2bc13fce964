//! Time sources for sample timestamps.
//!
//! Sample updates never read the wall clock directly; they ask a [`Clock`].
//! Production code uses [`SystemClock`], tests and replays use
//! [`ManualClock`] to get reproducible timestamps.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A source of UTC timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Each call to [`Clock::now`] returns the current time and then advances it
/// by `step`, so a non-zero step yields strictly increasing timestamps.
#[derive(Debug)]
pub struct ManualClock {
    /// Microseconds since the Unix epoch
    micros: AtomicI64,
    step_micros: i64,
}

impl ManualClock {
    /// A frozen clock at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::ticking(start, Duration::zero())
    }

    /// A clock at `start` that advances by `step` on every read
    pub fn ticking(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            micros: AtomicI64::new(start.timestamp_micros()),
            step_micros: step.num_microseconds().unwrap_or(i64::MAX),
        }
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        let delta = by.num_microseconds().unwrap_or(i64::MAX);
        self.micros.fetch_add(delta, Ordering::SeqCst);
    }

    /// Jump to `at`
    pub fn set(&self, at: DateTime<Utc>) {
        self.micros.store(at.timestamp_micros(), Ordering::SeqCst);
    }

    /// Current time without advancing
    pub fn peek(&self) -> DateTime<Utc> {
        from_micros(self.micros.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        from_micros(self.micros.fetch_add(self.step_micros, Ordering::SeqCst))
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Shared clock handle as held by stages and elements
pub type SharedClock = Arc<dyn Clock>;

fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::<Utc>::default() + Duration::microseconds(micros)
}
