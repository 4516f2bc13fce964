//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mocks;

use chrono::{DateTime, Duration, Utc};
use monitor_core::{ManualClock, SharedClock};
use std::sync::Arc;

/// Fixed start time shared by the fixtures
pub fn epoch() -> DateTime<Utc> {
    "2024-05-01T12:00:00Z".parse().unwrap()
}

/// A clock that advances one millisecond per read
pub fn ticking_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::ticking(epoch(), Duration::milliseconds(1)))
}

pub fn shared(clock: &Arc<ManualClock>) -> SharedClock {
    clock.clone()
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
