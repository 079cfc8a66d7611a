//! Test fixtures and a synthetic wall clock for Cadence development.
//!
//! Provides ready-made derivative, condition and task jobs for the
//! standard scenarios (exponential decay, free fall with bounces), jobs
//! that count, record or fail on demand, and a [`ManualClock`] whose
//! time only moves when a test or a sleep moves it.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cadence_core::WallClock;

pub use fixtures::{
    Altitude, BounceJob, CountingJob, DecayDerivative, FailingJob, FreeFall, RecordingJob,
    SharedLog,
};

/// Synthetic wall clock.
///
/// `sleep` advances the clock by the requested amount and records it.
/// Clones share the same time, so a test can hold one clone while the
/// executive owns another.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<ClockState>>,
}

#[derive(Debug, Default)]
struct ClockState {
    now: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        // A panicking test thread must not hide the clock from the others.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move time forward, as if work took `d`.
    pub fn advance(&self, d: Duration) {
        self.lock().now += d;
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Total time spent sleeping.
    pub fn slept(&self) -> Duration {
        self.lock().sleeps.iter().sum()
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> Duration {
        self.lock().now
    }

    fn sleep(&mut self, d: Duration) {
        let mut state = self.lock();
        state.now += d;
        state.sleeps.push(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new();
        let mut owned = clock.clone();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance(Duration::from_millis(30));
        owned.sleep(Duration::from_millis(70));
        assert_eq!(clock.now(), Duration::from_millis(100));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(70)]);
        assert_eq!(clock.slept(), Duration::from_millis(70));
    }
}
