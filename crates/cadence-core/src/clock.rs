//! Wall-clock abstraction used for real-time pacing.

use std::time::{Duration, Instant};

/// A monotonic wall clock that can block.
///
/// Time is measured from an arbitrary fixed origin. Tests substitute a
/// synthetic clock so pacing decisions can be checked exactly.
pub trait WallClock: Send {
    /// Elapsed wall time since the clock's origin.
    fn now(&self) -> Duration;

    /// Block for `duration`.
    fn sleep(&mut self, duration: Duration);
}

impl<W: WallClock + ?Sized> WallClock for Box<W> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// The operating system's monotonic clock.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// A clock whose origin is the moment of construction.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let mut clock = SystemClock::new();
        let a = clock.now();
        clock.sleep(Duration::from_millis(1));
        assert!(clock.now() >= a + Duration::from_millis(1));
    }
}
