//! Integer simulation time, frame cycles, and the frame clock.
//!
//! Simulation time is counted in *tics*, a fixed fraction of a second
//! chosen by the [`TimeBase`]. Frame boundaries, job call times and
//! loop step boundaries are all whole tics, so the timeline never
//! accumulates floating-point drift. Only event crossing times, which
//! fall between step boundaries, are carried as `f64` seconds.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

use crate::id::FrameId;

// ── SimTime ────────────────────────────────────────────────────────

/// A point on the simulation timeline, in tics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimTime(pub i64);

impl SimTime {
    /// Time zero.
    pub const ZERO: SimTime = SimTime(0);

    /// Raw tic count.
    pub fn tics(self) -> i64 {
        self.0
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        self.0 += rhs.0;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t", self.0)
    }
}

// ── TimeBase ───────────────────────────────────────────────────────

/// Conversion between seconds and tics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeBase {
    tics_per_second: i64,
}

impl TimeBase {
    /// Default resolution: one tic per microsecond.
    pub const DEFAULT_TICS_PER_SECOND: i64 = 1_000_000;

    /// Create a time base. Returns `None` unless `tics_per_second > 0`.
    pub fn new(tics_per_second: i64) -> Option<Self> {
        (tics_per_second > 0).then_some(Self { tics_per_second })
    }

    /// Tics in one second.
    pub fn tics_per_second(&self) -> i64 {
        self.tics_per_second
    }

    /// Convert seconds to a whole number of tics.
    ///
    /// Returns `None` if `seconds` is not finite, overflows, or does not
    /// land on a tic boundary (within 1e-6 of a tic).
    pub fn to_tics(&self, seconds: f64) -> Option<SimTime> {
        if !seconds.is_finite() {
            return None;
        }
        let raw = seconds * self.tics_per_second as f64;
        let rounded = raw.round();
        if (raw - rounded).abs() > 1e-6 || rounded.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(SimTime(rounded as i64))
    }

    /// Convert a tic count to seconds.
    pub fn seconds(&self, t: SimTime) -> f64 {
        t.0 as f64 / self.tics_per_second as f64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self {
            tics_per_second: Self::DEFAULT_TICS_PER_SECOND,
        }
    }
}

// ── Cycle ──────────────────────────────────────────────────────────

/// A job's call period as a rational multiple `num/den` of the frame.
///
/// Always stored in lowest terms with a non-zero numerator and
/// denominator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cycle {
    num: u32,
    den: u32,
}

impl Cycle {
    /// Once per frame.
    pub const ONE_FRAME: Cycle = Cycle { num: 1, den: 1 };

    /// A cycle of `num/den` frames. Returns `None` if either part is zero.
    pub fn new(num: u32, den: u32) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        let g = gcd(num, den);
        Some(Self {
            num: num / g,
            den: den / g,
        })
    }

    /// A cycle of a whole number of frames (at least one).
    pub fn frames(n: u32) -> Self {
        Self { num: n.max(1), den: 1 }
    }

    /// Numerator.
    pub fn num(&self) -> u32 {
        self.num
    }

    /// Denominator.
    pub fn den(&self) -> u32 {
        self.den
    }

    /// Whether the cycle spans at least one whole frame.
    pub fn covers_frame(&self) -> bool {
        self.num >= self.den
    }

    /// Resolve the cycle against a frame duration.
    ///
    /// Returns `None` if the result is not a whole number of tics.
    pub fn to_tics(&self, frame: SimTime) -> Option<SimTime> {
        let scaled = frame.0.checked_mul(i64::from(self.num))?;
        let den = i64::from(self.den);
        (scaled % den == 0).then(|| SimTime(scaled / den))
    }

    /// The cycle as a fraction of a frame.
    pub fn as_f64(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

// ── Frame ──────────────────────────────────────────────────────────

/// The base real-time quantum and the current position on the timeline.
///
/// `start` is always exactly `counter * duration`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    duration: SimTime,
    counter: FrameId,
    start: SimTime,
}

impl Frame {
    /// A frame clock at frame zero.
    pub fn new(duration: SimTime) -> Self {
        Self {
            duration,
            counter: FrameId(0),
            start: SimTime::ZERO,
        }
    }

    /// Frame duration.
    pub fn duration(&self) -> SimTime {
        self.duration
    }

    /// Number of completed frames.
    pub fn counter(&self) -> FrameId {
        self.counter
    }

    /// Simulation time at the start of the current frame.
    pub fn start(&self) -> SimTime {
        self.start
    }

    /// Simulation time at the end of the current frame.
    pub fn end(&self) -> SimTime {
        self.start + self.duration
    }

    /// Move to the next frame.
    pub fn advance(&mut self) {
        self.set_counter(self.counter.next());
    }

    /// Jump to a given frame, as when restoring a snapshot.
    pub fn set_counter(&mut self, counter: FrameId) {
        self.counter = counter;
        self.start = SimTime(self.duration.0 * counter.0 as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn to_tics_accepts_decimal_seconds() {
        let base = TimeBase::default();
        assert_eq!(base.to_tics(0.01), Some(SimTime(10_000)));
        assert_eq!(base.to_tics(1.0), Some(SimTime(1_000_000)));
        assert_eq!(base.to_tics(0.1), Some(SimTime(100_000)));
    }

    #[test]
    fn to_tics_rejects_sub_tic_and_non_finite() {
        let base = TimeBase::new(1000).unwrap();
        assert_eq!(base.to_tics(0.0005), None);
        assert_eq!(base.to_tics(f64::NAN), None);
        assert_eq!(base.to_tics(f64::INFINITY), None);
    }

    #[test]
    fn time_base_rejects_non_positive() {
        assert!(TimeBase::new(0).is_none());
        assert!(TimeBase::new(-5).is_none());
    }

    #[test]
    fn cycle_normalizes() {
        let c = Cycle::new(6, 4).unwrap();
        assert_eq!((c.num(), c.den()), (3, 2));
        assert_eq!(c.to_string(), "3/2");
        assert!(Cycle::new(0, 1).is_none());
        assert!(Cycle::new(1, 0).is_none());
    }

    #[test]
    fn cycle_to_tics_requires_whole_tics() {
        let frame = SimTime(100);
        assert_eq!(Cycle::new(3, 2).unwrap().to_tics(frame), Some(SimTime(150)));
        assert_eq!(Cycle::new(1, 3).unwrap().to_tics(frame), None);
        assert!(!Cycle::new(1, 2).unwrap().covers_frame());
        assert!(Cycle::frames(2).covers_frame());
    }

    #[test]
    fn frame_start_is_exact_multiple() {
        let mut frame = Frame::new(SimTime(10_000));
        for _ in 0..1000 {
            frame.advance();
        }
        assert_eq!(frame.counter(), FrameId(1000));
        assert_eq!(frame.start(), SimTime(10_000_000));
        assert_eq!(frame.end(), SimTime(10_010_000));
        frame.set_counter(FrameId(3));
        assert_eq!(frame.start(), SimTime(30_000));
    }

    proptest! {
        #[test]
        fn whole_tic_round_trip(tics in 0i64..1_000_000_000) {
            let base = TimeBase::default();
            let secs = base.seconds(SimTime(tics));
            prop_assert_eq!(base.to_tics(secs), Some(SimTime(tics)));
        }

        #[test]
        fn cycle_is_lowest_terms(num in 1u32..500, den in 1u32..500) {
            let c = Cycle::new(num, den).unwrap();
            prop_assert_eq!(gcd(c.num(), c.den()), 1);
            prop_assert!((c.as_f64() - num as f64 / den as f64).abs() < 1e-12);
        }
    }
}
