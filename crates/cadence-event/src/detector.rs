//! Sign-change detection and Illinois regula falsi refinement.

use std::fmt;

/// Which sign changes of a condition count as a firing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Negative to zero or positive.
    Rising,
    /// Positive to zero or negative.
    Falling,
    /// Either transition.
    #[default]
    Either,
}

impl Direction {
    /// Whether the pair `previous -> current` is a crossing in this
    /// direction.
    ///
    /// Starting exactly at zero is never a crossing, so an event whose
    /// handler leaves the condition at zero does not immediately refire.
    pub fn crossed(self, previous: f64, current: f64) -> bool {
        let falling = previous > 0.0 && current <= 0.0;
        let rising = previous < 0.0 && current >= 0.0;
        match self {
            Self::Rising => rising,
            Self::Falling => falling,
            Self::Either => rising || falling,
        }
    }

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Either => "either",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Refinement stopped at the iteration limit with the bracket still wider
/// than the tolerance. The crossing is still reported, at the upper end of
/// the remaining bracket.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvergenceWarning {
    /// Iterations performed.
    pub iterations: u32,
    /// Bracket width when refinement stopped.
    pub bracket_width: f64,
    /// Requested tolerance.
    pub tolerance: f64,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "root search stopped after {} iterations with bracket {:e} > tolerance {:e}",
            self.iterations, self.bracket_width, self.tolerance
        )
    }
}

/// A located crossing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Crossing {
    /// Crossing time: the end of the final bracket on the crossed side.
    pub time: f64,
    /// Condition value at [`time`](Self::time).
    pub value: f64,
    /// Condition evaluations spent refining.
    pub iterations: u32,
    /// Set when the iteration limit was hit before convergence.
    pub warning: Option<ConvergenceWarning>,
}

/// Brackets and refines zero crossings of a scalar condition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EventDetector {
    /// Largest acceptable bracket width, in seconds. Default: 1e-9.
    pub tolerance: f64,
    /// Refinement iteration limit. Default: 100.
    pub max_iterations: u32,
}

impl Default for EventDetector {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            max_iterations: 100,
        }
    }
}

impl EventDetector {
    /// Detector with the given tolerance and iteration limit.
    pub fn new(tolerance: f64, max_iterations: u32) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }

    /// Whether the settings are usable.
    pub fn is_valid(&self) -> bool {
        self.tolerance.is_finite() && self.tolerance > 0.0 && self.max_iterations > 0
    }

    /// Check for a crossing across `window = (t0, t1)`.
    ///
    /// `previous` and `current` are the condition values at `t0` and `t1`.
    /// When they bracket a crossing in `direction`, `condition` is probed
    /// at interior times until the bracket is no wider than the tolerance.
    /// The returned time always lies on the crossed side, so state
    /// advanced to it observes the crossing.
    ///
    /// ```
    /// use cadence_event::{Direction, EventDetector};
    ///
    /// let det = EventDetector::default();
    /// let hit = det
    ///     .check(Direction::Falling, |t| Ok::<_, ()>(0.25 - t), 0.25, -0.75, (0.0, 1.0))
    ///     .unwrap()
    ///     .unwrap();
    /// assert!(hit.time >= 0.25 && hit.time - 0.25 <= 1e-9);
    /// ```
    pub fn check<E, F>(
        &self,
        direction: Direction,
        mut condition: F,
        previous: f64,
        current: f64,
        window: (f64, f64),
    ) -> Result<Option<Crossing>, E>
    where
        F: FnMut(f64) -> Result<f64, E>,
    {
        if !direction.crossed(previous, current) {
            return Ok(None);
        }
        let (mut lo, mut hi) = window;
        let (mut g_lo, mut f_hi) = (previous, current);
        let mut g_hi = current;
        let start_sign = previous.signum();
        // -1: lo kept on the last iteration, +1: hi kept.
        let mut kept = 0i8;
        let mut iterations = 0u32;
        let nudge = 0.5 * self.tolerance;

        while f_hi != 0.0 && hi - lo > self.tolerance {
            if iterations >= self.max_iterations {
                let warning = ConvergenceWarning {
                    iterations,
                    bracket_width: hi - lo,
                    tolerance: self.tolerance,
                };
                tracing::debug!(%warning, "event refinement did not converge");
                return Ok(Some(Crossing {
                    time: hi,
                    value: f_hi,
                    iterations,
                    warning: Some(warning),
                }));
            }
            iterations += 1;

            let mut x = hi - g_hi * (hi - lo) / (g_hi - g_lo);
            if !x.is_finite() {
                x = 0.5 * (lo + hi);
            }
            x = x.clamp(lo + nudge, hi - nudge);
            let fx = condition(x)?;

            if fx == 0.0 || fx.signum() != start_sign {
                hi = x;
                f_hi = fx;
                g_hi = fx;
                if kept == -1 {
                    g_lo *= 0.5;
                }
                kept = -1;
            } else {
                lo = x;
                g_lo = fx;
                if kept == 1 {
                    g_hi *= 0.5;
                }
                kept = 1;
            }
        }

        Ok(Some(Crossing {
            time: hi,
            value: f_hi,
            iterations,
            warning: None,
        }))
    }
}
