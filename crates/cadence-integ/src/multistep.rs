//! Derivative history for the Adams-Bashforth-Moulton strategy.

use smallvec::SmallVec;

/// Past derivatives needed beyond the current one.
const DEPTH: usize = 3;

/// Derivative history of a fourth-order Adams-Bashforth-Moulton method.
///
/// Holds `f(n-1)`, `f(n-2)`, `f(n-3)`, newest first, all taken at the
/// same step size. A change of step size, or any external change to the
/// state, invalidates the history and the method restarts with RK4.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AbmHistory {
    h: f64,
    past: SmallVec<[Vec<f64>; DEPTH]>,
}

impl AbmHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from exported parts.
    pub fn from_parts(h: f64, past: Vec<Vec<f64>>) -> Self {
        Self {
            h,
            past: past.into_iter().take(DEPTH).collect(),
        }
    }

    /// Step size the history was built with.
    pub fn step_size(&self) -> f64 {
        self.h
    }

    /// Stored derivatives, newest first.
    pub fn past(&self) -> &[Vec<f64>] {
        &self.past
    }

    /// Whether enough history exists for a multistep step.
    pub fn is_ready(&self) -> bool {
        self.past.len() == DEPTH
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.past.clear();
    }

    /// Clear the history if it was built with a different step size.
    pub fn align(&mut self, h: f64) {
        let scale = h.abs().max(self.h.abs()).max(f64::MIN_POSITIVE);
        if (h - self.h).abs() > 1e-12 * scale {
            self.past.clear();
            self.h = h;
        }
    }

    /// Record the derivative of the step just taken.
    pub fn push(&mut self, f: &[f64]) {
        let buf = if self.past.len() == DEPTH {
            let mut old = self.past.pop().unwrap_or_default();
            old.clear();
            old.extend_from_slice(f);
            old
        } else {
            f.to_vec()
        };
        self.past.insert(0, buf);
    }

    /// Adams-Bashforth predictor into `out`. Requires [`is_ready`](Self::is_ready).
    pub fn predict(&self, y: &[f64], f_n: &[f64], h: f64, out: &mut [f64]) {
        let (f1, f2, f3) = (&self.past[0], &self.past[1], &self.past[2]);
        for i in 0..y.len() {
            out[i] = y[i] + h / 24.0 * (55.0 * f_n[i] - 59.0 * f1[i] + 37.0 * f2[i] - 9.0 * f3[i]);
        }
    }

    /// Adams-Moulton corrector into `out`, given the derivative `f_p` at
    /// the predicted point.
    pub fn correct(&self, y: &[f64], f_n: &[f64], f_p: &[f64], h: f64, out: &mut [f64]) {
        let (f1, f2) = (&self.past[0], &self.past[1]);
        for i in 0..y.len() {
            out[i] = y[i] + h / 24.0 * (9.0 * f_p[i] + 19.0 * f_n[i] - 5.0 * f1[i] + f2[i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_newest_first_and_bounded() {
        let mut h = AbmHistory::new();
        h.align(0.1);
        for v in 0..5 {
            h.push(&[v as f64]);
        }
        assert!(h.is_ready());
        let past: Vec<f64> = h.past().iter().map(|p| p[0]).collect();
        assert_eq!(past, vec![4.0, 3.0, 2.0]);
    }

    #[test]
    fn align_clears_on_step_change() {
        let mut h = AbmHistory::new();
        h.align(0.1);
        h.push(&[1.0]);
        h.align(0.1);
        assert_eq!(h.past().len(), 1);
        h.align(0.05);
        assert!(h.past().is_empty());
        assert_eq!(h.step_size(), 0.05);
    }

    #[test]
    fn predictor_is_exact_for_constant_derivative() {
        let h = AbmHistory::from_parts(0.5, vec![vec![2.0], vec![2.0], vec![2.0]]);
        let mut out = [0.0];
        h.predict(&[1.0], &[2.0], 0.5, &mut out);
        assert!((out[0] - 2.0).abs() < 1e-12);
        h.correct(&[1.0], &[2.0], &[2.0], 0.5, &mut out);
        assert!((out[0] - 2.0).abs() < 1e-12);
    }
}
