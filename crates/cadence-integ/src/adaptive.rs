//! Error control and the bounded retry state machine for adaptive steps.

use crate::error::IntegError;

/// Error tolerances and step-size control for adaptive strategies.
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptiveConfig {
    /// Absolute tolerance. Default: 1e-9.
    pub atol: f64,
    /// Relative tolerance. Default: 1e-9.
    pub rtol: f64,
    /// Safety factor on proposed step sizes. Default: 0.9.
    pub safety: f64,
    /// Smallest step-size scale per attempt. Default: 0.2.
    pub min_factor: f64,
    /// Largest step-size scale per attempt. Default: 5.0.
    pub max_factor: f64,
    /// Consecutive rejections allowed before giving up. Default: 20.
    pub max_reductions: u32,
    /// Smallest step size (seconds) ever attempted. Default: 1e-12.
    pub min_step: f64,
    /// First substep size; `None` tries the whole step. Default: `None`.
    pub initial_step: Option<f64>,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            atol: 1e-9,
            rtol: 1e-9,
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 5.0,
            max_reductions: 20,
            min_step: 1e-12,
            initial_step: None,
        }
    }
}

impl AdaptiveConfig {
    /// Check invariants.
    pub fn validate(&self) -> Result<(), IntegError> {
        let bad = |reason: &str| {
            Err(IntegError::InvalidConfig {
                reason: reason.to_string(),
            })
        };
        if !(self.atol.is_finite() && self.atol >= 0.0)
            || !(self.rtol.is_finite() && self.rtol >= 0.0)
        {
            return bad("tolerances must be finite and non-negative");
        }
        if self.atol == 0.0 && self.rtol == 0.0 {
            return bad("atol and rtol cannot both be zero");
        }
        if !(self.safety > 0.0 && self.safety <= 1.0) {
            return bad("safety must be in (0, 1]");
        }
        if !(self.min_factor > 0.0 && self.min_factor < 1.0) {
            return bad("min_factor must be in (0, 1)");
        }
        if !(self.max_factor.is_finite() && self.max_factor > 1.0) {
            return bad("max_factor must be finite and greater than 1");
        }
        if !(self.min_step.is_finite() && self.min_step > 0.0) {
            return bad("min_step must be finite and positive");
        }
        if let Some(h) = self.initial_step {
            if !(h.is_finite() && h > 0.0) {
                return bad("initial_step must be finite and positive");
            }
        }
        Ok(())
    }

    /// Weighted RMS norm of a local error estimate. A value at or below
    /// 1 meets the tolerance.
    pub fn error_norm(&self, y0: &[f64], y1: &[f64], err: &[f64]) -> f64 {
        if err.is_empty() {
            return 0.0;
        }
        let sum: f64 = y0
            .iter()
            .zip(y1)
            .zip(err)
            .map(|((a, b), e)| {
                let scale = self.atol + self.rtol * a.abs().max(b.abs());
                (e / scale).powi(2)
            })
            .sum();
        (sum / err.len() as f64).sqrt()
    }

    /// Classify an attempt of size `h` with error norm `norm` for a pair
    /// whose lower order is `error_order`.
    pub fn judge(&self, h: f64, norm: f64, error_order: u32) -> StepOutcome {
        if !norm.is_finite() {
            return StepOutcome::Retry {
                h: h * self.min_factor,
                error_norm: norm,
            };
        }
        let factor = if norm == 0.0 {
            self.max_factor
        } else {
            let exponent = -1.0 / f64::from(error_order + 1);
            (self.safety * norm.powf(exponent)).clamp(self.min_factor, self.max_factor)
        };
        if norm <= 1.0 {
            StepOutcome::Accepted {
                error_norm: norm,
                h_next: h * factor,
            }
        } else {
            StepOutcome::Retry {
                h: h * factor.min(self.safety),
                error_norm: norm,
            }
        }
    }
}

/// Result of one adaptive attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepOutcome {
    /// The attempt met the tolerance.
    Accepted {
        /// Weighted error norm.
        error_norm: f64,
        /// Proposed size of the next substep.
        h_next: f64,
    },
    /// The attempt missed the tolerance; retry with `h`.
    Retry {
        /// Smaller step size to try.
        h: f64,
        /// Weighted error norm of the rejected attempt.
        error_norm: f64,
    },
}

/// Bounded retry state machine.
///
/// Counts consecutive rejections. Exceeding `max_reductions`, or a retry
/// size under `min_step`, ends the step with
/// [`IntegError::RetryExhausted`].
#[derive(Clone, Debug)]
pub struct RetryState {
    reductions: u32,
    max_reductions: u32,
    min_step: f64,
}

impl RetryState {
    /// Fresh machine for one step.
    pub fn new(config: &AdaptiveConfig) -> Self {
        Self {
            reductions: 0,
            max_reductions: config.max_reductions,
            min_step: config.min_step,
        }
    }

    /// Feed an outcome for an attempt at time `t`.
    ///
    /// Returns `Ok(None)` when accepted, `Ok(Some(h))` to retry at `h`.
    pub fn observe(&mut self, t: f64, outcome: StepOutcome) -> Result<Option<f64>, IntegError> {
        match outcome {
            StepOutcome::Accepted { .. } => {
                self.reductions = 0;
                Ok(None)
            }
            StepOutcome::Retry { h, error_norm } => {
                self.reductions += 1;
                if self.reductions > self.max_reductions || h < self.min_step {
                    return Err(IntegError::RetryExhausted {
                        time: t,
                        step: h,
                        error_norm,
                    });
                }
                Ok(Some(h))
            }
        }
    }

    /// Rejections since the last acceptance.
    pub fn reductions(&self) -> u32 {
        self.reductions
    }
}
