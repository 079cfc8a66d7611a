//! The [`Integrator`]: one state-advance contract over every strategy.

use cadence_core::JobError;

use crate::adaptive::{AdaptiveConfig, RetryState, StepOutcome};
use crate::error::IntegError;
use crate::kind::IntegratorKind;
use crate::multistep::AbmHistory;
use crate::tableau::{self, Tableau};

/// Supplies derivatives of the whole state buffer.
pub trait DerivativeSource {
    /// Write `dy/dt` at `(t, y)` into `dydt`.
    fn derivatives(&mut self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), JobError>;
}

impl<F> DerivativeSource for F
where
    F: FnMut(f64, &[f64], &mut [f64]) -> Result<(), JobError>,
{
    fn derivatives(&mut self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), JobError> {
        self(t, y, dydt)
    }
}

/// One state vector's slice of the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    /// First index.
    pub offset: usize,
    /// Number of values.
    pub len: usize,
    /// Positions followed by velocities.
    pub second_order: bool,
}

/// How a call to [`Integrator::advance`] treats error control and
/// integrator memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepMode {
    /// A real step: adaptive error control is enforced, the step-size
    /// proposal and multistep history are updated.
    Commit,
    /// A speculative step used while locating events: no error control,
    /// no change to integrator memory.
    Trial,
}

/// Work done by one [`Integrator::advance`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AdvanceReport {
    /// Accepted substeps.
    pub substeps: u32,
    /// Rejected attempts.
    pub rejections: u32,
    /// Derivative evaluations.
    pub evaluations: u32,
    /// Largest accepted error norm, for adaptive strategies.
    pub error_norm: Option<f64>,
}

/// State carried between steps; captured in snapshots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntegratorMemory {
    /// Next adaptive substep size.
    pub h_next: Option<f64>,
    /// Multistep derivative history.
    pub history: AbmHistory,
}

/// An integrator strategy bound to a state layout.
///
/// # Examples
///
/// ```
/// use cadence_core::JobError;
/// use cadence_integ::{AdaptiveConfig, Integrator, IntegratorKind, Segment, StepMode};
///
/// let seg = Segment { offset: 0, len: 1, second_order: false };
/// let mut rk4 = Integrator::new(IntegratorKind::Rk4, vec![seg], AdaptiveConfig::default()).unwrap();
/// let mut decay = |_t: f64, y: &[f64], out: &mut [f64]| -> Result<(), JobError> {
///     out[0] = -y[0];
///     Ok(())
/// };
/// let mut y = [1.0];
/// rk4.advance(&mut decay, 0.0, &mut y, 0.1, StepMode::Commit).unwrap();
/// assert!((y[0] - (-0.1f64).exp()).abs() < 1e-6);
/// ```
#[derive(Clone, Debug)]
pub struct Integrator {
    kind: IntegratorKind,
    segments: Vec<Segment>,
    dim: usize,
    adaptive: AdaptiveConfig,
    memory: IntegratorMemory,
    last_error: Option<f64>,
    k: Vec<Vec<f64>>,
    stage: Vec<f64>,
    out: Vec<f64>,
    err: Vec<f64>,
    f0: Vec<f64>,
    fp: Vec<f64>,
}

impl Integrator {
    /// Bind `kind` to a buffer laid out as `segments`.
    ///
    /// Segments must tile the buffer contiguously from index 0, and
    /// second-order segments must have even length.
    pub fn new(
        kind: IntegratorKind,
        segments: Vec<Segment>,
        adaptive: AdaptiveConfig,
    ) -> Result<Self, IntegError> {
        let mut expected = 0;
        for seg in &segments {
            if seg.offset != expected {
                return Err(IntegError::InvalidLayout {
                    reason: format!("segment at {} leaves a gap after {expected}", seg.offset),
                });
            }
            if seg.second_order && seg.len % 2 != 0 {
                return Err(IntegError::InvalidLayout {
                    reason: format!("second-order segment at {} has odd length", seg.offset),
                });
            }
            expected += seg.len;
        }
        if kind.is_adaptive() {
            adaptive.validate()?;
        }
        let dim = expected;
        Ok(Self {
            kind,
            segments,
            dim,
            adaptive,
            memory: IntegratorMemory::default(),
            last_error: None,
            k: vec![vec![0.0; dim]; kind.tableau().stages()],
            stage: vec![0.0; dim],
            out: vec![0.0; dim],
            err: vec![0.0; dim],
            f0: vec![0.0; dim],
            fp: vec![0.0; dim],
        })
    }

    /// Strategy tag.
    pub fn kind(&self) -> IntegratorKind {
        self.kind
    }

    /// Buffer length.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Derivative evaluations per step.
    pub fn evaluations_per_step(&self) -> usize {
        self.kind.evaluations_per_step()
    }

    /// Fractional stage times within a step.
    pub fn stage_offsets(&self) -> &'static [f64] {
        self.kind.stage_offsets()
    }

    /// Error norm of the last committed step, where the strategy
    /// estimates one: embedded pairs and the multistep corrector.
    pub fn estimate_error(&self) -> Option<f64> {
        self.last_error
    }

    /// Memory carried between steps.
    pub fn memory(&self) -> &IntegratorMemory {
        &self.memory
    }

    /// Replace the memory, as when restoring a snapshot.
    pub fn set_memory(&mut self, memory: IntegratorMemory) {
        self.memory = memory;
    }

    /// Forget multistep history after the state changed outside the
    /// integrator.
    pub fn reset_history(&mut self) {
        self.memory.history.clear();
    }

    /// Advance `y` from `t` over `h` seconds, in place.
    pub fn advance(
        &mut self,
        src: &mut dyn DerivativeSource,
        t: f64,
        y: &mut [f64],
        h: f64,
        mode: StepMode,
    ) -> Result<AdvanceReport, IntegError> {
        if y.len() != self.dim {
            return Err(IntegError::DimensionMismatch {
                expected: self.dim,
                found: y.len(),
            });
        }
        if h <= 0.0 {
            return Ok(AdvanceReport::default());
        }

        let report = match self.kind {
            IntegratorKind::Rkf45 | IntegratorKind::Rkf78 => {
                self.advance_adaptive(src, t, y, h, mode)?
            }
            IntegratorKind::Abm4 => self.advance_abm(src, t, y, h, mode)?,
            IntegratorKind::EulerCromer => self.advance_euler_cromer(src, t, y, h)?,
            kind => {
                let tab = kind.tableau();
                self.rk_step(tab, src, t, y, h)?;
                y.copy_from_slice(&self.out);
                AdvanceReport {
                    substeps: 1,
                    rejections: 0,
                    evaluations: tab.stages() as u32,
                    error_norm: None,
                }
            }
        };

        if y.iter().any(|v| !v.is_finite()) {
            return Err(IntegError::NonFinite { time: t + h });
        }
        Ok(report)
    }

    fn rk_step(
        &mut self,
        tab: &Tableau,
        src: &mut dyn DerivativeSource,
        t: f64,
        y: &[f64],
        h: f64,
    ) -> Result<(), IntegError> {
        let n = y.len();
        for i in 0..tab.stages() {
            self.stage.copy_from_slice(y);
            for (j, a) in tab.a[i].iter().enumerate() {
                if *a == 0.0 {
                    continue;
                }
                let kj = &self.k[j];
                for m in 0..n {
                    self.stage[m] += h * a * kj[m];
                }
            }
            src.derivatives(t + tab.c[i] * h, &self.stage, &mut self.k[i])?;
        }

        for m in 0..n {
            let mut acc = 0.0;
            for (i, b) in tab.b.iter().enumerate() {
                acc += b * self.k[i][m];
            }
            self.out[m] = y[m] + h * acc;
        }
        if let Some(e) = tab.e {
            for m in 0..n {
                let mut acc = 0.0;
                for (i, w) in e.iter().enumerate() {
                    acc += w * self.k[i][m];
                }
                self.err[m] = h * acc;
            }
        }
        Ok(())
    }

    fn advance_euler_cromer(
        &mut self,
        src: &mut dyn DerivativeSource,
        t: f64,
        y: &mut [f64],
        h: f64,
    ) -> Result<AdvanceReport, IntegError> {
        src.derivatives(t, y, &mut self.f0)?;
        for seg in &self.segments {
            if seg.second_order {
                let half = seg.len / 2;
                for i in 0..half {
                    let x = seg.offset + i;
                    let v = x + half;
                    y[v] += h * self.f0[v];
                    y[x] += h * y[v];
                }
            } else {
                for i in seg.offset..seg.offset + seg.len {
                    y[i] += h * self.f0[i];
                }
            }
        }
        Ok(AdvanceReport {
            substeps: 1,
            rejections: 0,
            evaluations: 1,
            error_norm: None,
        })
    }

    fn advance_abm(
        &mut self,
        src: &mut dyn DerivativeSource,
        t: f64,
        y: &mut [f64],
        h: f64,
        mode: StepMode,
    ) -> Result<AdvanceReport, IntegError> {
        if mode == StepMode::Trial {
            return self.rk4_start(src, t, y, h);
        }

        self.memory.history.align(h);
        if !self.memory.history.is_ready() {
            let report = self.rk4_start(src, t, y, h)?;
            // k[0] is f(t, y) at the start of the step just taken.
            self.memory.history.push(&self.k[0]);
            return Ok(report);
        }

        src.derivatives(t, y, &mut self.f0)?;
        self.memory
            .history
            .predict(y, &self.f0, h, &mut self.stage);
        src.derivatives(t + h, &self.stage, &mut self.fp)?;
        self.memory
            .history
            .correct(y, &self.f0, &self.fp, h, &mut self.out);

        // Milne's estimate of the corrector's local error.
        for m in 0..y.len() {
            self.err[m] = 19.0 / 270.0 * (self.out[m] - self.stage[m]);
        }
        let norm = self.adaptive.error_norm(y, &self.out, &self.err);
        self.last_error = Some(norm);

        self.memory.history.push(&self.f0);
        y.copy_from_slice(&self.out);
        Ok(AdvanceReport {
            substeps: 1,
            rejections: 0,
            evaluations: 2,
            error_norm: Some(norm),
        })
    }

    fn rk4_start(
        &mut self,
        src: &mut dyn DerivativeSource,
        t: f64,
        y: &mut [f64],
        h: f64,
    ) -> Result<AdvanceReport, IntegError> {
        self.rk_step(&tableau::RK4, src, t, y, h)?;
        y.copy_from_slice(&self.out);
        Ok(AdvanceReport {
            substeps: 1,
            rejections: 0,
            evaluations: 4,
            error_norm: None,
        })
    }

    fn advance_adaptive(
        &mut self,
        src: &mut dyn DerivativeSource,
        t0: f64,
        y: &mut [f64],
        span: f64,
        mode: StepMode,
    ) -> Result<AdvanceReport, IntegError> {
        let tab = self.kind.tableau();
        let end = t0 + span;
        let eps = 1e-12 * end.abs().max(1.0);
        let mut h = self
            .memory
            .h_next
            .or(self.adaptive.initial_step)
            .unwrap_or(span)
            .min(span);
        let mut t = t0;
        let mut retry = RetryState::new(&self.adaptive);
        let mut report = AdvanceReport::default();
        let mut worst: f64 = 0.0;

        while end - t > eps {
            let remaining = end - t;
            let last = h >= remaining - eps;
            let h_try = if last { remaining } else { h };

            self.rk_step(tab, src, t, y, h_try)?;
            report.evaluations += tab.stages() as u32;

            if mode == StepMode::Trial {
                y.copy_from_slice(&self.out);
                t = if last { end } else { t + h_try };
                report.substeps += 1;
                continue;
            }

            let norm = self.adaptive.error_norm(y, &self.out, &self.err);
            let outcome = self.adaptive.judge(h_try, norm, tab.error_order);
            match retry.observe(t, outcome)? {
                None => {
                    y.copy_from_slice(&self.out);
                    t = if last { end } else { t + h_try };
                    report.substeps += 1;
                    worst = worst.max(norm);
                    if let StepOutcome::Accepted { h_next, .. } = outcome {
                        // A final substep clipped to the span says little
                        // about the natural step size.
                        h = if last && h_try < h { h.max(h_next) } else { h_next };
                    }
                }
                Some(smaller) => {
                    h = smaller;
                    report.rejections += 1;
                }
            }
        }

        if mode == StepMode::Commit {
            self.memory.h_next = Some(h);
            self.last_error = Some(worst);
            report.error_norm = Some(worst);
        }
        Ok(report)
    }
}
