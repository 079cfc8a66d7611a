//! Fixture jobs for the standard test scenarios.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cadence_core::JobError;
use cadence_job::{DerivativeJob, EventCondition, Job, JobContext, StageView};

/// Shared, append-only record of strings written by jobs.
#[derive(Clone, Debug, Default)]
pub struct SharedLog(Arc<Mutex<Vec<String>>>);

impl SharedLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

// ── Derivatives ─────────────────────────────────────────────────

/// `dx/dt = -rate * x` for every element.
pub struct DecayDerivative {
    pub rate: f64,
}

impl DerivativeJob for DecayDerivative {
    fn evaluate(&self, view: &StageView<'_>, dydt: &mut [f64]) -> Result<(), JobError> {
        for (d, x) in dydt.iter_mut().zip(view.own()) {
            *d = -self.rate * x;
        }
        Ok(())
    }
}

/// Uniform gravity on a second-order vector `[positions.., velocities..]`.
/// Only the first axis accelerates.
pub struct FreeFall {
    pub gravity: f64,
}

impl DerivativeJob for FreeFall {
    fn evaluate(&self, view: &StageView<'_>, dydt: &mut [f64]) -> Result<(), JobError> {
        let y = view.own();
        let half = y.len() / 2;
        dydt[..half].copy_from_slice(&y[half..]);
        dydt[half..].fill(0.0);
        if half > 0 {
            dydt[half] = -self.gravity;
        }
        Ok(())
    }
}

// ── Conditions ──────────────────────────────────────────────────

/// The first value of the owning vector.
pub struct Altitude;

impl EventCondition for Altitude {
    fn evaluate(&self, view: &StageView<'_>) -> f64 {
        view.own().first().copied().unwrap_or(0.0)
    }
}

// ── Tasks ───────────────────────────────────────────────────────

/// Event handler reversing the first velocity of a second-order state,
/// scaled by `restitution`. Logs each firing time.
pub struct BounceJob {
    pub state: String,
    pub restitution: f64,
    pub log: Arc<Mutex<Vec<f64>>>,
}

impl BounceJob {
    pub fn new(state: impl Into<String>, restitution: f64) -> Self {
        Self {
            state: state.into(),
            restitution,
            log: Arc::default(),
        }
    }

    /// Firing times recorded so far.
    pub fn times(&self) -> Arc<Mutex<Vec<f64>>> {
        Arc::clone(&self.log)
    }
}

impl Job for BounceJob {
    fn name(&self) -> &str {
        "bounce"
    }

    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        let time = ctx.event().map(|e| e.time).unwrap_or(ctx.time());
        let id = ctx
            .find_state(&self.state)
            .ok_or_else(|| JobError::new(1, format!("no state '{}'", self.state)))?;
        let y = ctx
            .state_mut(id)
            .ok_or_else(|| JobError::new(1, "state vanished"))?;
        let half = y.len() / 2;
        y[half] = -self.restitution * y[half];
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(time);
        Ok(())
    }
}

/// Counts its calls.
pub struct CountingJob {
    pub name: String,
    pub count: Arc<AtomicU64>,
}

impl CountingJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: Arc::default(),
        }
    }

    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.count)
    }
}

impl Job for CountingJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, _ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Succeeds `succeed` times, then fails with `code` on every call.
pub struct FailingJob {
    pub name: String,
    pub succeed: u64,
    pub code: i32,
    calls: u64,
}

impl FailingJob {
    pub fn new(name: impl Into<String>, succeed: u64, code: i32) -> Self {
        Self {
            name: name.into(),
            succeed,
            code,
            calls: 0,
        }
    }
}

impl Job for FailingJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, _ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        self.calls += 1;
        if self.calls > self.succeed {
            return Err(JobError::new(self.code, format!("call {} failed", self.calls)));
        }
        Ok(())
    }
}

/// Appends `"<name>@<frame>"` to a shared log on every call.
pub struct RecordingJob {
    pub name: String,
    pub log: SharedLog,
}

impl RecordingJob {
    pub fn new(name: impl Into<String>, log: &SharedLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
        }
    }
}

impl Job for RecordingJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        self.log.push(format!("{}@{}", self.name, ctx.frame().0));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{FrameId, SimTime, StateDef, StateId, StateStore};
    use cadence_job::{Requests, StateLayout};

    #[test]
    fn free_fall_accelerates_first_axis_only() {
        let mut layout = StateLayout::new();
        layout.push(StateId(0), "ball", 4);
        let y = [10.0, 0.0, -1.0, 2.0];
        let view = StageView::new(0.0, &y, &layout, 0);
        let mut d = [0.0; 4];
        FreeFall { gravity: 9.81 }.evaluate(&view, &mut d).unwrap();
        assert_eq!(d, [-1.0, 2.0, -9.81, 0.0]);
        assert_eq!(Altitude.evaluate(&view), 10.0);
    }

    #[test]
    fn bounce_reverses_velocity() {
        let mut store = StateStore::from_defs(&[StateDef::second_order("ball", &[0.0], &[-3.0])]);
        let mut requests = Requests::default();
        let mut job = BounceJob::new("ball", 0.5);
        let times = job.times();
        let mut ctx = JobContext::new(FrameId(0), SimTime::ZERO, 0.25, &mut store, &mut requests);
        job.run(&mut ctx).unwrap();
        assert_eq!(store.get(StateId(0)).unwrap().values(), &[0.0, 1.5]);
        assert_eq!(*times.lock().unwrap(), vec![0.25]);
    }

    #[test]
    fn failing_job_fails_after_budget() {
        let mut store = StateStore::default();
        let mut requests = Requests::default();
        let mut job = FailingJob::new("flaky", 1, 7);
        let mut ctx = JobContext::new(FrameId(0), SimTime::ZERO, 0.0, &mut store, &mut requests);
        assert!(job.run(&mut ctx).is_ok());
        assert_eq!(job.run(&mut ctx).unwrap_err().code, 7);
    }
}
