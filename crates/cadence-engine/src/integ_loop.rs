//! Integration loops and the arena that nests them.
//!
//! An [`IntegLoop`] owns the working buffer of the state vectors it
//! integrates. One step moves the buffer from the loop time `t` to
//! `t + dt`:
//!
//! ```text
//! Idle -> Advancing -> CheckingEvents -> Idle
//!             ^              |
//!             +-- Rewinding <+  (a crossing)
//! ```
//!
//! Stage derivatives are evaluated by the integrator inside `Advancing`.
//! The separate `EvaluatingDerivatives` phase covers only the refresh at
//! a frame boundary, which writes derivatives at the loop time back into
//! the store (`Idle -> EvaluatingDerivatives -> Idle`).
//!
//! When an event condition crosses zero during the step, the step is
//! rewound: every crossing is located with the event detector, the
//! state is advanced again from the step start to the earliest crossing
//! time `t*`, the events crossed at `t*` fire, and the step continues
//! from `t*` over the remaining interval.
//!
//! Loops live in a [`LoopArena`]. A child loop holds its parent's
//! [`LoopId`]; a parent holds its children's. After each parent step
//! every child runs its exact integer ratio of steps.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use smallvec::SmallVec;

use cadence_core::{ExecError, JobError, JobId, LoopId, SimTime, StateStore, TimeBase};
use cadence_event::Crossing;
use cadence_integ::{
    AdvanceReport, DerivativeSource, IntegError, Integrator, IntegratorKind, IntegratorMemory,
    StepMode,
};
use cadence_job::{
    DerivativeJob, EventFiring, JobClass, JobContext, ReturnPolicy, StageView, StateLayout,
};

use crate::dispatch::FrameEnv;
use crate::events::{EventSlot, EventTable};
use crate::telemetry::{FiringRecord, JobErrorRecord, WarningRecord};

/// Where a loop is in its step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopPhase {
    /// Between steps.
    #[default]
    Idle,
    /// Writing boundary derivatives into the store.
    EvaluatingDerivatives,
    /// Running the integrator.
    Advancing,
    /// Comparing event conditions across the step.
    CheckingEvents,
    /// Locating crossings and redoing the step up to the earliest one.
    Rewinding,
}

/// Public view of a loop.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopStatus {
    /// Loop ID.
    pub id: LoopId,
    /// Loop name.
    pub name: String,
    /// Integration strategy.
    pub integrator: IntegratorKind,
    /// Parent loop.
    pub parent: Option<LoopId>,
    /// Steps per parent step (or per frame, for roots).
    pub ratio: u32,
    /// Step size in seconds.
    pub dt: f64,
    /// Loop time in seconds.
    pub time: f64,
    /// Completed steps.
    pub steps: u64,
    /// Current phase.
    pub phase: LoopPhase,
}

pub(crate) struct DerivSlot {
    pub job: JobId,
    pub name: String,
    pub eval: Arc<dyn DerivativeJob>,
}

/// A failed integrator call, before it is turned into an [`ExecError`].
struct StepFailure {
    error: IntegError,
    failed: Option<usize>,
}

// ── Derivative source ──────────────────────────────────────────────

/// Evaluates every derivative job of a loop over the whole buffer.
///
/// In parallel mode the derivative slices of different vectors are
/// computed on the rayon pool; all results are collected before the
/// integrator sees any of them.
struct LoopDerivatives<'a> {
    layout: &'a StateLayout,
    derivs: &'a [DerivSlot],
    store: &'a StateStore,
    parallel: bool,
    failed: Option<usize>,
}

impl<'a> LoopDerivatives<'a> {
    fn new(
        layout: &'a StateLayout,
        derivs: &'a [DerivSlot],
        store: &'a StateStore,
        parallel: bool,
    ) -> Self {
        Self {
            layout,
            derivs,
            store,
            parallel,
            failed: None,
        }
    }
}

impl DerivativeSource for LoopDerivatives<'_> {
    fn derivatives(&mut self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), JobError> {
        let (layout, derivs, store) = (self.layout, self.derivs, self.store);

        if self.parallel && derivs.len() > 1 {
            let mut chunks: Vec<&mut [f64]> = Vec::with_capacity(derivs.len());
            let mut rest = dydt;
            for entry in layout.entries() {
                let (head, tail) = std::mem::take(&mut rest).split_at_mut(entry.len);
                chunks.push(head);
                rest = tail;
            }
            let results: Vec<Result<(), JobError>> = chunks
                .into_par_iter()
                .enumerate()
                .map(|(i, out)| {
                    let view = StageView::new(t, y, layout, i).with_external(store);
                    derivs[i].eval.evaluate(&view, out)
                })
                .collect();
            // Report the first failure in layout order, whatever the
            // completion order was.
            for (i, result) in results.into_iter().enumerate() {
                if let Err(e) = result {
                    self.failed = Some(i);
                    return Err(e);
                }
            }
            return Ok(());
        }

        for (i, entry) in layout.entries().iter().enumerate() {
            let view = StageView::new(t, y, layout, i).with_external(store);
            if let Err(e) = derivs[i].eval.evaluate(&view, &mut dydt[entry.range()]) {
                self.failed = Some(i);
                return Err(e);
            }
        }
        Ok(())
    }
}

// ── IntegLoop ──────────────────────────────────────────────────────

pub(crate) struct IntegLoop {
    id: LoopId,
    name: String,
    base: TimeBase,
    dt: SimTime,
    parent: Option<LoopId>,
    children: SmallVec<[LoopId; 4]>,
    ratio: u32,
    time: SimTime,
    phase: LoopPhase,
    integrator: Integrator,
    layout: StateLayout,
    derivs: Vec<DerivSlot>,
    hooks: Vec<JobId>,
    events: SmallVec<[usize; 4]>,
    parallel: bool,
    buffer: Vec<f64>,
    y0: Vec<f64>,
    trial: Vec<f64>,
    dydt: Vec<f64>,
    steps: u64,
}

/// Construction parameters of an [`IntegLoop`].
pub(crate) struct LoopParts {
    pub id: LoopId,
    pub name: String,
    pub base: TimeBase,
    pub dt: SimTime,
    pub parent: Option<LoopId>,
    pub ratio: u32,
    pub integrator: Integrator,
    pub layout: StateLayout,
    pub derivs: Vec<DerivSlot>,
    pub parallel: bool,
}

impl IntegLoop {
    pub fn new(parts: LoopParts, store: &StateStore) -> Self {
        let n = parts.layout.total_len();
        let mut lp = Self {
            id: parts.id,
            name: parts.name,
            base: parts.base,
            dt: parts.dt,
            parent: parts.parent,
            children: SmallVec::new(),
            ratio: parts.ratio,
            time: SimTime::ZERO,
            phase: LoopPhase::Idle,
            integrator: parts.integrator,
            layout: parts.layout,
            derivs: parts.derivs,
            hooks: Vec::new(),
            events: SmallVec::new(),
            parallel: parts.parallel,
            buffer: vec![0.0; n],
            y0: vec![0.0; n],
            trial: vec![0.0; n],
            dydt: vec![0.0; n],
            steps: 0,
        };
        lp.sync(store);
        lp
    }

    pub fn id(&self) -> LoopId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn memory(&self) -> &IntegratorMemory {
        self.integrator.memory()
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn add_hook(&mut self, job: JobId) {
        self.hooks.push(job);
    }

    pub fn add_event(&mut self, index: usize) {
        self.events.push(index);
    }

    pub fn status(&self) -> LoopStatus {
        LoopStatus {
            id: self.id,
            name: self.name.clone(),
            integrator: self.integrator.kind(),
            parent: self.parent,
            ratio: self.ratio,
            dt: self.base.seconds(self.dt),
            time: self.base.seconds(self.time),
            steps: self.steps,
            phase: self.phase,
        }
    }

    /// Put back loop time, step count and integrator memory from a
    /// snapshot. The buffer is reloaded from `store`, which must already
    /// hold the restored values.
    pub fn restore(
        &mut self,
        time: SimTime,
        steps: u64,
        memory: IntegratorMemory,
        store: &StateStore,
    ) {
        self.time = time;
        self.steps = steps;
        self.phase = LoopPhase::Idle;
        self.integrator.set_memory(memory);
        self.sync(store);
    }

    /// Load the buffer from the store.
    pub fn sync(&mut self, store: &StateStore) {
        gather(&self.layout, store, &mut self.buffer);
    }

    fn scatter(&self, store: &mut StateStore) {
        for entry in self.layout.entries() {
            if let Some(v) = store.get_mut(entry.state) {
                v.values_mut().copy_from_slice(&self.buffer[entry.range()]);
            }
        }
    }

    fn differs_from(&self, store: &StateStore) -> bool {
        self.layout.entries().iter().any(|entry| {
            store.get(entry.state).is_some_and(|v| {
                v.values()
                    .iter()
                    .zip(&self.buffer[entry.range()])
                    .any(|(a, b)| a.to_bits() != b.to_bits())
            })
        })
    }

    /// Pick up changes made to the loop's vectors outside the loop.
    ///
    /// A changed state invalidates multistep history and every event's
    /// reference value, so a jump across zero made by a job never
    /// counts as a crossing. Returns whether anything changed.
    pub fn settle(&mut self, store: &StateStore, events: &mut EventTable) -> bool {
        if !self.differs_from(store) {
            return false;
        }
        self.sync(store);
        self.integrator.reset_history();
        self.prime_events(store, events);
        true
    }

    /// Set every active event's reference value from the current buffer.
    pub fn prime_events(&self, store: &StateStore, events: &mut EventTable) {
        self.prime_events_at(self.base.seconds(self.time), store, events);
    }

    /// Write derivatives at the current loop time into the store.
    pub fn refresh_derivs(&mut self, env: &mut FrameEnv<'_>) -> Result<(), ExecError> {
        self.phase = LoopPhase::EvaluatingDerivatives;
        let t = self.base.seconds(self.time);
        gather(&self.layout, env.store, &mut self.trial);
        let mut src = LoopDerivatives::new(&self.layout, &self.derivs, env.store, self.parallel);
        let outcome = src.derivatives(t, &self.trial, &mut self.dydt);
        let failed = src.failed;
        self.phase = LoopPhase::Idle;
        if let Err(e) = outcome {
            return Err(self.fail(
                env,
                StepFailure {
                    error: IntegError::Derivative(e),
                    failed,
                },
            ));
        }
        env.telemetry.metrics.evaluations += 1;
        for entry in self.layout.entries() {
            if let Some(v) = env.store.get_mut(entry.state) {
                v.derivs_mut().copy_from_slice(&self.dydt[entry.range()]);
            }
        }
        Ok(())
    }

    /// Advance the buffer from `t` over `h` seconds.
    fn advance(
        &mut self,
        store: &StateStore,
        t: f64,
        h: f64,
        mode: StepMode,
    ) -> Result<AdvanceReport, StepFailure> {
        let mut src = LoopDerivatives::new(&self.layout, &self.derivs, store, self.parallel);
        let result = self
            .integrator
            .advance(&mut src, t, &mut self.buffer, h, mode);
        let failed = src.failed;
        result.map_err(|error| StepFailure { error, failed })
    }

    /// Find where `slot`'s condition crosses zero in `window`.
    ///
    /// Every probe advances a copy of the step-start state with a trial
    /// step, so the memory of the integrator is left as it was.
    fn locate(
        &mut self,
        slot: &EventSlot,
        store: &StateStore,
        window: (f64, f64),
        previous: f64,
        current: f64,
    ) -> Result<(Option<Crossing>, u64), StepFailure> {
        let Self {
            integrator,
            layout,
            derivs,
            y0,
            trial,
            parallel,
            ..
        } = self;
        let mut src = LoopDerivatives::new(layout, derivs, store, *parallel);
        let t0 = window.0;
        let mut evaluations = 0u64;
        let located = slot.detector.check(
            slot.direction,
            |x| {
                trial.copy_from_slice(y0);
                let report = integrator.advance(&mut src, t0, trial, x - t0, StepMode::Trial)?;
                evaluations += u64::from(report.evaluations);
                let view = StageView::new(x, trial, layout, slot.entry).with_external(store);
                Ok(slot.evaluate(&view))
            },
            previous,
            current,
            window,
        );
        match located {
            Ok(crossing) => Ok((crossing, evaluations)),
            Err(error) => Err(StepFailure {
                error,
                failed: src.failed,
            }),
        }
    }

    /// Turn an integrator failure into the run-time error that stops the
    /// executive, recording a failed derivative job on the way.
    fn fail(&self, env: &mut FrameEnv<'_>, failure: StepFailure) -> ExecError {
        let frame = env.frame.0;
        let err = match failure.error {
            IntegError::Derivative(error) => {
                let slot = failure.failed.and_then(|i| self.derivs.get(i));
                let job = slot.map_or_else(|| self.name.clone(), |d| d.name.clone());
                if let Some(d) = slot {
                    env.registry.mark_failed(d.job);
                }
                env.telemetry.job_errors.push(JobErrorRecord {
                    job: slot.map(|d| d.job),
                    name: job.clone(),
                    class: JobClass::Derivative,
                    code: error.code,
                    reason: error.reason.clone(),
                    fatal: true,
                });
                ExecError::JobFailed { job, frame, error }
            }
            IntegError::RetryExhausted {
                time,
                step,
                error_norm,
            } => ExecError::IntegrationRetryExhausted {
                loop_id: self.id,
                time,
                step,
                error_norm,
            },
            IntegError::NonFinite { time } => ExecError::NonFiniteState {
                loop_id: self.id,
                time,
            },
            other => ExecError::IntegrationFailed {
                loop_id: self.id,
                reason: other.to_string(),
            },
        };
        tracing::error!(frame, loop_name = %self.name, error = %err, "integration stopped");
        err
    }

    fn account(env: &mut FrameEnv<'_>, report: &AdvanceReport) {
        let m = &mut env.telemetry.metrics;
        m.evaluations += u64::from(report.evaluations);
        m.substeps += u64::from(report.substeps);
        m.rejections += u64::from(report.rejections);
    }

    /// One full step of `dt`, with event handling, then the loop's
    /// post-step hooks.
    pub fn step(&mut self, env: &mut FrameEnv<'_>) -> Result<(), ExecError> {
        let end = self.time + self.dt;
        let t_end = self.base.seconds(end);
        let mut t = self.base.seconds(self.time);
        let eps = 1e-12 * t_end.abs().max(1.0);
        let mut firings = 0u32;

        if self.settle(env.store, env.events) {
            tracing::trace!(loop_name = %self.name, t, "state changed outside the loop");
        }

        while t_end - t > eps {
            let memory = self.integrator.memory().clone();
            self.y0.copy_from_slice(&self.buffer);

            self.phase = LoopPhase::Advancing;
            let report = match self.advance(env.store, t, t_end - t, StepMode::Commit) {
                Ok(r) => r,
                Err(f) => return Err(self.fail(env, f)),
            };
            Self::account(env, &report);

            // Condition values at the step end, for every active event.
            self.phase = LoopPhase::CheckingEvents;
            let mut values: SmallVec<[(usize, Option<f64>, f64); 4]> = SmallVec::new();
            for &idx in &self.events {
                let slot = env.events.slot(idx);
                if !slot.is_active() {
                    continue;
                }
                let view = StageView::new(t_end, &self.buffer, &self.layout, slot.entry)
                    .with_external(env.store);
                values.push((idx, slot.last_value, slot.evaluate(&view)));
            }
            let crossed: SmallVec<[(usize, f64, f64); 4]> = values
                .iter()
                .filter_map(|&(idx, prev, curr)| {
                    let prev = prev?;
                    env.events
                        .slot(idx)
                        .direction
                        .crossed(prev, curr)
                        .then_some((idx, prev, curr))
                })
                .collect();

            if crossed.is_empty() {
                for (idx, _, curr) in values {
                    env.events.slot_mut(idx).last_value = Some(curr);
                }
                break;
            }

            // Rewind and locate every crossing from the step start.
            self.phase = LoopPhase::Rewinding;
            self.integrator.set_memory(memory);
            let mut located: SmallVec<[(usize, f64); 4]> = SmallVec::new();
            for &(idx, prev, curr) in &crossed {
                let slot = env.events.slot(idx);
                let (crossing, evaluations) =
                    match self.locate(slot, env.store, (t, t_end), prev, curr) {
                        Ok(found) => found,
                        Err(f) => return Err(self.fail(env, f)),
                    };
                env.telemetry.metrics.evaluations += evaluations;
                let Some(crossing) = crossing else {
                    continue;
                };
                if let Some(warning) = crossing.warning {
                    let name = env.events.slot(idx).name.clone();
                    tracing::warn!(event = %name, time = crossing.time, %warning, "event location did not converge");
                    env.telemetry.warnings.push(WarningRecord {
                        event: name,
                        time: crossing.time,
                        warning,
                    });
                }
                located.push((idx, crossing.time));
            }
            let t_star = located
                .iter()
                .map(|&(_, time)| time)
                .fold(t_end, f64::min);

            // Redo up to the earliest crossing. The redo repeats the
            // probe that produced `t_star`, so it sees the same state.
            self.buffer.copy_from_slice(&self.y0);
            self.phase = LoopPhase::Advancing;
            match self.advance(env.store, t, t_star - t, StepMode::Trial) {
                Ok(report) => Self::account(env, &report),
                Err(f) => return Err(self.fail(env, f)),
            }

            // Fire, in registration order, every event crossed by t*.
            let mut due: SmallVec<[(usize, f64); 4]> = SmallVec::new();
            for &(idx, prev, _) in &crossed {
                let slot = env.events.slot(idx);
                let view = StageView::new(t_star, &self.buffer, &self.layout, slot.entry)
                    .with_external(env.store);
                let value = slot.evaluate(&view);
                let at_star = located.iter().any(|&(i, time)| i == idx && time <= t_star);
                if at_star || slot.direction.crossed(prev, value) {
                    due.push((idx, value));
                }
            }
            self.scatter(env.store);
            for (idx, value) in due {
                firings += 1;
                if firings > env.max_firings {
                    let event = env.events.slot(idx).name.clone();
                    tracing::error!(frame = %env.frame, %event, firings, "event storm");
                    return Err(ExecError::EventStorm {
                        event,
                        frame: env.frame.0,
                        firings,
                    });
                }
                fire(env, idx, t_star, value)?;
            }

            // Handlers may have changed anything; start over from t*.
            self.sync(env.store);
            self.integrator.reset_history();
            t = t_star;
            self.prime_events_at(t, env.store, env.events);
        }

        self.time = end;
        self.steps += 1;
        self.phase = LoopPhase::Idle;
        self.scatter(env.store);

        for i in 0..self.hooks.len() {
            let id = self.hooks[i];
            if env.registry.get(id).is_some_and(|e| e.is_runnable()) {
                env.run_job(id, t_end, end)?;
            }
        }
        Ok(())
    }

    fn prime_events_at(&self, t: f64, store: &StateStore, events: &mut EventTable) {
        for &idx in &self.events {
            let slot = events.slot_mut(idx);
            slot.last_value = if slot.is_active() {
                let view = StageView::new(t, &self.buffer, &self.layout, slot.entry)
                    .with_external(store);
                Some(slot.evaluate(&view))
            } else {
                None
            };
        }
    }
}

fn gather(layout: &StateLayout, store: &StateStore, out: &mut [f64]) {
    for entry in layout.entries() {
        if let Some(v) = store.get(entry.state) {
            out[entry.range()].copy_from_slice(v.values());
        }
    }
}

/// Record a firing and run the event's handler.
fn fire(env: &mut FrameEnv<'_>, idx: usize, time: f64, value: f64) -> Result<(), ExecError> {
    let slot = env.events.slot_mut(idx);
    slot.fire_count += 1;
    slot.last_fired = Some(time);
    env.telemetry.firings.push(FiringRecord {
        event: slot.name.clone(),
        time,
        value,
    });
    env.telemetry.metrics.firings += 1;
    tracing::debug!(frame = %env.frame, event = %slot.name, time, value, "event fired");

    let Some(handler) = slot.handler.as_mut() else {
        return Ok(());
    };
    let firing = EventFiring {
        event: slot.id,
        name: slot.name.clone(),
        time,
        value,
    };
    let mut ctx = JobContext::new(env.frame, env.frame_time, time, env.store, env.requests)
        .with_event(&firing);
    let Err(error) = handler.run(&mut ctx) else {
        return Ok(());
    };

    let fatal = slot.policy == ReturnPolicy::Fatal;
    env.telemetry.job_errors.push(JobErrorRecord {
        job: None,
        name: slot.name.clone(),
        class: JobClass::DynamicEvent,
        code: error.code,
        reason: error.reason.clone(),
        fatal,
    });
    if fatal {
        tracing::error!(frame = %env.frame, event = %slot.name, code = error.code, reason = %error.reason, "fatal event handler failure");
        return Err(ExecError::JobFailed {
            job: slot.name.clone(),
            frame: env.frame.0,
            error,
        });
    }
    slot.degraded = true;
    tracing::warn!(frame = %env.frame, event = %slot.name, code = error.code, reason = %error.reason, "event degraded");
    Ok(())
}

// ── LoopArena ──────────────────────────────────────────────────────

/// Owner of every loop. Parents and children refer to each other by
/// [`LoopId`] only.
#[derive(Default)]
pub(crate) struct LoopArena {
    loops: Vec<IntegLoop>,
    roots: SmallVec<[LoopId; 4]>,
}

impl LoopArena {
    pub fn push(&mut self, lp: IntegLoop) {
        let id = lp.id;
        match lp.parent {
            Some(parent) => {
                if let Some(p) = self.loops.get_mut(parent.0 as usize) {
                    p.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        self.loops.push(lp);
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn get(&self, id: LoopId) -> Option<&IntegLoop> {
        self.loops.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: LoopId) -> Option<&mut IntegLoop> {
        self.loops.get_mut(id.0 as usize)
    }

    pub fn find(&self, name: &str) -> Option<LoopId> {
        self.loops.iter().find(|l| l.name == name).map(|l| l.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntegLoop> {
        self.loops.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut IntegLoop> {
        self.loops.iter_mut()
    }

    /// Step every root loop, and its children, up to `frame_end`.
    ///
    /// Roots advance one after another in registration order.
    pub fn advance_frame(
        &mut self,
        env: &mut FrameEnv<'_>,
        frame_end: SimTime,
    ) -> Result<(), ExecError> {
        let started = Instant::now();
        let roots = self.roots.clone();
        let mut result = Ok(());
        'roots: for root in roots {
            while self.loops[root.0 as usize].time < frame_end {
                if let Err(e) = self.step_tree(root, env) {
                    result = Err(e);
                    break 'roots;
                }
            }
        }
        env.telemetry.metrics.integration_us += started.elapsed().as_micros() as u64;
        result
    }

    fn step_tree(&mut self, id: LoopId, env: &mut FrameEnv<'_>) -> Result<(), ExecError> {
        self.loops[id.0 as usize].step(env)?;
        let children = self.loops[id.0 as usize].children.clone();
        for child in children {
            let ratio = self.loops[child.0 as usize].ratio;
            for _ in 0..ratio {
                self.step_tree(child, env)?;
            }
        }
        Ok(())
    }

    /// Bring every loop in line with the store at a frame boundary.
    pub fn settle(&mut self, store: &StateStore, events: &mut EventTable) {
        for lp in &mut self.loops {
            lp.settle(store, events);
        }
    }

    pub fn refresh_derivs(&mut self, env: &mut FrameEnv<'_>) -> Result<(), ExecError> {
        for lp in &mut self.loops {
            lp.refresh_derivs(env)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::FrameTelemetry;
    use crate::ExecMode;
    use cadence_core::{EventId, FrameId, StateDef, StateId};
    use cadence_event::{Direction, EventDetector};
    use cadence_integ::{AdaptiveConfig, Segment};
    use cadence_job::{condition_fn, derivative_fn, JobRegistry, Requests};

    struct Rig {
        store: StateStore,
        registry: JobRegistry,
        events: EventTable,
        requests: Requests,
        telemetry: FrameTelemetry,
    }

    impl Rig {
        fn new(defs: &[StateDef]) -> Self {
            Self {
                store: StateStore::from_defs(defs),
                registry: JobRegistry::new(SimTime(100_000)),
                events: EventTable::default(),
                requests: Requests::default(),
                telemetry: FrameTelemetry::new(FrameId(0), 0.0, ExecMode::Running),
            }
        }

        fn env(&mut self) -> FrameEnv<'_> {
            FrameEnv {
                store: &mut self.store,
                registry: &mut self.registry,
                events: &mut self.events,
                requests: &mut self.requests,
                telemetry: &mut self.telemetry,
                frame: FrameId(0),
                frame_time: SimTime::ZERO,
                base: TimeBase::default(),
                max_firings: 16,
            }
        }
    }

    fn single_loop(
        rig: &Rig,
        kind: IntegratorKind,
        dt: i64,
        eval: Arc<dyn DerivativeJob>,
    ) -> IntegLoop {
        let v = rig.store.get(StateId(0)).unwrap();
        let mut layout = StateLayout::new();
        layout.push(StateId(0), v.name(), v.len());
        let seg = Segment {
            offset: 0,
            len: v.len(),
            second_order: v.order() == cadence_core::Order::Second,
        };
        let integrator = Integrator::new(kind, vec![seg], AdaptiveConfig::default()).unwrap();
        IntegLoop::new(
            LoopParts {
                id: LoopId(0),
                name: "main".into(),
                base: TimeBase::default(),
                dt: SimTime(dt),
                parent: None,
                ratio: 1,
                integrator,
                layout,
                derivs: vec![DerivSlot {
                    job: JobId(0),
                    name: "deriv".into(),
                    eval,
                }],
                parallel: false,
            },
            &rig.store,
        )
    }

    #[test]
    fn plain_step_advances_and_scatters() {
        let mut rig = Rig::new(&[StateDef::first_order("x", vec![1.0])]);
        let eval = Arc::new(derivative_fn(|_, d| {
            d[0] = 2.0;
            Ok(())
        }));
        let mut lp = single_loop(&rig, IntegratorKind::Euler, 10_000, eval);
        lp.step(&mut rig.env()).unwrap();
        assert_eq!(lp.time(), SimTime(10_000));
        assert_eq!(lp.steps(), 1);
        assert_eq!(lp.status().phase, LoopPhase::Idle);
        let x = rig.store.get(StateId(0)).unwrap().values()[0];
        assert!((x - 1.02).abs() < 1e-15);
        // The step's only evaluation is the integrator's first stage.
        assert_eq!(rig.telemetry.metrics.evaluations, 1);

        lp.refresh_derivs(&mut rig.env()).unwrap();
        assert_eq!(lp.status().phase, LoopPhase::Idle);
        assert_eq!(rig.store.get(StateId(0)).unwrap().derivs()[0], 2.0);
    }

    #[test]
    fn crossing_is_located_inside_the_step() {
        // x' = -1 from 0.5: the zero is at t = 0.5 within a 1 s step.
        let mut rig = Rig::new(&[StateDef::first_order("x", vec![0.5])]);
        let eval = Arc::new(derivative_fn(|_, d| {
            d[0] = -1.0;
            Ok(())
        }));
        let mut lp = single_loop(&rig, IntegratorKind::Euler, 1_000_000, eval);
        rig.events.push(EventSlot {
            id: EventId(0),
            name: "zero".into(),
            state: StateId(0),
            loop_id: LoopId(0),
            entry: 0,
            condition: Arc::new(condition_fn(|v| v.own()[0])),
            handler: None,
            direction: Direction::Falling,
            detector: EventDetector::default(),
            policy: ReturnPolicy::Degraded,
            enabled: true,
            degraded: false,
            last_value: None,
            fire_count: 0,
            last_fired: None,
        });
        lp.add_event(0);
        lp.prime_events(&rig.store, &mut rig.events);
        lp.step(&mut rig.env()).unwrap();

        let slot = rig.events.slot(0);
        assert_eq!(slot.fire_count, 1);
        let fired = slot.last_fired.unwrap();
        assert!(fired >= 0.5 && fired - 0.5 <= 1e-9);
        // The step still finished at t = 1.
        let x = rig.store.get(StateId(0)).unwrap().values()[0];
        assert!((x + 0.5).abs() < 1e-12);
        assert_eq!(rig.telemetry.firings.len(), 1);
    }

    #[test]
    fn external_jump_across_zero_does_not_fire() {
        let mut rig = Rig::new(&[StateDef::first_order("x", vec![1.0])]);
        let eval = Arc::new(derivative_fn(|_, d| {
            d[0] = 0.0;
            Ok(())
        }));
        let mut lp = single_loop(&rig, IntegratorKind::Rk4, 10_000, eval);
        rig.events.push(EventSlot {
            id: EventId(0),
            name: "sign".into(),
            state: StateId(0),
            loop_id: LoopId(0),
            entry: 0,
            condition: Arc::new(condition_fn(|v| v.own()[0])),
            handler: None,
            direction: Direction::Either,
            detector: EventDetector::default(),
            policy: ReturnPolicy::Degraded,
            enabled: true,
            degraded: false,
            last_value: None,
            fire_count: 0,
            last_fired: None,
        });
        lp.add_event(0);
        lp.prime_events(&rig.store, &mut rig.events);
        rig.store.get_mut(StateId(0)).unwrap().values_mut()[0] = -1.0;
        lp.step(&mut rig.env()).unwrap();
        assert_eq!(rig.events.slot(0).fire_count, 0);
        assert_eq!(rig.events.slot(0).last_value, Some(-1.0));
    }

    #[test]
    fn derivative_failure_names_the_job() {
        let mut rig = Rig::new(&[StateDef::first_order("x", vec![1.0])]);
        let eval = Arc::new(derivative_fn(|_, _| Err(JobError::new(9, "diverged"))));
        let mut lp = single_loop(&rig, IntegratorKind::Rk4, 10_000, eval);
        let err = lp.step(&mut rig.env()).unwrap_err();
        assert!(matches!(err, ExecError::JobFailed { ref job, .. } if job == "deriv"));
        assert_eq!(rig.telemetry.job_errors.len(), 1);
        assert!(rig.telemetry.job_errors[0].fatal);
    }

    #[test]
    fn non_finite_state_is_fatal() {
        let mut rig = Rig::new(&[StateDef::first_order("x", vec![1.0])]);
        let eval = Arc::new(derivative_fn(|_, d| {
            d[0] = f64::INFINITY;
            Ok(())
        }));
        let mut lp = single_loop(&rig, IntegratorKind::Euler, 10_000, eval);
        let err = lp.step(&mut rig.env()).unwrap_err();
        assert!(matches!(err, ExecError::NonFiniteState { loop_id: LoopId(0), .. }));
    }

    #[test]
    fn parallel_evaluation_matches_serial() {
        let defs = [
            StateDef::first_order("a", vec![1.0, 2.0]),
            StateDef::first_order("b", vec![3.0]),
            StateDef::first_order("c", vec![-1.0, 0.5, 4.0]),
        ];
        let store = StateStore::from_defs(&defs);
        let mut layout = StateLayout::new();
        for (id, v) in store.iter() {
            layout.push(id, v.name(), v.len());
        }
        let derivs: Vec<DerivSlot> = (0..3)
            .map(|i| DerivSlot {
                job: JobId(i),
                name: format!("d{i}"),
                eval: Arc::new(derivative_fn(move |v, d| {
                    for (o, x) in d.iter_mut().zip(v.own()) {
                        *o = -x * (i + 1) as f64;
                    }
                    Ok(())
                })),
            })
            .collect();
        let y: Vec<f64> = vec![1.0, 2.0, 3.0, -1.0, 0.5, 4.0];
        let mut serial = vec![0.0; 6];
        let mut parallel = vec![0.0; 6];
        LoopDerivatives::new(&layout, &derivs, &store, false)
            .derivatives(0.0, &y, &mut serial)
            .unwrap();
        LoopDerivatives::new(&layout, &derivs, &store, true)
            .derivatives(0.0, &y, &mut parallel)
            .unwrap();
        assert_eq!(serial, parallel);
        assert_eq!(serial, vec![-1.0, -2.0, -6.0, 3.0, -1.5, -12.0]);
    }
}
