//! The executive: mode machine and frame scheduler.
//!
//! [`Executive`] owns every piece of simulation state: the state store,
//! the job registry, the loop arena, the event table, the control
//! queue and the real-time synchronizer. A single thread drives it.
//!
//! # Modes
//!
//! ```text
//! Initializing -> Running <-> Frozen -> ShuttingDown -> Terminated
//!                    ^
//!       Restoring ---+   (only from a snapshot)
//! ```
//!
//! # Frame order
//!
//! A running frame executes, in order: `top_of_frame`, `environment`,
//! `dynamic_event`, every root integration loop over the frame,
//! `scheduled`, `log`, `end_of_frame`; then the frame counter advances
//! and the real-time synchronizer paces the frame. Control commands and
//! job requests are applied at frame boundaries only.

use std::fmt;
use std::time::{Duration, Instant};

use cadence_core::{
    ControlCommand, ControlError, EventId, ExecError, Frame, FrameId, JobId, LoopId, Receipt,
    SimTime, StateStore, SystemClock, TimeBase, WallClock,
};
use cadence_integ::Segment;
use cadence_job::{
    Job, JobBody, JobClass, JobEntry, JobRegistry, JobSpec, RegistrationError, Requests,
    StateLayout,
};

use crate::config::{ConfigError, SimConfig};
use crate::control::{ControlHandle, ControlQueue};
use crate::dispatch::FrameEnv;
use crate::events::{EventSlot, EventStatus, EventTable};
use crate::integ_loop::{DerivSlot, IntegLoop, LoopArena, LoopParts, LoopStatus};
use crate::realtime::RealtimeSync;
use crate::telemetry::{FrameTelemetry, NullSink, TelemetrySink};

/// Borrow the executive's frame state as a [`FrameEnv`], leaving the
/// loop arena free for the caller.
macro_rules! frame_env {
    ($exec:ident) => {
        FrameEnv {
            store: &mut $exec.store,
            registry: &mut $exec.registry,
            events: &mut $exec.events,
            requests: &mut $exec.requests,
            telemetry: &mut $exec.telemetry,
            frame: $exec.frame.counter(),
            frame_time: $exec.frame.start(),
            base: $exec.base,
            max_firings: $exec.max_firings,
        }
    };
}

// ── ExecMode ───────────────────────────────────────────────────────

/// Executive mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecMode {
    /// Built, initialization jobs not yet run.
    Initializing,
    /// Frames advance.
    Running,
    /// Frames do not advance; control commands are still served.
    Frozen,
    /// A snapshot is being applied.
    Restoring,
    /// Shutdown jobs are due.
    ShuttingDown,
    /// Finished. Every further frame call fails.
    Terminated,
}

impl ExecMode {
    const ALL: [ExecMode; 6] = [
        ExecMode::Initializing,
        ExecMode::Running,
        ExecMode::Frozen,
        ExecMode::Restoring,
        ExecMode::ShuttingDown,
        ExecMode::Terminated,
    ];

    /// Lowercase mode name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Frozen => "frozen",
            Self::Restoring => "restoring",
            Self::ShuttingDown => "shutting_down",
            Self::Terminated => "terminated",
        }
    }

    /// Stable numeric tag used in snapshots.
    pub fn tag(self) -> u8 {
        Self::ALL.iter().position(|m| *m == self).unwrap_or(0) as u8
    }

    /// Inverse of [`tag`](Self::tag).
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of [`Executive::run`].
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// Running frames executed over the executive's lifetime.
    pub frames: u64,
    /// Final simulation time in seconds.
    pub time: f64,
    /// Frame counter at termination.
    pub frame: FrameId,
    /// Real-time overruns counted.
    pub overruns: u64,
    /// Largest real-time lag seen.
    pub max_lag: Duration,
}

// ── Executive ──────────────────────────────────────────────────────

/// A simulation executive.
///
/// Built from a validated [`SimConfig`]. Drive it frame by frame with
/// [`step_frame()`](Self::step_frame), or to completion with
/// [`run()`](Self::run).
///
/// # Examples
///
/// ```
/// use cadence_core::StateDef;
/// use cadence_engine::{ExecMode, Executive, LoopDef, SimConfig};
/// use cadence_integ::IntegratorKind;
/// use cadence_job::derivative_fn;
///
/// let config = SimConfig::new(0.1)
///     .state(StateDef::first_order("x", vec![1.0]))
///     .integration_loop(LoopDef::new("main", 0.01, IntegratorKind::Rk4).state("x"))
///     .derivative("decay", "x", derivative_fn(|v, d| {
///         d[0] = -v.own()[0];
///         Ok(())
///     }))
///     .stop_at(1.0);
///
/// let mut exec = Executive::new(config).unwrap();
/// exec.run().unwrap();
/// assert_eq!(exec.mode(), ExecMode::Terminated);
/// let x = exec.state("x").unwrap()[0];
/// assert!((x - (-1.0f64).exp()).abs() < 1e-9);
/// ```
pub struct Executive {
    pub(crate) base: TimeBase,
    pub(crate) frame: Frame,
    pub(crate) fingerprint: u64,
    pub(crate) stop_time: Option<f64>,
    pub(crate) start_frozen: bool,
    pub(crate) max_firings: u32,
    pub(crate) mode: ExecMode,
    pub(crate) pending_steps: u64,
    pub(crate) store: StateStore,
    pub(crate) registry: JobRegistry,
    pub(crate) loops: LoopArena,
    pub(crate) events: EventTable,
    pub(crate) requests: Requests,
    pub(crate) realtime: RealtimeSync,
    pub(crate) clock: Box<dyn WallClock>,
    pub(crate) control: ControlQueue,
    pub(crate) telemetry: FrameTelemetry,
    pub(crate) sink: Box<dyn TelemetrySink>,
    pub(crate) failure: Option<ExecError>,
    pub(crate) fault: Option<ExecError>,
    pub(crate) frames_run: u64,
}

impl Executive {
    /// Build an executive paced by the system clock.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, SystemClock::new())
    }

    /// Build an executive paced by `clock`.
    pub fn with_clock(
        config: SimConfig,
        clock: impl WallClock + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let base = config.resolved_time_base()?;
        let fingerprint = config.fingerprint();
        let frame_tics = base
            .to_tics(config.frame_seconds)
            .ok_or_else(|| ConfigError::InvalidFrame {
                reason: format!("frame of {}s does not resolve to tics", config.frame_seconds),
            })?;

        let SimConfig {
            stop_time,
            start_frozen,
            states,
            loops: loop_defs,
            derivatives,
            jobs,
            events: event_defs,
            realtime,
            limits,
            ..
        } = config;

        let store = StateStore::from_defs(&states);
        let mut registry = JobRegistry::new(frame_tics);

        // One derivative job per integrated state vector.
        let mut deriv_slots: Vec<(String, DerivSlot)> = Vec::with_capacity(derivatives.len());
        for def in derivatives {
            let mut spec = JobSpec::new(def.name.clone(), JobClass::Derivative)
                .owner(def.state.clone())
                .phase(def.phase);
            if let Some(policy) = def.policy {
                spec = spec.policy(policy);
            }
            let job = registry.register(
                spec,
                JobBody::Derivative(def.job.clone()),
                SimTime::ZERO,
            )?;
            deriv_slots.push((
                def.state,
                DerivSlot {
                    job,
                    name: def.name,
                    eval: def.job,
                },
            ));
        }

        // Loops, parents before children.
        let mut arena = LoopArena::default();
        let mut steps: Vec<SimTime> = Vec::with_capacity(loop_defs.len());
        for (index, def) in loop_defs.into_iter().enumerate() {
            let dt = base.to_tics(def.dt).ok_or_else(|| ConfigError::InvalidStep {
                loop_name: def.name.clone(),
                dt: def.dt,
            })?;
            let parent = match &def.parent {
                Some(name) => Some(arena.find(name).ok_or_else(|| ConfigError::UnknownLoop {
                    name: name.clone(),
                    referenced_by: def.name.clone(),
                })?),
                None => None,
            };
            let outer = parent.map_or(frame_tics, |p| steps[p.0 as usize]);
            let ratio = (outer.tics() / dt.tics()) as u32;

            let mut layout = StateLayout::new();
            let mut segments = Vec::with_capacity(def.states.len());
            let mut derivs = Vec::with_capacity(def.states.len());
            for name in &def.states {
                let unknown = || ConfigError::UnknownState {
                    name: name.clone(),
                    referenced_by: def.name.clone(),
                };
                let id = store.find(name).ok_or_else(unknown)?;
                let vector = store.get(id).ok_or_else(unknown)?;
                let entry = layout.push(id, name.clone(), vector.len());
                segments.push(Segment {
                    offset: layout.entries()[entry].offset,
                    len: vector.len(),
                    second_order: vector.order() == cadence_core::Order::Second,
                });
                let slot = deriv_slots
                    .iter()
                    .position(|(state, _)| state == name)
                    .map(|i| deriv_slots.swap_remove(i).1)
                    .ok_or_else(|| ConfigError::MissingDerivative {
                        state: name.clone(),
                    })?;
                derivs.push(slot);
            }
            let integrator = cadence_integ::Integrator::new(def.integrator, segments, def.adaptive)
                .map_err(|error| ConfigError::Integrator {
                    loop_name: def.name.clone(),
                    error,
                })?;
            arena.push(IntegLoop::new(
                LoopParts {
                    id: LoopId(index as u32),
                    name: def.name,
                    base,
                    dt,
                    parent,
                    ratio,
                    integrator,
                    layout,
                    derivs,
                    parallel: def.parallel_derivatives,
                },
                &store,
            ));
            steps.push(dt);
        }

        // Tasks. Integration jobs become post-step hooks of their loop.
        for def in jobs {
            let hook = hook_loop(&arena, &def.spec)?;
            let id = registry.register(def.spec, JobBody::Task(def.job), SimTime::ZERO)?;
            if let Some(lp) = hook.and_then(|l| arena.get_mut(l)) {
                lp.add_hook(id);
            }
        }

        // Events, checked by the loop that integrates their state.
        let mut events = EventTable::default();
        for (index, def) in event_defs.into_iter().enumerate() {
            let detector = def.detector();
            let state = store.find(&def.state).ok_or_else(|| ConfigError::UnknownState {
                name: def.state.clone(),
                referenced_by: def.name.clone(),
            })?;
            let (loop_id, entry) = arena
                .iter()
                .find_map(|lp| lp.layout().position(state).map(|e| (lp.id(), e)))
                .ok_or_else(|| ConfigError::UnboundState {
                    state: def.state.clone(),
                    referenced_by: def.name.clone(),
                })?;
            events.push(EventSlot {
                id: EventId(index as u32),
                name: def.name,
                state,
                loop_id,
                entry,
                condition: def.condition,
                handler: def.handler,
                direction: def.direction,
                detector,
                policy: def.policy,
                enabled: def.enabled,
                degraded: false,
                last_value: None,
                fire_count: 0,
                last_fired: None,
            });
            if let Some(lp) = arena.get_mut(loop_id) {
                lp.add_event(index);
            }
        }

        tracing::debug!(
            states = store.len(),
            loops = arena.len(),
            jobs = registry.len(),
            events = events.len(),
            fingerprint = %format!("{fingerprint:#018x}"),
            "executive built"
        );

        Ok(Self {
            base,
            frame: Frame::new(frame_tics),
            fingerprint,
            stop_time,
            start_frozen,
            max_firings: limits.max_event_firings_per_step,
            mode: ExecMode::Initializing,
            pending_steps: 0,
            store,
            registry,
            loops: arena,
            events,
            requests: Requests::default(),
            realtime: RealtimeSync::new(realtime.enabled, realtime.ratio, realtime.policy),
            clock: Box::new(clock),
            control: ControlQueue::new(limits.control_queue_capacity),
            telemetry: FrameTelemetry::new(FrameId(0), 0.0, ExecMode::Initializing),
            sink: Box::new(NullSink),
            failure: None,
            fault: None,
            frames_run: 0,
        })
    }

    /// Send per-frame telemetry to `sink` from now on.
    pub fn set_telemetry(&mut self, sink: impl TelemetrySink + 'static) {
        self.sink = Box::new(sink);
    }

    /// Register a task job.
    ///
    /// Before [`initialize()`](Self::initialize) completes any job is
    /// accepted; afterwards only jobs whose spec is marked dynamic.
    /// Integration jobs name their loop as owner.
    pub fn register_job(
        &mut self,
        spec: JobSpec,
        job: impl Job + 'static,
    ) -> Result<JobId, ConfigError> {
        if matches!(self.mode, ExecMode::ShuttingDown | ExecMode::Terminated) {
            return Err(RegistrationError::Late { job: spec.name }.into());
        }
        let hook = hook_loop(&self.loops, &spec)?;
        let name = spec.name.clone();
        let class = spec.class;
        let id = self
            .registry
            .register(spec, JobBody::Task(Box::new(job)), self.frame.start())?;
        if let Some(lp) = hook.and_then(|l| self.loops.get_mut(l)) {
            lp.add_hook(id);
        }
        tracing::debug!(job = %name, %class, id = %id, "job registered");
        Ok(id)
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Run initialization jobs and enter `Running`, or `Frozen` when the
    /// configuration starts frozen.
    ///
    /// Called implicitly by the first [`step_frame()`](Self::step_frame).
    /// Emits one telemetry record.
    pub fn initialize(&mut self) -> Result<(), ExecError> {
        if self.mode != ExecMode::Initializing {
            return Err(ExecError::InvalidMode {
                operation: "initialize",
                mode: self.mode.name(),
            });
        }
        tracing::info!(
            states = self.store.len(),
            loops = self.loops.len(),
            jobs = self.registry.len(),
            events = self.events.len(),
            "initializing"
        );
        let started = Instant::now();
        self.telemetry = FrameTelemetry::new(self.frame.counter(), self.time(), self.mode);
        let result = self.initialize_inner();
        if let Err(e) = &result {
            self.fail(e.clone());
        }
        self.telemetry.metrics.total_us = started.elapsed().as_micros() as u64;
        self.emit();
        result
    }

    fn initialize_inner(&mut self) -> Result<(), ExecError> {
        let now = self.frame.start();
        let mut env = frame_env!(self);
        env.run_class(JobClass::Initialization, now, now)?;
        for lp in self.loops.iter_mut() {
            lp.sync(env.store);
            lp.prime_events(env.store, env.events);
        }
        self.loops.refresh_derivs(&mut env)?;
        self.registry.seal();

        self.mode = ExecMode::Running;
        tracing::info!(time = self.time(), "running");
        if self.start_frozen {
            self.enter_freeze()?;
        }
        self.honor_requests()?;
        let now = self.time();
        self.realtime.rebase(&*self.clock, now);
        Ok(())
    }

    /// Execute one frame boundary and whatever the mode calls for:
    /// a running frame, a frozen frame, or teardown.
    ///
    /// Returns the mode after the frame. A fatal error moves the
    /// executive to `ShuttingDown`, is returned once, and is kept in
    /// [`failure()`](Self::failure); the next call runs the shutdown
    /// jobs.
    pub fn step_frame(&mut self) -> Result<ExecMode, ExecError> {
        match self.mode {
            ExecMode::Terminated => return Err(ExecError::Terminated),
            ExecMode::Initializing => self.initialize()?,
            _ => {}
        }
        let started = Instant::now();
        self.telemetry = FrameTelemetry::new(self.frame.counter(), self.time(), self.mode);
        let result = self.frame_inner();
        if let Err(e) = &result {
            self.fail(e.clone());
        }
        self.telemetry.metrics.total_us = started.elapsed().as_micros() as u64;
        self.emit();
        result.map(|()| self.mode)
    }

    fn frame_inner(&mut self) -> Result<(), ExecError> {
        self.apply_controls()?;
        self.honor_requests()?;
        if matches!(self.mode, ExecMode::Running | ExecMode::Frozen) && self.stop_reached() {
            tracing::info!(time = self.time(), "stop time reached");
            self.mode = ExecMode::ShuttingDown;
        }
        match self.mode {
            ExecMode::Running => {
                self.run_frame()?;
                self.honor_requests()
            }
            ExecMode::Frozen => {
                self.run_transition(JobClass::Freeze)?;
                self.honor_requests()
            }
            ExecMode::ShuttingDown => {
                self.shutdown();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn run_frame(&mut self) -> Result<(), ExecError> {
        let start = self.frame.start();
        let end = self.frame.end();
        let mut env = frame_env!(self);
        for class in [
            JobClass::TopOfFrame,
            JobClass::Environment,
            JobClass::DynamicEvent,
        ] {
            env.run_class(class, start, start)?;
        }
        self.loops.advance_frame(&mut env, end)?;
        for class in [JobClass::Scheduled, JobClass::Log, JobClass::EndOfFrame] {
            env.run_class(class, start, end)?;
        }
        // Leave every loop buffer equal to the store at the boundary.
        self.loops.settle(env.store, env.events);
        self.loops.refresh_derivs(&mut env)?;

        self.frame.advance();
        self.frames_run += 1;
        tracing::debug!(frame = %self.frame.counter(), time = self.time(), "frame complete");
        if self.pending_steps > 0 {
            self.pending_steps -= 1;
            if self.pending_steps == 0 {
                tracing::info!(frame = %self.frame.counter(), "single-step complete");
                self.mode = ExecMode::Frozen;
            }
        }

        let now = self.time();
        let waited = Instant::now();
        let outcome = self.realtime.sync_frame(&mut *self.clock, now);
        self.telemetry.overrun = outcome.overrun;
        self.telemetry.lag = outcome.lag.as_secs_f64();
        self.telemetry.metrics.sync_wait_us = waited.elapsed().as_micros() as u64;
        Ok(())
    }

    /// Run a non-frame class at the current boundary.
    pub(crate) fn run_transition(&mut self, class: JobClass) -> Result<(), ExecError> {
        let now = self.frame.start();
        let mut env = frame_env!(self);
        env.run_class(class, now, now)?;
        self.loops.settle(env.store, env.events);
        Ok(())
    }

    fn shutdown(&mut self) {
        tracing::info!(frame = %self.frame.counter(), time = self.time(), "shutting down");
        if let Err(e) = self.run_transition(JobClass::Shutdown) {
            tracing::error!(error = %e, "shutdown job failed");
            if self.failure.is_none() {
                self.failure = Some(e);
            }
        }
        self.mode = ExecMode::Terminated;
        let rejected = self.control.close();
        if rejected > 0 {
            tracing::warn!(rejected, "control commands rejected at termination");
        }
        tracing::info!(frames = self.frames_run, "terminated");
    }

    pub(crate) fn fail(&mut self, error: ExecError) {
        tracing::error!(frame = %self.frame.counter(), error = %error, "fatal error");
        if self.failure.is_none() {
            self.failure = Some(error);
        }
        self.pending_steps = 0;
        if self.mode != ExecMode::Terminated {
            self.mode = ExecMode::ShuttingDown;
        }
    }

    fn emit(&mut self) {
        self.telemetry.frame = self.frame.counter();
        self.telemetry.time = self.time();
        self.telemetry.mode = self.mode;
        self.sink.record(&self.telemetry);
    }

    fn stop_reached(&self) -> bool {
        let half_tic = 0.5 / self.base.tics_per_second() as f64;
        self.stop_time.is_some_and(|stop| self.time() + half_tic >= stop)
    }

    fn honor_requests(&mut self) -> Result<(), ExecError> {
        let requests = std::mem::take(&mut self.requests);
        if matches!(self.mode, ExecMode::ShuttingDown | ExecMode::Terminated) {
            return Ok(());
        }
        if requests.shutdown {
            tracing::info!(frame = %self.frame.counter(), "shutdown requested by a job");
            self.mode = ExecMode::ShuttingDown;
        } else if requests.freeze && self.mode == ExecMode::Running {
            tracing::info!(frame = %self.frame.counter(), "freeze requested by a job");
            if self.pending_steps > 0 {
                self.pending_steps = 0;
                self.mode = ExecMode::Frozen;
            } else {
                self.enter_freeze()?;
            }
        }
        Ok(())
    }

    fn enter_freeze(&mut self) -> Result<(), ExecError> {
        tracing::info!(frame = %self.frame.counter(), time = self.time(), "freeze");
        self.mode = ExecMode::Frozen;
        self.run_transition(JobClass::FreezeInit)
    }

    fn leave_freeze(&mut self) -> Result<(), ExecError> {
        tracing::info!(frame = %self.frame.counter(), time = self.time(), "resume");
        self.pending_steps = 0;
        self.run_transition(JobClass::Unfreeze)?;
        self.mode = ExecMode::Running;
        let now = self.time();
        self.realtime.rebase(&*self.clock, now);
        Ok(())
    }

    /// Drive frames until the executive terminates.
    ///
    /// While frozen, waits on the control queue for up to one
    /// frame period between frozen frames. Returns the first fatal error
    /// if the run ended because of one.
    pub fn run(&mut self) -> Result<RunSummary, ExecError> {
        let mut first = None;
        if self.mode == ExecMode::Initializing {
            if let Err(e) = self.initialize() {
                first = Some(e);
            }
        }
        while self.mode != ExecMode::Terminated {
            if self.mode == ExecMode::Frozen {
                let period = self.frozen_period();
                self.control.wait(period);
            }
            if let Err(e) = self.step_frame() {
                if first.is_none() {
                    first = Some(e);
                }
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(self.summary()),
        }
    }

    fn frozen_period(&self) -> Duration {
        let seconds = self.base.seconds(self.frame.duration()) / self.realtime.ratio();
        Duration::from_secs_f64(seconds)
    }

    /// Counters for the run so far.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            frames: self.frames_run,
            time: self.time(),
            frame: self.frame.counter(),
            overruns: self.realtime.overruns(),
            max_lag: self.realtime.max_lag(),
        }
    }

    // ── Control ────────────────────────────────────────────────────

    /// A handle for posting control commands from any thread.
    pub fn control_handle(&self) -> ControlHandle {
        self.control.handle()
    }

    /// Queue a command for the next frame boundary. Its receipt appears
    /// in that frame's telemetry.
    pub fn post(&self, command: ControlCommand) -> Result<u64, ControlError> {
        self.control.handle().post(command)
    }

    fn apply_controls(&mut self) -> Result<(), ExecError> {
        let started = Instant::now();
        for envelope in self.control.drain() {
            let seq = envelope.seq;
            let receipt = match self.apply(&envelope.command) {
                Ok(()) => {
                    tracing::debug!(seq, command = envelope.command.name(), "control command applied");
                    Receipt::applied(seq, self.frame.counter())
                }
                Err(reason) => {
                    tracing::warn!(seq, command = envelope.command.name(), %reason, "control command rejected");
                    Receipt::rejected(seq, reason)
                }
            };
            self.telemetry.receipts.push(receipt.clone());
            envelope.answer(receipt);
        }
        self.telemetry.metrics.control_us = started.elapsed().as_micros() as u64;
        match self.fault.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn apply(&mut self, command: &ControlCommand) -> Result<(), ControlError> {
        if self.fault.is_some()
            || matches!(self.mode, ExecMode::ShuttingDown | ExecMode::Terminated)
        {
            return Err(ControlError::ShuttingDown);
        }
        let stepping = self.pending_steps > 0;
        match command {
            ControlCommand::Freeze => match self.mode {
                ExecMode::Running if stepping => {
                    self.pending_steps = 0;
                    self.mode = ExecMode::Frozen;
                }
                ExecMode::Running => {
                    if let Err(e) = self.enter_freeze() {
                        self.fault = Some(e);
                    }
                }
                _ => return Err(ControlError::InvalidTransition),
            },
            ControlCommand::Resume => {
                if self.mode != ExecMode::Frozen && !stepping {
                    return Err(ControlError::InvalidTransition);
                }
                if let Err(e) = self.leave_freeze() {
                    self.fault = Some(e);
                }
            }
            ControlCommand::Step { frames } => {
                if self.mode != ExecMode::Frozen || *frames == 0 {
                    return Err(ControlError::InvalidTransition);
                }
                self.pending_steps = u64::from(*frames);
                self.mode = ExecMode::Running;
                let now = self.time();
                self.realtime.rebase(&*self.clock, now);
            }
            ControlCommand::Shutdown => {
                tracing::info!(frame = %self.frame.counter(), "shutdown commanded");
                self.mode = ExecMode::ShuttingDown;
            }
            ControlCommand::SetRealtimeRatio { ratio } => {
                if !(ratio.is_finite() && *ratio > 0.0) {
                    return Err(ControlError::InvalidRatio);
                }
                let now = self.time();
                self.realtime.set_ratio(*ratio, &*self.clock, now);
            }
            ControlCommand::SetCycle { job, cycle } => {
                self.registry.set_cycle(*job, *cycle).map_err(control_reason)?;
            }
            ControlCommand::EnableJob { job } => {
                self.registry.enable(*job).map_err(control_reason)?;
            }
            ControlCommand::DisableJob { job } => {
                self.registry.disable(*job).map_err(control_reason)?;
            }
            ControlCommand::EnableEvent { event } => {
                if !self.events.enable(*event) {
                    return Err(ControlError::UnknownTarget);
                }
            }
            ControlCommand::DisableEvent { event } => {
                if !self.events.disable(*event) {
                    return Err(ControlError::UnknownTarget);
                }
            }
        }
        Ok(())
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Current mode.
    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    /// Completed frames.
    pub fn frame(&self) -> FrameId {
        self.frame.counter()
    }

    /// Simulation time at the current frame boundary.
    pub fn sim_time(&self) -> SimTime {
        self.frame.start()
    }

    /// Simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.base.seconds(self.frame.start())
    }

    /// The time base.
    pub fn time_base(&self) -> TimeBase {
        self.base
    }

    /// Frame duration in tics.
    pub fn frame_duration(&self) -> SimTime {
        self.frame.duration()
    }

    /// Hash of the configuration this executive was built from.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Frames still to run from a single-step command.
    pub fn pending_steps(&self) -> u64 {
        self.pending_steps
    }

    /// The fatal error that ended the run, if any.
    pub fn failure(&self) -> Option<&ExecError> {
        self.failure.as_ref()
    }

    /// Telemetry of the most recent frame.
    pub fn last_frame(&self) -> &FrameTelemetry {
        &self.telemetry
    }

    /// Every state vector.
    pub fn states(&self) -> &StateStore {
        &self.store
    }

    /// Values of the named state vector.
    pub fn state(&self, name: &str) -> Option<&[f64]> {
        let id = self.store.find(name)?;
        self.store.get(id).map(|v| v.values())
    }

    /// Derivatives of the named state vector at the current boundary.
    pub fn derivs(&self, name: &str) -> Option<&[f64]> {
        let id = self.store.find(name)?;
        self.store.get(id).map(|v| v.derivs())
    }

    /// Mutable values of the named state vector.
    ///
    /// Changes are picked up by the owning loop at its next step, as a
    /// discontinuity: multistep history restarts and event reference
    /// values are re-evaluated, so no crossing is reported for the jump.
    pub fn state_mut(&mut self, name: &str) -> Option<&mut [f64]> {
        let id = self.store.find(name)?;
        self.store.get_mut(id).map(|v| v.values_mut())
    }

    /// Look up a job by name.
    pub fn job_id(&self, name: &str) -> Option<JobId> {
        self.registry.find(name)
    }

    /// A job's registry entry.
    pub fn job(&self, id: JobId) -> Option<&JobEntry> {
        self.registry.get(id)
    }

    /// The job registry.
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Look up an event by name.
    pub fn event_id(&self, name: &str) -> Option<EventId> {
        self.events.find(name)
    }

    /// An event's status.
    pub fn event(&self, id: EventId) -> Option<EventStatus> {
        self.events.get(id).map(EventSlot::status)
    }

    /// Every event's status, in ID order.
    pub fn events(&self) -> Vec<EventStatus> {
        self.events.iter().map(EventSlot::status).collect()
    }

    /// Look up a loop by name.
    pub fn loop_id(&self, name: &str) -> Option<LoopId> {
        self.loops.find(name)
    }

    /// A loop's status.
    pub fn integration_loop(&self, id: LoopId) -> Option<LoopStatus> {
        self.loops.get(id).map(IntegLoop::status)
    }

    /// Every loop's status, in ID order.
    pub fn loops(&self) -> Vec<LoopStatus> {
        self.loops.iter().map(IntegLoop::status).collect()
    }

    /// The real-time synchronizer.
    pub fn realtime(&self) -> &RealtimeSync {
        &self.realtime
    }

    /// Real-time overruns counted so far.
    pub fn overruns(&self) -> u64 {
        self.realtime.overruns()
    }
}

impl fmt::Debug for Executive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executive")
            .field("mode", &self.mode)
            .field("frame", &self.frame.counter())
            .field("time", &self.time())
            .field("jobs", &self.registry.len())
            .field("loops", &self.loops.len())
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}

/// The loop an integration job hooks into, or `None` for other classes.
fn hook_loop(arena: &LoopArena, spec: &JobSpec) -> Result<Option<LoopId>, ConfigError> {
    match spec.class {
        JobClass::Derivative => Err(ConfigError::InvalidJob {
            job: spec.name.clone(),
            reason: "derivative jobs are declared per state vector".into(),
        }),
        JobClass::Integration => {
            let owner = spec.owner.clone().unwrap_or_default();
            arena
                .find(&owner)
                .map(Some)
                .ok_or_else(|| ConfigError::UnknownLoop {
                    name: owner,
                    referenced_by: spec.name.clone(),
                })
        }
        _ => Ok(None),
    }
}

fn control_reason(e: RegistrationError) -> ControlError {
    match e {
        RegistrationError::UnknownJob { .. } => ControlError::UnknownTarget,
        RegistrationError::NotFrameScheduled { .. } => ControlError::NotFrameScheduled,
        RegistrationError::MalformedCycle { .. } => ControlError::MalformedCycle,
        RegistrationError::Duplicate { .. } | RegistrationError::Late { .. } => {
            ControlError::InvalidTransition
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{Cycle, StateDef};
    use cadence_integ::IntegratorKind;
    use cadence_job::derivative_fn;
    use cadence_test_utils::{CountingJob, DecayDerivative, RecordingJob, SharedLog};
    use std::sync::atomic::Ordering;

    use crate::config::LoopDef;

    fn decay_config() -> SimConfig {
        SimConfig::new(0.1)
            .state(StateDef::first_order("x", vec![1.0]))
            .integration_loop(LoopDef::new("main", 0.01, IntegratorKind::Rk4).state("x"))
            .derivative("decay", "x", DecayDerivative { rate: 1.0 })
    }

    #[test]
    fn mode_tags_round_trip() {
        for mode in ExecMode::ALL {
            assert_eq!(ExecMode::from_tag(mode.tag()), Some(mode));
        }
        assert_eq!(ExecMode::from_tag(99), None);
        assert_eq!(ExecMode::ShuttingDown.to_string(), "shutting_down");
    }

    #[test]
    fn first_step_initializes() {
        let mut exec = Executive::new(decay_config()).unwrap();
        assert_eq!(exec.mode(), ExecMode::Initializing);
        assert_eq!(exec.step_frame(), Ok(ExecMode::Running));
        assert_eq!(exec.frame(), FrameId(1));
        assert!((exec.time() - 0.1).abs() < 1e-12);
        assert_eq!(exec.initialize(), Err(ExecError::InvalidMode {
            operation: "initialize",
            mode: "running",
        }));
    }

    #[test]
    fn derivatives_are_current_at_the_boundary() {
        let mut exec = Executive::new(decay_config()).unwrap();
        exec.initialize().unwrap();
        assert_eq!(exec.derivs("x"), Some(&[-1.0][..]));
        exec.step_frame().unwrap();
        let x = exec.state("x").unwrap()[0];
        assert_eq!(exec.derivs("x").unwrap()[0], -x);
    }

    #[test]
    fn frame_classes_run_in_order() {
        let log = SharedLog::new();
        let mut config = decay_config();
        for (name, class) in [
            ("eof", JobClass::EndOfFrame),
            ("log", JobClass::Log),
            ("sched", JobClass::Scheduled),
            ("dyn", JobClass::DynamicEvent),
            ("env", JobClass::Environment),
            ("top", JobClass::TopOfFrame),
        ] {
            config = config.job(JobSpec::new(name, class), RecordingJob::new(name, &log));
        }
        let mut exec = Executive::new(config).unwrap();
        exec.step_frame().unwrap();
        assert_eq!(
            log.lines(),
            vec!["top@0", "env@0", "dyn@0", "sched@0", "log@0", "eof@0"]
        );
    }

    #[test]
    fn late_registration_needs_dynamic_spec() {
        let mut exec = Executive::new(decay_config()).unwrap();
        exec.initialize().unwrap();
        let err = exec
            .register_job(JobSpec::new("late", JobClass::Scheduled), CountingJob::new("late"))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Registration(RegistrationError::Late { .. })
        ));
        let job = CountingJob::new("dynamic");
        let count = job.counter();
        exec.register_job(JobSpec::new("dynamic", JobClass::Scheduled).dynamic(), job)
            .unwrap();
        exec.step_frame().unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn cycle_controls_job_rate() {
        let job = CountingJob::new("slow");
        let count = job.counter();
        let config = decay_config().job(
            JobSpec::new("slow", JobClass::Scheduled).cycle(Cycle::frames(3)),
            job,
        );
        let mut exec = Executive::new(config).unwrap();
        for _ in 0..9 {
            exec.step_frame().unwrap();
        }
        assert_eq!(count.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn stop_time_terminates_at_a_boundary() {
        let mut exec = Executive::new(decay_config().stop_at(0.3)).unwrap();
        let summary = exec.run().unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.frame, FrameId(3));
        assert_eq!(exec.mode(), ExecMode::Terminated);
        assert_eq!(exec.step_frame(), Err(ExecError::Terminated));
    }

    #[test]
    fn closure_derivatives_are_accepted() {
        let config = SimConfig::new(0.5)
            .state(StateDef::first_order("v", vec![0.0]))
            .integration_loop(LoopDef::new("main", 0.5, IntegratorKind::Euler).state("v"))
            .derivative(
                "accel",
                "v",
                derivative_fn(|_, d| {
                    d[0] = 2.0;
                    Ok(())
                }),
            );
        let mut exec = Executive::new(config).unwrap();
        exec.step_frame().unwrap();
        assert_eq!(exec.state("v"), Some(&[1.0][..]));
    }
}
