//! Simulation configuration, validation, and error types.
//!
//! [`SimConfig`] is the builder input for constructing an
//! [`Executive`](crate::Executive). [`validate()`](SimConfig::validate)
//! checks every structural invariant before anything is built, so a bad
//! configuration never reaches `Running`.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use cadence_core::{Cycle, SimTime, StateDef, TimeBase};
use cadence_event::{Direction, EventDetector};
use cadence_integ::{AdaptiveConfig, IntegError, IntegratorKind};
use cadence_job::{
    DerivativeJob, EventCondition, Job, JobClass, JobSpec, RegistrationError, ReturnPolicy,
};
use cadence_snapshot::Fnv1a;
use indexmap::IndexMap;

use crate::realtime::OverrunPolicy;

// ── Loop, derivative, job and event declarations ─────────────────

/// Declaration of an integration loop.
#[derive(Clone, Debug)]
pub struct LoopDef {
    /// Unique loop name.
    pub name: String,
    /// Step size in seconds. Must be a whole number of tics and divide
    /// the frame (root loops) or the parent step (child loops) exactly.
    pub dt: f64,
    /// Integration strategy.
    pub integrator: IntegratorKind,
    /// Parent loop, for a multi-rate child.
    pub parent: Option<String>,
    /// State vectors integrated by this loop, in layout order.
    pub states: Vec<String>,
    /// Error control for adaptive strategies.
    pub adaptive: AdaptiveConfig,
    /// Evaluate the derivatives of different vectors on the rayon pool.
    pub parallel_derivatives: bool,
}

impl LoopDef {
    /// A root loop stepping every `dt` seconds with `integrator`.
    pub fn new(name: impl Into<String>, dt: f64, integrator: IntegratorKind) -> Self {
        Self {
            name: name.into(),
            dt,
            integrator,
            parent: None,
            states: Vec::new(),
            adaptive: AdaptiveConfig::default(),
            parallel_derivatives: false,
        }
    }

    /// Integrate `state` in this loop.
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.states.push(state.into());
        self
    }

    /// Nest this loop under `parent`.
    pub fn child_of(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Replace the adaptive error control settings.
    pub fn adaptive(mut self, adaptive: AdaptiveConfig) -> Self {
        self.adaptive = adaptive;
        self
    }

    /// Evaluate derivatives in parallel.
    pub fn parallel(mut self) -> Self {
        self.parallel_derivatives = true;
        self
    }
}

/// Derivative job bound to one state vector.
#[derive(Clone)]
pub struct DerivativeDef {
    /// Job name.
    pub name: String,
    /// The state vector whose derivative this computes.
    pub state: String,
    /// Ordering within the derivative class.
    pub phase: u32,
    /// Always fatal; `Some(Degraded)` is rejected.
    pub policy: Option<ReturnPolicy>,
    /// The evaluation.
    pub job: Arc<dyn DerivativeJob>,
}

impl fmt::Debug for DerivativeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivativeDef")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("phase", &self.phase)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// A task job with its scheduling spec.
///
/// `Integration` class jobs name their loop as the spec's owner and run
/// after every step of that loop.
pub struct JobDef {
    /// Scheduling metadata.
    pub spec: JobSpec,
    /// The work.
    pub job: Box<dyn Job>,
}

impl fmt::Debug for JobDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDef")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// A monitored condition on a state vector's loop.
///
/// The event belongs to the loop that integrates `state`; its condition
/// sees `state` as its own vector.
pub struct EventDef {
    /// Unique event name.
    pub name: String,
    /// Vector the condition is evaluated for.
    pub state: String,
    /// The condition.
    pub condition: Arc<dyn EventCondition>,
    /// Job triggered at each crossing.
    pub handler: Option<Box<dyn Job>>,
    /// Which sign changes count.
    pub direction: Direction,
    /// Crossing time tolerance in seconds. Default: 1e-9.
    pub tolerance: f64,
    /// Root-finding iteration limit. Default: 100.
    pub max_iterations: u32,
    /// What a handler failure does. Default: degraded.
    pub policy: ReturnPolicy,
    /// Armed from the start.
    pub enabled: bool,
}

impl EventDef {
    /// An event on `state` with default detection settings.
    pub fn new(
        name: impl Into<String>,
        state: impl Into<String>,
        condition: impl EventCondition + 'static,
    ) -> Self {
        let detector = EventDetector::default();
        Self {
            name: name.into(),
            state: state.into(),
            condition: Arc::new(condition),
            handler: None,
            direction: Direction::Either,
            tolerance: detector.tolerance,
            max_iterations: detector.max_iterations,
            policy: ReturnPolicy::Degraded,
            enabled: true,
        }
    }

    /// Run `job` at every crossing.
    pub fn handler(mut self, job: impl Job + 'static) -> Self {
        self.handler = Some(Box::new(job));
        self
    }

    /// Only fire on crossings in `direction`.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Crossing time tolerance in seconds.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Root-finding iteration limit.
    pub fn max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n;
        self
    }

    /// Handler failure policy.
    pub fn policy(mut self, policy: ReturnPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start disarmed.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub(crate) fn detector(&self) -> EventDetector {
        EventDetector::new(self.tolerance, self.max_iterations)
    }
}

impl fmt::Debug for EventDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDef")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("direction", &self.direction)
            .field("tolerance", &self.tolerance)
            .field("max_iterations", &self.max_iterations)
            .field("policy", &self.policy)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

// ── RealtimeConfig ───────────────────────────────────────────────

/// Wall-clock pacing.
#[derive(Clone, Debug, PartialEq)]
pub struct RealtimeConfig {
    /// Pace frames against the wall clock. Default: false.
    pub enabled: bool,
    /// Simulated seconds per wall-clock second. Default: 1.0.
    pub ratio: f64,
    /// What to do with the schedule after an overrun. Default: catch up.
    pub policy: OverrunPolicy,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ratio: 1.0,
            policy: OverrunPolicy::CatchUp,
        }
    }
}

// ── ExecLimits ───────────────────────────────────────────────────

/// Run-time limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecLimits {
    /// Event firings allowed in one loop step before the run is stopped
    /// as an event storm. Default: 64.
    pub max_event_firings_per_step: u32,
    /// Control commands buffered between frame boundaries. Default: 64.
    pub control_queue_capacity: usize,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            max_event_firings_per_step: 64,
            control_queue_capacity: 64,
        }
    }
}

// ── SimConfig ────────────────────────────────────────────────────

/// Everything needed to build an executive.
///
/// # Examples
///
/// ```
/// use cadence_core::StateDef;
/// use cadence_engine::{LoopDef, SimConfig};
/// use cadence_integ::IntegratorKind;
/// use cadence_job::derivative_fn;
///
/// let config = SimConfig::new(0.1)
///     .state(StateDef::first_order("x", vec![1.0]))
///     .integration_loop(LoopDef::new("main", 0.01, IntegratorKind::Rk4).state("x"))
///     .derivative("decay", "x", derivative_fn(|v, d| {
///         d[0] = -v.own()[0];
///         Ok(())
///     }));
///
/// assert!(config.validate().is_ok());
/// ```
pub struct SimConfig {
    /// Tics per simulated second. Default: 1 000 000.
    pub tics_per_second: i64,
    /// Frame duration in seconds.
    pub frame_seconds: f64,
    /// Terminate at the first frame boundary at or after this time.
    pub stop_time: Option<f64>,
    /// Enter freeze right after initialization.
    pub start_frozen: bool,
    /// State vectors, in ID order.
    pub states: Vec<StateDef>,
    /// Integration loops. Parents must precede their children.
    pub loops: Vec<LoopDef>,
    /// One derivative per integrated state vector.
    pub derivatives: Vec<DerivativeDef>,
    /// Task jobs.
    pub jobs: Vec<JobDef>,
    /// Monitored events.
    pub events: Vec<EventDef>,
    /// Wall-clock pacing.
    pub realtime: RealtimeConfig,
    /// Run-time limits.
    pub limits: ExecLimits,
}

impl SimConfig {
    /// Empty configuration with the given frame duration in seconds.
    pub fn new(frame_seconds: f64) -> Self {
        Self {
            tics_per_second: TimeBase::DEFAULT_TICS_PER_SECOND,
            frame_seconds,
            stop_time: None,
            start_frozen: false,
            states: Vec::new(),
            loops: Vec::new(),
            derivatives: Vec::new(),
            jobs: Vec::new(),
            events: Vec::new(),
            realtime: RealtimeConfig::default(),
            limits: ExecLimits::default(),
        }
    }

    /// Use `tics_per_second` as the time resolution.
    pub fn time_base(mut self, tics_per_second: i64) -> Self {
        self.tics_per_second = tics_per_second;
        self
    }

    /// Terminate at `seconds`.
    pub fn stop_at(mut self, seconds: f64) -> Self {
        self.stop_time = Some(seconds);
        self
    }

    /// Freeze right after initialization.
    pub fn frozen_start(mut self) -> Self {
        self.start_frozen = true;
        self
    }

    /// Declare a state vector.
    pub fn state(mut self, def: StateDef) -> Self {
        self.states.push(def);
        self
    }

    /// Declare an integration loop.
    pub fn integration_loop(mut self, def: LoopDef) -> Self {
        self.loops.push(def);
        self
    }

    /// Bind a derivative job to `state`.
    pub fn derivative(
        mut self,
        name: impl Into<String>,
        state: impl Into<String>,
        job: impl DerivativeJob + 'static,
    ) -> Self {
        self.derivatives.push(DerivativeDef {
            name: name.into(),
            state: state.into(),
            phase: 0,
            policy: None,
            job: Arc::new(job),
        });
        self
    }

    /// Add a task job.
    pub fn job(mut self, spec: JobSpec, job: impl Job + 'static) -> Self {
        self.jobs.push(JobDef {
            spec,
            job: Box::new(job),
        });
        self
    }

    /// Add a post-step hook to `loop_name`.
    pub fn loop_job(
        self,
        loop_name: impl Into<String>,
        spec: JobSpec,
        job: impl Job + 'static,
    ) -> Self {
        let spec = JobSpec {
            class: JobClass::Integration,
            ..spec
        }
        .owner(loop_name);
        self.job(spec, job)
    }

    /// Add an event.
    pub fn event(mut self, def: EventDef) -> Self {
        self.events.push(def);
        self
    }

    /// Replace the pacing settings.
    pub fn realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = realtime;
        self
    }

    /// Replace the run-time limits.
    pub fn limits(mut self, limits: ExecLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The time base.
    pub fn resolved_time_base(&self) -> Result<TimeBase, ConfigError> {
        TimeBase::new(self.tics_per_second).ok_or(ConfigError::InvalidTimeBase {
            tics_per_second: self.tics_per_second,
        })
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.resolved_time_base()?;
        let frame = match base.to_tics(self.frame_seconds) {
            Some(t) if t.tics() > 0 => t,
            _ => {
                return Err(ConfigError::InvalidFrame {
                    reason: format!(
                        "frame of {}s is not a positive whole number of tics",
                        self.frame_seconds
                    ),
                })
            }
        };
        if let Some(stop) = self.stop_time {
            if !(stop.is_finite() && stop >= 0.0) {
                return Err(ConfigError::InvalidFrame {
                    reason: format!("stop time {stop} must be finite and non-negative"),
                });
            }
        }

        // States.
        let mut states: IndexMap<&str, &StateDef> = IndexMap::new();
        for def in &self.states {
            if states.insert(def.name.as_str(), def).is_some() {
                return Err(ConfigError::DuplicateName {
                    kind: "state",
                    name: def.name.clone(),
                });
            }
        }

        // Loops.
        let mut loops: IndexMap<&str, i64> = IndexMap::new();
        let mut owner: IndexMap<&str, &str> = IndexMap::new();
        for def in &self.loops {
            if loops.contains_key(def.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "loop",
                    name: def.name.clone(),
                });
            }
            let dt = match base.to_tics(def.dt) {
                Some(t) if t.tics() > 0 => t.tics(),
                _ => {
                    return Err(ConfigError::InvalidStep {
                        loop_name: def.name.clone(),
                        dt: def.dt,
                    })
                }
            };
            let outer = match &def.parent {
                None => frame.tics(),
                Some(parent) => *loops.get(parent.as_str()).ok_or_else(|| {
                    ConfigError::UnknownLoop {
                        name: parent.clone(),
                        referenced_by: def.name.clone(),
                    }
                })?,
            };
            if outer % dt != 0 {
                return Err(ConfigError::NonIntegerRatio {
                    loop_name: def.name.clone(),
                    dt: def.dt,
                    outer: base.seconds(SimTime(outer)),
                });
            }
            if def.states.is_empty() {
                return Err(ConfigError::EmptyLoop {
                    loop_name: def.name.clone(),
                });
            }
            for state in &def.states {
                if !states.contains_key(state.as_str()) {
                    return Err(ConfigError::UnknownState {
                        name: state.clone(),
                        referenced_by: def.name.clone(),
                    });
                }
                if let Some(first) = owner.insert(state.as_str(), def.name.as_str()) {
                    return Err(ConfigError::StateConflict {
                        state: state.clone(),
                        first: first.to_string(),
                        second: def.name.clone(),
                    });
                }
            }
            if def.integrator.is_adaptive() {
                def.adaptive
                    .validate()
                    .map_err(|error| ConfigError::Integrator {
                        loop_name: def.name.clone(),
                        error,
                    })?;
            }
            loops.insert(def.name.as_str(), dt);
        }

        // Derivatives.
        let mut derived: IndexMap<&str, &str> = IndexMap::new();
        for def in &self.derivatives {
            if !states.contains_key(def.state.as_str()) {
                return Err(ConfigError::UnknownState {
                    name: def.state.clone(),
                    referenced_by: def.name.clone(),
                });
            }
            if !owner.contains_key(def.state.as_str()) {
                return Err(ConfigError::UnboundState {
                    state: def.state.clone(),
                    referenced_by: def.name.clone(),
                });
            }
            if def.policy == Some(ReturnPolicy::Degraded) {
                return Err(ConfigError::InvalidPolicy {
                    job: def.name.clone(),
                    reason: "derivative jobs are always fatal".into(),
                });
            }
            if derived.insert(def.state.as_str(), def.name.as_str()).is_some() {
                return Err(ConfigError::DerivativeConflict {
                    state: def.state.clone(),
                });
            }
        }
        for state in owner.keys() {
            if !derived.contains_key(state) {
                return Err(ConfigError::MissingDerivative {
                    state: state.to_string(),
                });
            }
        }

        // Tasks.
        for def in &self.jobs {
            let spec = &def.spec;
            match spec.class {
                JobClass::Derivative => {
                    return Err(ConfigError::InvalidJob {
                        job: spec.name.clone(),
                        reason: "derivative jobs are declared per state vector".into(),
                    })
                }
                JobClass::Integration => {
                    let bound = spec.owner.as_deref().is_some_and(|o| loops.contains_key(o));
                    if !bound {
                        return Err(ConfigError::UnknownLoop {
                            name: spec.owner.clone().unwrap_or_default(),
                            referenced_by: spec.name.clone(),
                        });
                    }
                }
                _ => {}
            }
        }

        // Events.
        let mut events: IndexMap<&str, ()> = IndexMap::new();
        for def in &self.events {
            if events.insert(def.name.as_str(), ()).is_some() {
                return Err(ConfigError::DuplicateName {
                    kind: "event",
                    name: def.name.clone(),
                });
            }
            if !states.contains_key(def.state.as_str()) {
                return Err(ConfigError::UnknownState {
                    name: def.state.clone(),
                    referenced_by: def.name.clone(),
                });
            }
            if !owner.contains_key(def.state.as_str()) {
                return Err(ConfigError::UnboundState {
                    state: def.state.clone(),
                    referenced_by: def.name.clone(),
                });
            }
            if !def.detector().is_valid() {
                return Err(ConfigError::InvalidTolerance {
                    event: def.name.clone(),
                    reason: format!(
                        "tolerance {} and iteration limit {} must both be positive",
                        def.tolerance, def.max_iterations
                    ),
                });
            }
        }

        // Pacing and limits.
        if !(self.realtime.ratio.is_finite() && self.realtime.ratio > 0.0) {
            return Err(ConfigError::InvalidRealtime {
                reason: format!("ratio {} must be finite and positive", self.realtime.ratio),
            });
        }
        if self.limits.max_event_firings_per_step == 0 {
            return Err(ConfigError::InvalidLimits {
                reason: "max_event_firings_per_step must be at least 1".into(),
            });
        }
        if self.limits.control_queue_capacity == 0 {
            return Err(ConfigError::InvalidLimits {
                reason: "control_queue_capacity must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Hash of the configuration's structure.
    ///
    /// Covers everything a snapshot's meaning depends on: time base,
    /// frame, state shapes, loops, jobs and events. Closures and tuning
    /// values that do not change identity are left out.
    pub fn fingerprint(&self) -> u64 {
        let mut h = Fnv1a::new();
        h.write_i64(self.tics_per_second);
        h.write_f64(self.frame_seconds);
        h.write_u32(self.states.len() as u32);
        for s in &self.states {
            h.write_str(&s.name);
            h.write_u32(s.initial.len() as u32);
        }
        h.write_u32(self.loops.len() as u32);
        for l in &self.loops {
            h.write_str(&l.name);
            h.write_f64(l.dt);
            h.write_u8(l.integrator.tag());
            h.write_str(l.parent.as_deref().unwrap_or(""));
            for s in &l.states {
                h.write_str(s);
            }
        }
        h.write_u32(self.derivatives.len() as u32);
        for d in &self.derivatives {
            h.write_str(&d.name);
            h.write_str(&d.state);
        }
        h.write_u32(self.jobs.len() as u32);
        for j in &self.jobs {
            h.write_str(&j.spec.name);
            h.write_u8(j.spec.class.tag());
            h.write_u32(j.spec.phase);
        }
        h.write_u32(self.events.len() as u32);
        for e in &self.events {
            h.write_str(&e.name);
            h.write_str(&e.state);
        }
        h.finish()
    }
}

impl fmt::Debug for SimConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimConfig")
            .field("tics_per_second", &self.tics_per_second)
            .field("frame_seconds", &self.frame_seconds)
            .field("stop_time", &self.stop_time)
            .field("start_frozen", &self.start_frozen)
            .field("states", &self.states)
            .field("loops", &self.loops)
            .field("derivatives", &self.derivatives)
            .field("jobs", &self.jobs)
            .field("events", &self.events)
            .field("realtime", &self.realtime)
            .field("limits", &self.limits)
            .finish()
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while validating or building a configuration.
///
/// Every one of them is fatal at setup: the executive is never built.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// Tics per second is zero or negative.
    InvalidTimeBase {
        /// The configured value.
        tics_per_second: i64,
    },
    /// The frame duration or stop time is unusable.
    InvalidFrame {
        /// What is wrong.
        reason: String,
    },
    /// Two states, loops or events share a name.
    DuplicateName {
        /// `"state"`, `"loop"` or `"event"`.
        kind: &'static str,
        /// The repeated name.
        name: String,
    },
    /// A loop step is not a positive whole number of tics.
    InvalidStep {
        /// The loop.
        loop_name: String,
        /// Its step in seconds.
        dt: f64,
    },
    /// A loop step does not divide its frame or parent step exactly.
    NonIntegerRatio {
        /// The loop.
        loop_name: String,
        /// Its step in seconds.
        dt: f64,
        /// The frame or parent step it must divide, in seconds.
        outer: f64,
    },
    /// A reference names a loop that does not exist, or not yet.
    UnknownLoop {
        /// The missing loop.
        name: String,
        /// Who referenced it.
        referenced_by: String,
    },
    /// A reference names a state vector that does not exist.
    UnknownState {
        /// The missing state.
        name: String,
        /// Who referenced it.
        referenced_by: String,
    },
    /// A loop integrates nothing.
    EmptyLoop {
        /// The loop.
        loop_name: String,
    },
    /// A state vector is listed by two loops.
    StateConflict {
        /// The state.
        state: String,
        /// The first loop to claim it.
        first: String,
        /// The second loop.
        second: String,
    },
    /// A derivative or event refers to a state no loop integrates.
    UnboundState {
        /// The state.
        state: String,
        /// Who referenced it.
        referenced_by: String,
    },
    /// An integrated state vector has no derivative job.
    MissingDerivative {
        /// The state.
        state: String,
    },
    /// A state vector has more than one derivative job.
    DerivativeConflict {
        /// The state.
        state: String,
    },
    /// A job's return policy is not allowed for its class.
    InvalidPolicy {
        /// The job.
        job: String,
        /// Why.
        reason: String,
    },
    /// A job declaration is unusable.
    InvalidJob {
        /// The job.
        job: String,
        /// Why.
        reason: String,
    },
    /// An event's detection settings are unusable.
    InvalidTolerance {
        /// The event.
        event: String,
        /// Why.
        reason: String,
    },
    /// The pacing settings are unusable.
    InvalidRealtime {
        /// Why.
        reason: String,
    },
    /// A run-time limit is unusable.
    InvalidLimits {
        /// Why.
        reason: String,
    },
    /// A unique `(owner, class, phase)` tuple was registered twice.
    DuplicateJob {
        /// Owner of the job.
        owner: String,
        /// Class of the job.
        class: JobClass,
        /// Phase of the job.
        phase: u32,
    },
    /// A cycle is shorter than a frame or not a whole number of tics.
    MalformedCycle {
        /// The job.
        job: String,
        /// The offending cycle.
        cycle: Cycle,
    },
    /// Any other registration failure.
    Registration(RegistrationError),
    /// A loop's integrator could not be built.
    Integrator {
        /// The loop.
        loop_name: String,
        /// The integrator's error.
        error: IntegError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimeBase { tics_per_second } => {
                write!(f, "invalid time base: {tics_per_second} tics per second")
            }
            Self::InvalidFrame { reason } => write!(f, "invalid frame: {reason}"),
            Self::DuplicateName { kind, name } => write!(f, "duplicate {kind} name '{name}'"),
            Self::InvalidStep { loop_name, dt } => write!(
                f,
                "loop '{loop_name}': step {dt}s is not a positive whole number of tics"
            ),
            Self::NonIntegerRatio {
                loop_name,
                dt,
                outer,
            } => write!(
                f,
                "loop '{loop_name}': step {dt}s does not divide {outer}s exactly"
            ),
            Self::UnknownLoop {
                name,
                referenced_by,
            } => write!(f, "'{referenced_by}' refers to unknown loop '{name}'"),
            Self::UnknownState {
                name,
                referenced_by,
            } => write!(f, "'{referenced_by}' refers to unknown state '{name}'"),
            Self::EmptyLoop { loop_name } => write!(f, "loop '{loop_name}' has no states"),
            Self::StateConflict {
                state,
                first,
                second,
            } => write!(
                f,
                "state '{state}' is integrated by both '{first}' and '{second}'"
            ),
            Self::UnboundState {
                state,
                referenced_by,
            } => write!(
                f,
                "'{referenced_by}' refers to state '{state}', which no loop integrates"
            ),
            Self::MissingDerivative { state } => {
                write!(f, "state '{state}' has no derivative job")
            }
            Self::DerivativeConflict { state } => {
                write!(f, "state '{state}' has more than one derivative job")
            }
            Self::InvalidPolicy { job, reason } => {
                write!(f, "job '{job}': invalid return policy: {reason}")
            }
            Self::InvalidJob { job, reason } => write!(f, "job '{job}': {reason}"),
            Self::InvalidTolerance { event, reason } => write!(f, "event '{event}': {reason}"),
            Self::InvalidRealtime { reason } => write!(f, "invalid realtime config: {reason}"),
            Self::InvalidLimits { reason } => write!(f, "invalid limits: {reason}"),
            Self::DuplicateJob {
                owner,
                class,
                phase,
            } => write!(f, "duplicate {class} job for '{owner}' at phase {phase}"),
            Self::MalformedCycle { job, cycle } => {
                write!(f, "job '{job}': malformed cycle {cycle}")
            }
            Self::Registration(e) => write!(f, "registration failed: {e}"),
            Self::Integrator { loop_name, error } => write!(f, "loop '{loop_name}': {error}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registration(e) => Some(e),
            Self::Integrator { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<RegistrationError> for ConfigError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::Duplicate {
                owner,
                class,
                phase,
            } => Self::DuplicateJob {
                owner,
                class,
                phase,
            },
            RegistrationError::MalformedCycle { job, cycle } => Self::MalformedCycle { job, cycle },
            other => Self::Registration(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_job::{derivative_fn, job_fn};

    fn decay() -> impl DerivativeJob {
        derivative_fn(|v, d| {
            d[0] = -v.own()[0];
            Ok(())
        })
    }

    fn base() -> SimConfig {
        SimConfig::new(0.1)
            .state(StateDef::first_order("x", vec![1.0]))
            .integration_loop(LoopDef::new("main", 0.01, IntegratorKind::Rk4).state("x"))
            .derivative("decay", "x", decay())
    }

    #[test]
    fn valid_config_passes() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn non_integer_root_ratio_rejected() {
        let mut cfg = base();
        cfg.loops[0].dt = 0.03;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonIntegerRatio { .. })
        ));
    }

    #[test]
    fn non_integer_child_ratio_rejected() {
        let cfg = base()
            .state(StateDef::first_order("y", vec![0.0]))
            .integration_loop(
                LoopDef::new("fast", 0.004, IntegratorKind::Euler)
                    .child_of("main")
                    .state("y"),
            )
            .derivative("dy", "y", decay());
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::NonIntegerRatio { ref loop_name, .. } if loop_name == "fast"));
    }

    #[test]
    fn child_before_parent_is_unknown_loop() {
        let mut cfg = base().state(StateDef::first_order("y", vec![0.0]));
        cfg.loops.insert(
            0,
            LoopDef::new("fast", 0.005, IntegratorKind::Euler)
                .child_of("main")
                .state("y"),
        );
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnknownLoop { .. })
        ));
    }

    #[test]
    fn step_below_tic_resolution_rejected() {
        let mut cfg = base();
        cfg.loops[0].dt = 1e-7;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidStep { .. })));
    }

    #[test]
    fn derivative_coverage_enforced() {
        let mut cfg = base();
        cfg.derivatives.clear();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::MissingDerivative { state: "x".into() })
        );
        let cfg = base().derivative("again", "x", decay());
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::DerivativeConflict { state: "x".into() })
        );
    }

    #[test]
    fn degraded_derivative_rejected() {
        let mut cfg = base();
        cfg.derivatives[0].policy = Some(ReturnPolicy::Degraded);
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPolicy { .. })));
    }

    #[test]
    fn state_in_two_loops_rejected() {
        let cfg = base().integration_loop(LoopDef::new("other", 0.05, IntegratorKind::Euler).state("x"));
        assert!(matches!(cfg.validate(), Err(ConfigError::StateConflict { .. })));
    }

    #[test]
    fn empty_loop_and_unknown_state_rejected() {
        let cfg = base().integration_loop(LoopDef::new("idle", 0.05, IntegratorKind::Euler));
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyLoop { .. })));
        let cfg = base().integration_loop(LoopDef::new("ghost", 0.05, IntegratorKind::Euler).state("nope"));
        assert!(matches!(cfg.validate(), Err(ConfigError::UnknownState { .. })));
    }

    #[test]
    fn integration_hook_needs_a_loop() {
        let cfg = base().loop_job("nowhere", JobSpec::new("clamp", JobClass::Integration), job_fn("clamp", |_| Ok(())));
        assert!(matches!(cfg.validate(), Err(ConfigError::UnknownLoop { .. })));
        let cfg = base().loop_job("main", JobSpec::new("clamp", JobClass::Integration), job_fn("clamp", |_| Ok(())));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bad_frame_and_ratio_rejected() {
        let mut cfg = base();
        cfg.frame_seconds = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidFrame { .. })));
        let mut cfg = base();
        cfg.realtime.ratio = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidRealtime { .. })));
        let mut cfg = base();
        cfg.tics_per_second = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidTimeBase { .. })));
    }

    #[test]
    fn event_settings_checked() {
        use cadence_job::condition_fn;
        let cfg = base().event(EventDef::new("zero", "x", condition_fn(|v| v.own()[0])).tolerance(0.0));
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidTolerance { .. })));
    }

    #[test]
    fn registration_errors_map_to_taxonomy() {
        let e: ConfigError = RegistrationError::Duplicate {
            owner: "x".into(),
            class: JobClass::Derivative,
            phase: 0,
        }
        .into();
        assert!(matches!(e, ConfigError::DuplicateJob { .. }));
        let e: ConfigError = RegistrationError::Late { job: "j".into() }.into();
        assert!(matches!(e, ConfigError::Registration(_)));
        assert!(e.source().is_some());
    }

    #[test]
    fn fingerprint_tracks_structure() {
        assert_eq!(base().fingerprint(), base().fingerprint());
        let other = base().state(StateDef::first_order("y", vec![0.0]));
        assert_ne!(base().fingerprint(), other.fingerprint());
    }
}
