//! The job registry: registration, per-class ordering and due-time dispatch.
//!
//! Jobs are never removed. Disabling is the only way to stop a job,
//! which keeps IDs and iteration order stable for the whole run.

use std::sync::Arc;

use indexmap::IndexMap;

use cadence_core::{Cycle, JobError, JobId, SimTime};

use crate::class::{JobClass, ReturnPolicy};
use crate::context::JobContext;
use crate::error::RegistrationError;
use crate::job::{DerivativeJob, Job};

// ── JobSpec ────────────────────────────────────────────────────────

/// Scheduling metadata supplied at registration.
///
/// # Examples
///
/// ```
/// use cadence_core::Cycle;
/// use cadence_job::{JobClass, JobSpec, ReturnPolicy};
///
/// let spec = JobSpec::new("telemetry_dump", JobClass::Log)
///     .phase(2)
///     .cycle(Cycle::frames(10))
///     .policy(ReturnPolicy::Fatal);
/// assert_eq!(spec.resolved_policy(), ReturnPolicy::Fatal);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct JobSpec {
    /// Job name.
    pub name: String,
    /// Job class.
    pub class: JobClass,
    /// Ordering within the class; lower runs first.
    pub phase: u32,
    /// Call period as a multiple of the frame. Ignored for classes that
    /// are not cycle dispatched.
    pub cycle: Cycle,
    /// Return policy. `None` takes the class default.
    pub policy: Option<ReturnPolicy>,
    /// Owning simulation object, used for duplicate detection.
    /// Defaults to the job name.
    pub owner: Option<String>,
    /// Whether the job starts enabled.
    pub enabled: bool,
    /// Whether the job may be registered after the executive started.
    pub dynamic: bool,
}

impl JobSpec {
    /// Spec with phase 0, a one-frame cycle, the class default policy,
    /// enabled.
    pub fn new(name: impl Into<String>, class: JobClass) -> Self {
        Self {
            name: name.into(),
            class,
            phase: 0,
            cycle: Cycle::ONE_FRAME,
            policy: None,
            owner: None,
            enabled: true,
            dynamic: false,
        }
    }

    /// Set the phase.
    pub fn phase(mut self, phase: u32) -> Self {
        self.phase = phase;
        self
    }

    /// Set the cycle.
    pub fn cycle(mut self, cycle: Cycle) -> Self {
        self.cycle = cycle;
        self
    }

    /// Set the return policy.
    pub fn policy(mut self, policy: ReturnPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the owning object.
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Start disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Allow registration after the executive started.
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// The effective return policy.
    pub fn resolved_policy(&self) -> ReturnPolicy {
        self.policy.unwrap_or_else(|| self.class.default_policy())
    }

    fn owner_key(&self) -> &str {
        self.owner.as_deref().unwrap_or(&self.name)
    }
}

// ── JobBody ────────────────────────────────────────────────────────

/// The callable behind a registry entry.
pub enum JobBody {
    /// A frame, hook, or transition job.
    Task(Box<dyn Job>),
    /// A derivative evaluator, shared with the loop that calls it.
    Derivative(Arc<dyn DerivativeJob>),
}

// ── JobSchedule ────────────────────────────────────────────────────

/// Mutable scheduling state of an entry, as captured in snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSchedule {
    /// Current cycle.
    pub cycle: Cycle,
    /// Next due time.
    pub next_call: SimTime,
    /// Time of the last call.
    pub last_call: Option<SimTime>,
    /// Enabled flag.
    pub enabled: bool,
    /// Degraded flag.
    pub degraded: bool,
    /// Completed calls.
    pub run_count: u64,
    /// Failed calls.
    pub error_count: u64,
}

// ── JobEntry ───────────────────────────────────────────────────────

/// A registered job with its scheduling state.
pub struct JobEntry {
    id: JobId,
    spec: JobSpec,
    body: JobBody,
    cycle_tics: SimTime,
    next_call: SimTime,
    last_call: Option<SimTime>,
    enabled: bool,
    degraded: bool,
    run_count: u64,
    error_count: u64,
}

impl JobEntry {
    /// Job ID.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Job name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Job class.
    pub fn class(&self) -> JobClass {
        self.spec.class
    }

    /// Phase within the class.
    pub fn phase(&self) -> u32 {
        self.spec.phase
    }

    /// Current cycle.
    pub fn cycle(&self) -> Cycle {
        self.spec.cycle
    }

    /// Effective return policy.
    pub fn policy(&self) -> ReturnPolicy {
        self.spec.resolved_policy()
    }

    /// Registration metadata.
    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    /// Next due time.
    pub fn next_call(&self) -> SimTime {
        self.next_call
    }

    /// Time of the last call.
    pub fn last_call(&self) -> Option<SimTime> {
        self.last_call
    }

    /// Whether the job is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the job was degraded by a failure.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Enabled and not degraded.
    pub fn is_runnable(&self) -> bool {
        self.enabled && !self.degraded
    }

    /// Completed calls.
    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    /// Failed calls.
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// The callable.
    pub fn body(&self) -> &JobBody {
        &self.body
    }

    /// Run a task job. Derivative entries are evaluated by their loop
    /// and do nothing here.
    pub fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        match &mut self.body {
            JobBody::Task(job) => job.run(ctx),
            JobBody::Derivative(_) => Ok(()),
        }
    }

    /// Snapshot of the scheduling state.
    pub fn schedule(&self) -> JobSchedule {
        JobSchedule {
            cycle: self.spec.cycle,
            next_call: self.next_call,
            last_call: self.last_call,
            enabled: self.enabled,
            degraded: self.degraded,
            run_count: self.run_count,
            error_count: self.error_count,
        }
    }
}

// ── JobRegistry ────────────────────────────────────────────────────

/// All registered jobs, indexed by class in dispatch order.
///
/// Within a class, jobs are ordered by ascending phase, then by
/// registration order. The order depends only on registration, so
/// repeated runs dispatch identically.
pub struct JobRegistry {
    frame: SimTime,
    entries: Vec<JobEntry>,
    by_class: IndexMap<JobClass, Vec<JobId>>,
    unique: IndexMap<(String, JobClass, u32), JobId>,
    sealed: bool,
}

impl JobRegistry {
    /// An empty registry for the given frame duration.
    pub fn new(frame: SimTime) -> Self {
        let by_class = JobClass::ALL.iter().map(|c| (*c, Vec::new())).collect();
        Self {
            frame,
            entries: Vec::new(),
            by_class,
            unique: IndexMap::new(),
            sealed: false,
        }
    }

    /// Register a job, first due at `now`.
    pub fn register(
        &mut self,
        spec: JobSpec,
        body: JobBody,
        now: SimTime,
    ) -> Result<JobId, RegistrationError> {
        if self.sealed && !spec.dynamic {
            return Err(RegistrationError::Late { job: spec.name });
        }
        let cycle_tics = self.resolve_cycle(&spec.name, spec.class, spec.cycle)?;
        let key = (spec.owner_key().to_string(), spec.class, spec.phase);
        if spec.class.requires_unique() && self.unique.contains_key(&key) {
            return Err(RegistrationError::Duplicate {
                owner: key.0,
                class: key.1,
                phase: key.2,
            });
        }

        let id = JobId(self.entries.len() as u32);
        if spec.class.requires_unique() {
            self.unique.insert(key, id);
        }
        let phase = spec.phase;
        let class = spec.class;
        self.entries.push(JobEntry {
            id,
            enabled: spec.enabled,
            spec,
            body,
            cycle_tics,
            next_call: now,
            last_call: None,
            degraded: false,
            run_count: 0,
            error_count: 0,
        });

        // New IDs are always the largest, so inserting after every job
        // with phase <= ours keeps (phase, registration) order.
        let entries = &self.entries;
        let list = self.by_class.entry(class).or_default();
        let pos = list.partition_point(|j| entries[j.0 as usize].spec.phase <= phase);
        list.insert(pos, id);
        Ok(id)
    }

    /// Reject non-dynamic registrations from now on.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether the registry is sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Runnable jobs of `class` due at `time`, in dispatch order.
    ///
    /// For classes that are not cycle dispatched every runnable job is due.
    pub fn jobs_for(&self, class: JobClass, time: SimTime) -> Vec<JobId> {
        let Some(list) = self.by_class.get(&class) else {
            return Vec::new();
        };
        list.iter()
            .copied()
            .filter(|id| {
                let e = &self.entries[id.0 as usize];
                e.is_runnable() && (!class.frame_dispatched() || e.next_call <= time)
            })
            .collect()
    }

    /// Every job of `class` in dispatch order, runnable or not.
    pub fn all_of(&self, class: JobClass) -> &[JobId] {
        self.by_class.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record a call at `time` and advance the next due time by whole
    /// cycles until it lies past `time`.
    pub fn mark_ran(&mut self, id: JobId, time: SimTime) {
        let Some(e) = self.entries.get_mut(id.0 as usize) else {
            return;
        };
        e.last_call = Some(time);
        e.run_count += 1;
        if e.spec.class.frame_dispatched() {
            while e.next_call <= time {
                e.next_call += e.cycle_tics;
            }
        }
    }

    /// Record a failed call.
    pub fn mark_failed(&mut self, id: JobId) {
        if let Some(e) = self.entries.get_mut(id.0 as usize) {
            e.error_count += 1;
        }
    }

    /// Skip the job until it is re-enabled.
    pub fn mark_degraded(&mut self, id: JobId) {
        if let Some(e) = self.entries.get_mut(id.0 as usize) {
            e.degraded = true;
        }
    }

    /// Change a job's cycle. The next call moves to one new cycle after
    /// the last call; a job that never ran keeps its pending due time.
    pub fn set_cycle(&mut self, id: JobId, cycle: Cycle) -> Result<(), RegistrationError> {
        let entry = self.entry(id)?;
        let class = entry.spec.class;
        if !class.frame_dispatched() {
            return Err(RegistrationError::NotFrameScheduled {
                job: entry.spec.name.clone(),
                class,
            });
        }
        let name = entry.spec.name.clone();
        let tics = self.resolve_cycle(&name, class, cycle)?;
        let e = &mut self.entries[id.0 as usize];
        e.spec.cycle = cycle;
        e.cycle_tics = tics;
        if let Some(last) = e.last_call {
            e.next_call = last + tics;
        }
        Ok(())
    }

    /// Enable a job and clear its degraded mark.
    pub fn enable(&mut self, id: JobId) -> Result<(), RegistrationError> {
        self.toggle(id, true)
    }

    /// Disable a job. Derivative jobs cannot be disabled.
    pub fn disable(&mut self, id: JobId) -> Result<(), RegistrationError> {
        self.toggle(id, false)
    }

    /// Restore scheduling state captured by [`JobEntry::schedule`].
    pub fn restore_schedule(
        &mut self,
        id: JobId,
        schedule: &JobSchedule,
    ) -> Result<(), RegistrationError> {
        let entry = self.entry(id)?;
        let name = entry.spec.name.clone();
        let class = entry.spec.class;
        let tics = self.resolve_cycle(&name, class, schedule.cycle)?;
        let e = &mut self.entries[id.0 as usize];
        e.spec.cycle = schedule.cycle;
        e.cycle_tics = tics;
        e.next_call = schedule.next_call;
        e.last_call = schedule.last_call;
        e.enabled = schedule.enabled;
        e.degraded = schedule.degraded;
        e.run_count = schedule.run_count;
        e.error_count = schedule.error_count;
        Ok(())
    }

    /// Borrow an entry.
    pub fn get(&self, id: JobId) -> Option<&JobEntry> {
        self.entries.get(id.0 as usize)
    }

    /// Mutably borrow an entry.
    pub fn get_mut(&mut self, id: JobId) -> Option<&mut JobEntry> {
        self.entries.get_mut(id.0 as usize)
    }

    /// Look up a job by name. Returns the first match.
    pub fn find(&self, name: &str) -> Option<JobId> {
        self.entries.iter().find(|e| e.spec.name == name).map(|e| e.id)
    }

    /// All entries in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &JobEntry> {
        self.entries.iter()
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no job is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: JobId) -> Result<&JobEntry, RegistrationError> {
        self.entries
            .get(id.0 as usize)
            .ok_or(RegistrationError::UnknownJob { id })
    }

    fn toggle(&mut self, id: JobId, enabled: bool) -> Result<(), RegistrationError> {
        let entry = self.entry(id)?;
        if entry.spec.class == JobClass::Derivative {
            return Err(RegistrationError::NotFrameScheduled {
                job: entry.spec.name.clone(),
                class: JobClass::Derivative,
            });
        }
        let e = &mut self.entries[id.0 as usize];
        e.enabled = enabled;
        if enabled {
            e.degraded = false;
        }
        Ok(())
    }

    fn resolve_cycle(
        &self,
        name: &str,
        class: JobClass,
        cycle: Cycle,
    ) -> Result<SimTime, RegistrationError> {
        if !class.frame_dispatched() {
            return Ok(self.frame);
        }
        match cycle.to_tics(self.frame) {
            Some(tics) if cycle.covers_frame() => Ok(tics),
            _ => Err(RegistrationError::MalformedCycle {
                job: name.to_string(),
                cycle,
            }),
        }
    }
}
