//! Capture and restore of executive state at frame boundaries.
//!
//! A capture runs the `checkpoint` jobs, then records job schedules,
//! loop times and integrator memory, event detection state and every
//! state vector. A restore checks that the image belongs to this
//! executive's configuration before touching anything, applies it, runs
//! the `restart` jobs and resumes in the captured mode. Resuming from a
//! restored image produces the same frames as the uninterrupted run.

use std::error::Error;
use std::fmt;

use cadence_core::{Cycle, ExecError, FrameId, JobId, SimTime};
use cadence_integ::{AbmHistory, IntegratorMemory};
use cadence_job::{JobClass, JobSchedule};
use cadence_snapshot::{
    decode_image, encode_image, Blob, EventRecord, JobRecord, LoopRecord, SnapshotError,
    SnapshotImage, StateRecord,
};

use crate::executive::{ExecMode, Executive};

// ── Errors ─────────────────────────────────────────────────────────

/// Errors from [`Executive::capture_state`].
#[derive(Debug)]
pub enum CaptureError {
    /// Capture was called in the wrong mode, or a checkpoint job failed
    /// fatally.
    Exec(ExecError),
    /// The image could not be encoded.
    Encode(SnapshotError),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exec(e) => write!(f, "capture failed: {e}"),
            Self::Encode(e) => write!(f, "capture failed: {e}"),
        }
    }
}

impl Error for CaptureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Exec(e) => Some(e),
            Self::Encode(e) => Some(e),
        }
    }
}

impl From<ExecError> for CaptureError {
    fn from(e: ExecError) -> Self {
        Self::Exec(e)
    }
}

impl From<SnapshotError> for CaptureError {
    fn from(e: SnapshotError) -> Self {
        Self::Encode(e)
    }
}

/// Errors from [`Executive::restore_state`].
#[derive(Debug)]
pub enum RestoreError {
    /// The blob did not decode.
    Snapshot(SnapshotError),
    /// The image does not match this executive's registry, loops,
    /// events or state vectors. Nothing was changed.
    Mismatch {
        /// What did not match.
        reason: String,
    },
    /// Restore is not allowed in the current mode.
    InvalidMode {
        /// The mode at the time of the call.
        mode: ExecMode,
    },
    /// A restart job failed fatally after the image was applied.
    Exec(ExecError),
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot(e) => write!(f, "restore failed: {e}"),
            Self::Mismatch { reason } => write!(f, "snapshot does not match: {reason}"),
            Self::InvalidMode { mode } => write!(f, "cannot restore while {mode}"),
            Self::Exec(e) => write!(f, "restart failed: {e}"),
        }
    }
}

impl Error for RestoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Snapshot(e) => Some(e),
            Self::Exec(e) => Some(e),
            Self::Mismatch { .. } | Self::InvalidMode { .. } => None,
        }
    }
}

impl From<SnapshotError> for RestoreError {
    fn from(e: SnapshotError) -> Self {
        Self::Snapshot(e)
    }
}

fn mismatch(reason: impl Into<String>) -> RestoreError {
    RestoreError::Mismatch {
        reason: reason.into(),
    }
}

// ── Capture ────────────────────────────────────────────────────────

impl Executive {
    /// Capture the executive at the current frame boundary as a blob.
    ///
    /// Valid while running or frozen. Runs the `checkpoint` jobs first.
    pub fn capture_state(&mut self) -> Result<Blob, CaptureError> {
        let image = self.capture_image()?;
        Ok(encode_image(&image)?)
    }

    /// Capture the executive as an unencoded image.
    ///
    /// Useful with [`state_hash`](cadence_snapshot::state_hash) and
    /// [`compare_images`](cadence_snapshot::compare_images) to check two
    /// runs for equality.
    pub fn capture_image(&mut self) -> Result<SnapshotImage, ExecError> {
        if !matches!(self.mode, ExecMode::Running | ExecMode::Frozen) {
            return Err(ExecError::InvalidMode {
                operation: "capture_state",
                mode: self.mode.name(),
            });
        }
        if let Err(e) = self.run_transition(JobClass::Checkpoint) {
            self.fail(e.clone());
            return Err(e);
        }

        let image = SnapshotImage {
            fingerprint: self.fingerprint,
            mode: self.mode.tag(),
            frame: self.frame.counter().0,
            time_tics: self.frame.start().tics(),
            realtime_ratio: self.realtime.ratio(),
            pending_steps: self.pending_steps,
            jobs: self.registry.iter().map(job_record).collect(),
            loops: self
                .loops
                .iter()
                .map(|lp| {
                    let memory = lp.memory();
                    LoopRecord {
                        name: lp.name().to_string(),
                        time_tics: lp.time().tics(),
                        h_next: memory.h_next,
                        history_h: memory.history.step_size(),
                        history: memory.history.past().to_vec(),
                        steps: lp.steps(),
                    }
                })
                .collect(),
            events: self
                .events
                .iter()
                .map(|slot| EventRecord {
                    name: slot.name.clone(),
                    enabled: slot.enabled,
                    degraded: slot.degraded,
                    last_value: slot.last_value,
                    fire_count: slot.fire_count,
                    last_fired: slot.last_fired,
                })
                .collect(),
            states: self
                .store
                .iter()
                .map(|(_, v)| StateRecord {
                    name: v.name().to_string(),
                    values: v.values().to_vec(),
                    derivs: v.derivs().to_vec(),
                })
                .collect(),
        };
        tracing::info!(
            frame = image.frame,
            jobs = image.jobs.len(),
            loops = image.loops.len(),
            events = image.events.len(),
            "state captured"
        );
        Ok(image)
    }

    // ── Restore ────────────────────────────────────────────────────

    /// Restore a blob produced by [`capture_state`](Self::capture_state).
    ///
    /// Valid before initialization, while running and while frozen. A
    /// fresh executive built from the same configuration resumes the
    /// captured run without running its initialization jobs.
    pub fn restore_state(&mut self, bytes: &[u8]) -> Result<(), RestoreError> {
        let image = decode_image(bytes)?;
        self.restore_image(&image)
    }

    /// Restore an unencoded image.
    pub fn restore_image(&mut self, image: &SnapshotImage) -> Result<(), RestoreError> {
        if !matches!(
            self.mode,
            ExecMode::Initializing | ExecMode::Running | ExecMode::Frozen
        ) {
            return Err(RestoreError::InvalidMode { mode: self.mode });
        }
        let target = self.check_image(image)?;

        let previous = self.mode;
        self.mode = ExecMode::Restoring;
        tracing::info!(from = %previous, frame = image.frame, "restoring");

        self.frame.set_counter(FrameId(image.frame));
        self.pending_steps = image.pending_steps;
        self.requests = Default::default();

        for (i, record) in image.jobs.iter().enumerate() {
            let schedule = JobSchedule {
                cycle: Cycle::new(record.cycle_num, record.cycle_den).unwrap_or(Cycle::ONE_FRAME),
                next_call: SimTime(record.next_call),
                last_call: record.last_call.map(SimTime),
                enabled: record.enabled,
                degraded: record.degraded,
                run_count: record.run_count,
                error_count: record.error_count,
            };
            if let Err(e) = self.registry.restore_schedule(JobId(i as u32), &schedule) {
                // Cycles were checked above; only a registry changed
                // under us gets here.
                return Err(mismatch(e.to_string()));
            }
        }

        for (id, record) in self
            .store
            .iter()
            .map(|(id, _)| id)
            .collect::<Vec<_>>()
            .into_iter()
            .zip(&image.states)
        {
            if let Some(v) = self.store.get_mut(id) {
                v.values_mut().copy_from_slice(&record.values);
                v.derivs_mut().copy_from_slice(&record.derivs);
            }
        }

        for (lp, record) in self.loops.iter_mut().zip(&image.loops) {
            let memory = IntegratorMemory {
                h_next: record.h_next,
                history: AbmHistory::from_parts(record.history_h, record.history.clone()),
            };
            lp.restore(SimTime(record.time_tics), record.steps, memory, &self.store);
        }

        for (i, record) in image.events.iter().enumerate() {
            let slot = self.events.slot_mut(i);
            slot.enabled = record.enabled;
            slot.degraded = record.degraded;
            slot.last_value = record.last_value;
            slot.fire_count = record.fire_count;
            slot.last_fired = record.last_fired;
        }

        let now = self.time();
        self.realtime
            .set_ratio(image.realtime_ratio, &*self.clock, now);
        self.registry.seal();

        // Restart jobs see the restored state; a fatal failure ends the run.
        if let Err(e) = self.run_transition(JobClass::Restart) {
            self.fail(e.clone());
            return Err(RestoreError::Exec(e));
        }

        self.mode = target;
        tracing::info!(frame = %self.frame.counter(), time = self.time(), mode = %self.mode, "restored");
        Ok(())
    }

    /// Validate an image against this executive without changing
    /// anything. Returns the mode to resume in.
    fn check_image(&self, image: &SnapshotImage) -> Result<ExecMode, RestoreError> {
        if image.fingerprint != self.fingerprint {
            return Err(mismatch(format!(
                "configuration fingerprint {:#018x} differs from {:#018x}",
                image.fingerprint, self.fingerprint
            )));
        }
        let mode = match ExecMode::from_tag(image.mode) {
            Some(m @ (ExecMode::Running | ExecMode::Frozen)) => m,
            _ => return Err(mismatch(format!("mode tag {} cannot be resumed", image.mode))),
        };
        let duration = self.frame.duration();
        let expected = duration.tics().checked_mul(image.frame as i64);
        if expected != Some(image.time_tics) {
            return Err(mismatch(format!(
                "time {} tics is not the start of frame {}",
                image.time_tics, image.frame
            )));
        }
        if !(image.realtime_ratio.is_finite() && image.realtime_ratio > 0.0) {
            return Err(mismatch(format!(
                "real-time ratio {} is invalid",
                image.realtime_ratio
            )));
        }

        if image.jobs.len() != self.registry.len() {
            return Err(mismatch(format!(
                "{} jobs in image, {} registered",
                image.jobs.len(),
                self.registry.len()
            )));
        }
        for (entry, record) in self.registry.iter().zip(&image.jobs) {
            if entry.name() != record.name || entry.class().tag() != record.class {
                return Err(mismatch(format!(
                    "job {} is '{}' ({}), image has '{}'",
                    entry.id(),
                    entry.name(),
                    entry.class(),
                    record.name
                )));
            }
            let valid = Cycle::new(record.cycle_num, record.cycle_den).is_some_and(|c| {
                !entry.class().frame_dispatched()
                    || (c.covers_frame() && c.to_tics(duration).is_some())
            });
            if !valid {
                return Err(mismatch(format!(
                    "job '{}' has malformed cycle {}/{}",
                    record.name, record.cycle_num, record.cycle_den
                )));
            }
        }

        if image.loops.len() != self.loops.len() {
            return Err(mismatch(format!(
                "{} loops in image, {} configured",
                image.loops.len(),
                self.loops.len()
            )));
        }
        for (lp, record) in self.loops.iter().zip(&image.loops) {
            if lp.name() != record.name {
                return Err(mismatch(format!(
                    "loop '{}' does not match image loop '{}'",
                    lp.name(),
                    record.name
                )));
            }
            if record.time_tics != image.time_tics {
                return Err(mismatch(format!(
                    "loop '{}' is at {} tics, not at the frame boundary",
                    record.name, record.time_tics
                )));
            }
            let dim = lp.layout().total_len();
            if record.history.iter().any(|f| f.len() != dim) {
                return Err(mismatch(format!(
                    "loop '{}' history does not have length {dim}",
                    record.name
                )));
            }
        }

        if image.events.len() != self.events.len() {
            return Err(mismatch(format!(
                "{} events in image, {} configured",
                image.events.len(),
                self.events.len()
            )));
        }
        for (slot, record) in self.events.iter().zip(&image.events) {
            if slot.name != record.name {
                return Err(mismatch(format!(
                    "event '{}' does not match image event '{}'",
                    slot.name, record.name
                )));
            }
        }

        if image.states.len() != self.store.len() {
            return Err(mismatch(format!(
                "{} state vectors in image, {} configured",
                image.states.len(),
                self.store.len()
            )));
        }
        for ((_, v), record) in self.store.iter().zip(&image.states) {
            if v.name() != record.name
                || v.len() != record.values.len()
                || v.len() != record.derivs.len()
            {
                return Err(mismatch(format!(
                    "state '{}' ({} values) does not match image state '{}' ({} values)",
                    v.name(),
                    v.len(),
                    record.name,
                    record.values.len()
                )));
            }
        }
        Ok(mode)
    }
}

fn job_record(entry: &cadence_job::JobEntry) -> JobRecord {
    let schedule = entry.schedule();
    JobRecord {
        name: entry.name().to_string(),
        class: entry.class().tag(),
        phase: entry.phase(),
        cycle_num: schedule.cycle.num(),
        cycle_den: schedule.cycle.den(),
        next_call: schedule.next_call.tics(),
        last_call: schedule.last_call.map(SimTime::tics),
        enabled: schedule.enabled,
        degraded: schedule.degraded,
        run_count: schedule.run_count,
        error_count: schedule.error_count,
    }
}
