//! Job execution and return-policy handling shared by the frame
//! scheduler and the integration loops.

use std::time::Instant;

use cadence_core::{ExecError, FrameId, JobId, SimTime, StateStore, TimeBase};
use cadence_job::{JobClass, JobContext, JobRegistry, Requests, ReturnPolicy};

use crate::events::EventTable;
use crate::telemetry::{FrameTelemetry, JobErrorRecord};

/// Everything a frame's work may touch, borrowed from the executive for
/// the duration of one frame action.
pub(crate) struct FrameEnv<'a> {
    pub store: &'a mut StateStore,
    pub registry: &'a mut JobRegistry,
    pub events: &'a mut EventTable,
    pub requests: &'a mut Requests,
    pub telemetry: &'a mut FrameTelemetry,
    pub frame: FrameId,
    pub frame_time: SimTime,
    pub base: TimeBase,
    pub max_firings: u32,
}

impl FrameEnv<'_> {
    /// Run every runnable job of `class` due at `due`, in dispatch order.
    ///
    /// Jobs see `time` as their current time: the frame start for work
    /// before the integration loops, the frame end for work after them.
    pub fn run_class(
        &mut self,
        class: JobClass,
        due: SimTime,
        time: SimTime,
    ) -> Result<(), ExecError> {
        let ids = self.registry.jobs_for(class, due);
        if ids.is_empty() {
            return Ok(());
        }
        let started = Instant::now();
        let time = self.base.seconds(time);
        let mut result = Ok(());
        for id in ids {
            result = self.run_job(id, time, due);
            if result.is_err() {
                break;
            }
        }
        let us = started.elapsed().as_micros() as u64;
        self.telemetry.metrics.record_class(class.name(), us);
        result
    }

    /// Run one job at `time` seconds, recording the call at `at`.
    ///
    /// A failure is recorded in telemetry. A fatal job stops the frame
    /// with [`ExecError::JobFailed`]; a degraded job is skipped from now
    /// on until re-enabled.
    pub fn run_job(&mut self, id: JobId, time: f64, at: SimTime) -> Result<(), ExecError> {
        let Some(entry) = self.registry.get_mut(id) else {
            return Ok(());
        };
        let mut ctx = JobContext::new(self.frame, self.frame_time, time, self.store, self.requests);
        let outcome = entry.run(&mut ctx);
        let name = entry.name().to_string();
        let class = entry.class();
        let policy = entry.policy();

        let error = match outcome {
            Ok(()) => {
                self.registry.mark_ran(id, at);
                return Ok(());
            }
            Err(error) => error,
        };
        self.registry.mark_failed(id);
        let fatal = policy == ReturnPolicy::Fatal;
        self.telemetry.job_errors.push(JobErrorRecord {
            job: Some(id),
            name: name.clone(),
            class,
            code: error.code,
            reason: error.reason.clone(),
            fatal,
        });
        if fatal {
            tracing::error!(frame = %self.frame, job = %name, %class, code = error.code, reason = %error.reason, "fatal job failure");
            return Err(ExecError::JobFailed {
                job: name,
                frame: self.frame.0,
                error,
            });
        }
        self.registry.mark_degraded(id);
        tracing::warn!(frame = %self.frame, job = %name, %class, code = error.code, reason = %error.reason, "job degraded");
        Ok(())
    }
}
