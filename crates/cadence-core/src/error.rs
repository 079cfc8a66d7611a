//! Error types shared across the executive.
//!
//! Organized by subsystem: job execution, control command handling,
//! and the run-time errors that stop the frame loop. Configuration
//! and restore errors live with the engine that validates them.

use std::error::Error;
use std::fmt;

use crate::id::LoopId;

// ── JobError ───────────────────────────────────────────────────────

/// A non-zero return from a job.
///
/// Jobs report failure with a numeric code and a human-readable reason.
/// What happens next depends on the job's return policy: a fatal job
/// stops the executive, a degraded job is skipped on later frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobError {
    /// Job-defined return code. Never zero.
    pub code: i32,
    /// Human-readable description of the failure.
    pub reason: String,
}

impl JobError {
    /// Build a job error. A code of zero is promoted to `-1`.
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        Self {
            code: if code == 0 { -1 } else { code },
            reason: reason.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job returned {}: {}", self.code, self.reason)
    }
}

impl Error for JobError {}

// ── ControlError ───────────────────────────────────────────────────

/// Why a control command was rejected.
///
/// Used in [`Receipt::reason`](crate::command::Receipt) to explain a
/// rejected command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlError {
    /// The control queue is at capacity.
    QueueFull,
    /// No job or event with the given ID exists.
    UnknownTarget,
    /// The target job is not scheduled by cycle.
    NotFrameScheduled,
    /// The requested real-time ratio is zero, negative, or not finite.
    InvalidRatio,
    /// The requested cycle is shorter than a frame or not a whole number of tics.
    MalformedCycle,
    /// The command does not apply in the current executive mode.
    InvalidTransition,
    /// The executive is shutting down.
    ShuttingDown,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "control queue full"),
            Self::UnknownTarget => write!(f, "unknown job or event"),
            Self::NotFrameScheduled => write!(f, "job is not cycle scheduled"),
            Self::InvalidRatio => write!(f, "invalid real-time ratio"),
            Self::MalformedCycle => write!(f, "malformed cycle"),
            Self::InvalidTransition => write!(f, "command not valid in current mode"),
            Self::ShuttingDown => write!(f, "executive is shutting down"),
        }
    }
}

impl Error for ControlError {}

// ── ExecError ──────────────────────────────────────────────────────

/// Run-time errors that stop the frame loop.
///
/// Any of these moves the executive to `ShuttingDown` with the
/// triggering job and frame recorded.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecError {
    /// A job with a fatal return policy failed.
    JobFailed {
        /// Name of the failing job.
        job: String,
        /// Frame in which the failure happened.
        frame: u64,
        /// The job's error.
        error: JobError,
    },
    /// An adaptive integrator could not meet its error bound after the
    /// maximum number of step-size reductions.
    IntegrationRetryExhausted {
        /// The loop whose step failed.
        loop_id: LoopId,
        /// Simulation time (seconds) at the start of the failing step.
        time: f64,
        /// The last attempted step size (seconds).
        step: f64,
        /// Weighted error norm of the last attempt.
        error_norm: f64,
    },
    /// The integrator rejected its input. Indicates a loop whose layout
    /// no longer matches its state vectors.
    IntegrationFailed {
        /// The loop.
        loop_id: LoopId,
        /// What the integrator reported.
        reason: String,
    },
    /// A state vector became NaN or infinite during integration.
    NonFiniteState {
        /// The loop that produced the value.
        loop_id: LoopId,
        /// Simulation time (seconds) at the end of the failing step.
        time: f64,
    },
    /// More event firings in one loop step than the configured limit.
    EventStorm {
        /// Name of the event that exceeded the limit.
        event: String,
        /// Frame in which the storm was detected.
        frame: u64,
        /// Firings counted in the step.
        firings: u32,
    },
    /// The operation is not valid in the executive's current mode.
    InvalidMode {
        /// The rejected operation.
        operation: &'static str,
        /// The mode at the time of the call.
        mode: &'static str,
    },
    /// The executive has terminated.
    Terminated,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JobFailed { job, frame, error } => {
                write!(f, "job '{job}' failed in frame {frame}: {error}")
            }
            Self::IntegrationRetryExhausted {
                loop_id,
                time,
                step,
                error_norm,
            } => write!(
                f,
                "loop {loop_id}: step retries exhausted at t={time} (h={step:e}, error={error_norm:e})"
            ),
            Self::IntegrationFailed { loop_id, reason } => {
                write!(f, "loop {loop_id}: integration failed: {reason}")
            }
            Self::NonFiniteState { loop_id, time } => {
                write!(f, "loop {loop_id}: non-finite state at t={time}")
            }
            Self::EventStorm {
                event,
                frame,
                firings,
            } => write!(
                f,
                "event '{event}' stormed in frame {frame} ({firings} firings in one step)"
            ),
            Self::InvalidMode { operation, mode } => {
                write!(f, "{operation} is not valid while {mode}")
            }
            Self::Terminated => write!(f, "executive has terminated"),
        }
    }
}

impl Error for ExecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::JobFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_error_never_zero() {
        assert_eq!(JobError::new(0, "x").code, -1);
        assert_eq!(JobError::new(3, "x").code, 3);
    }

    #[test]
    fn job_failed_chains_source() {
        let err = ExecError::JobFailed {
            job: "thruster".into(),
            frame: 12,
            error: JobError::new(2, "valve stuck"),
        };
        assert_eq!(
            err.to_string(),
            "job 'thruster' failed in frame 12: job returned 2: valve stuck"
        );
        assert!(err.source().is_some());
        assert!(ExecError::Terminated.source().is_none());
    }
}
