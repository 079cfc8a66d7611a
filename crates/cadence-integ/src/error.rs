//! Integrator errors.

use std::error::Error;
use std::fmt;

use cadence_core::JobError;

/// Errors from integrator construction and stepping.
#[derive(Clone, Debug, PartialEq)]
pub enum IntegError {
    /// A derivative job failed.
    Derivative(JobError),
    /// The adaptive step could not meet its tolerance.
    RetryExhausted {
        /// Start time (seconds) of the failing substep.
        time: f64,
        /// Last attempted substep size.
        step: f64,
        /// Weighted error norm of the last attempt.
        error_norm: f64,
    },
    /// The state became NaN or infinite.
    NonFinite {
        /// Time (seconds) at the end of the offending step.
        time: f64,
    },
    /// Segment layout does not match the state buffer.
    InvalidLayout {
        /// Description of the mismatch.
        reason: String,
    },
    /// Adaptive configuration is invalid.
    InvalidConfig {
        /// Description of the violated invariant.
        reason: String,
    },
    /// A buffer had the wrong length.
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Length supplied.
        found: usize,
    },
}

impl fmt::Display for IntegError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Derivative(e) => write!(f, "derivative evaluation failed: {e}"),
            Self::RetryExhausted {
                time,
                step,
                error_norm,
            } => write!(
                f,
                "step retries exhausted at t={time} (h={step:e}, error={error_norm:e})"
            ),
            Self::NonFinite { time } => write!(f, "non-finite state at t={time}"),
            Self::InvalidLayout { reason } => write!(f, "invalid state layout: {reason}"),
            Self::InvalidConfig { reason } => write!(f, "invalid adaptive config: {reason}"),
            Self::DimensionMismatch { expected, found } => {
                write!(f, "state length {found}, expected {expected}")
            }
        }
    }
}

impl Error for IntegError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Derivative(e) => Some(e),
            _ => None,
        }
    }
}

impl From<JobError> for IntegError {
    fn from(e: JobError) -> Self {
        Self::Derivative(e)
    }
}
