//! Registration errors.

use std::error::Error;
use std::fmt;

use cadence_core::{Cycle, JobId};

use crate::class::JobClass;

/// Errors from [`JobRegistry`](crate::JobRegistry) mutations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationError {
    /// An identical `(owner, class, phase)` tuple is already registered
    /// for a class that requires uniqueness.
    Duplicate {
        /// Owning object name.
        owner: String,
        /// Job class.
        class: JobClass,
        /// Phase within the class.
        phase: u32,
    },
    /// The cycle is shorter than a frame or not a whole number of tics.
    MalformedCycle {
        /// Name of the job.
        job: String,
        /// The rejected cycle.
        cycle: Cycle,
    },
    /// Registration after the executive started running, for a job that
    /// was not declared dynamic.
    Late {
        /// Name of the job.
        job: String,
    },
    /// No job with this ID exists.
    UnknownJob {
        /// The missing ID.
        id: JobId,
    },
    /// The operation needs a cycle-dispatched job.
    NotFrameScheduled {
        /// Name of the job.
        job: String,
        /// Its class.
        class: JobClass,
    },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate {
                owner,
                class,
                phase,
            } => write!(
                f,
                "duplicate {class} job for '{owner}' at phase {phase}"
            ),
            Self::MalformedCycle { job, cycle } => {
                write!(f, "job '{job}': malformed cycle {cycle}")
            }
            Self::Late { job } => {
                write!(f, "job '{job}' registered after the executive started")
            }
            Self::UnknownJob { id } => write!(f, "no job with id {id}"),
            Self::NotFrameScheduled { job, class } => {
                write!(f, "job '{job}' ({class}) is not cycle scheduled")
            }
        }
    }
}

impl Error for RegistrationError {}
