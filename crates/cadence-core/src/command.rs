//! Operator control commands and their receipts.
//!
//! Commands are queued and applied in submission order at the next
//! frame boundary, never mid-frame.

use crate::error::ControlError;
use crate::id::{EventId, FrameId, JobId};
use crate::time::Cycle;

/// A control command from an operator or console.
///
/// # Examples
///
/// ```
/// use cadence_core::{ControlCommand, Cycle, JobId};
///
/// let cmd = ControlCommand::SetCycle {
///     job: JobId(2),
///     cycle: Cycle::frames(4),
/// };
/// assert_eq!(cmd.name(), "set_cycle");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum ControlCommand {
    /// Suspend frame advancement.
    Freeze,
    /// Leave freeze and continue running.
    Resume,
    /// Run the given number of frames, then freeze again.
    Step {
        /// Frames to run.
        frames: u32,
    },
    /// Shut the executive down at the next frame boundary.
    Shutdown,
    /// Change the simulation-to-wall-clock ratio.
    SetRealtimeRatio {
        /// New ratio; `2.0` runs twice as fast as wall time.
        ratio: f64,
    },
    /// Change a job's cycle.
    SetCycle {
        /// Target job.
        job: JobId,
        /// New cycle.
        cycle: Cycle,
    },
    /// Enable a job, clearing any degraded mark.
    EnableJob {
        /// Target job.
        job: JobId,
    },
    /// Disable a job.
    DisableJob {
        /// Target job.
        job: JobId,
    },
    /// Enable an event.
    EnableEvent {
        /// Target event.
        event: EventId,
    },
    /// Disable an event.
    DisableEvent {
        /// Target event.
        event: EventId,
    },
}

impl ControlCommand {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Freeze => "freeze",
            Self::Resume => "resume",
            Self::Step { .. } => "step",
            Self::Shutdown => "shutdown",
            Self::SetRealtimeRatio { .. } => "set_realtime_ratio",
            Self::SetCycle { .. } => "set_cycle",
            Self::EnableJob { .. } => "enable_job",
            Self::DisableJob { .. } => "disable_job",
            Self::EnableEvent { .. } => "enable_event",
            Self::DisableEvent { .. } => "disable_event",
        }
    }
}

/// Outcome of a control command.
///
/// # Examples
///
/// ```
/// use cadence_core::command::Receipt;
/// use cadence_core::FrameId;
///
/// let receipt = Receipt {
///     seq: 0,
///     accepted: true,
///     applied_frame: Some(FrameId(5)),
///     reason: None,
/// };
/// assert!(receipt.accepted);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Submission sequence number of the command.
    pub seq: u64,
    /// Whether the command was applied.
    pub accepted: bool,
    /// The frame boundary at which the command was applied.
    pub applied_frame: Option<FrameId>,
    /// Why the command was rejected, if it was.
    pub reason: Option<ControlError>,
}

impl Receipt {
    /// A receipt for an applied command.
    pub fn applied(seq: u64, frame: FrameId) -> Self {
        Self {
            seq,
            accepted: true,
            applied_frame: Some(frame),
            reason: None,
        }
    }

    /// A receipt for a rejected command.
    pub fn rejected(seq: u64, reason: ControlError) -> Self {
        Self {
            seq,
            accepted: false,
            applied_frame: None,
            reason: Some(reason),
        }
    }
}
