//! Job classes and return-code policies.

use std::fmt;

/// The category that fixes where a job runs.
///
/// A running frame executes, in order: `TopOfFrame`, `Environment`,
/// `DynamicEvent`, the integration loops (which call `Derivative` and
/// `Integration` jobs), `Scheduled`, `Log`, `EndOfFrame`. The remaining
/// classes run on mode transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobClass {
    /// Once, before the first frame.
    Initialization,
    /// First in every frame.
    TopOfFrame,
    /// External environment updates, before dynamics.
    Environment,
    /// Pre-integration event arming and dynamic updates.
    DynamicEvent,
    /// State derivative evaluation inside an integration loop.
    Derivative,
    /// Post-step hook of an integration loop.
    Integration,
    /// Periodic model work after dynamics.
    Scheduled,
    /// Data logging after scheduled work.
    Log,
    /// Last in every frame.
    EndOfFrame,
    /// Once, on entering freeze.
    FreezeInit,
    /// Every frame period while frozen.
    Freeze,
    /// Once, on leaving freeze.
    Unfreeze,
    /// After a snapshot has been restored.
    Restart,
    /// Before a snapshot is captured.
    Checkpoint,
    /// Once, during teardown.
    Shutdown,
}

impl JobClass {
    /// Every class, in declaration order.
    pub const ALL: [JobClass; 15] = [
        JobClass::Initialization,
        JobClass::TopOfFrame,
        JobClass::Environment,
        JobClass::DynamicEvent,
        JobClass::Derivative,
        JobClass::Integration,
        JobClass::Scheduled,
        JobClass::Log,
        JobClass::EndOfFrame,
        JobClass::FreezeInit,
        JobClass::Freeze,
        JobClass::Unfreeze,
        JobClass::Restart,
        JobClass::Checkpoint,
        JobClass::Shutdown,
    ];

    /// Lowercase class name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Initialization => "initialization",
            Self::TopOfFrame => "top_of_frame",
            Self::Environment => "environment",
            Self::DynamicEvent => "dynamic_event",
            Self::Derivative => "derivative",
            Self::Integration => "integration",
            Self::Scheduled => "scheduled",
            Self::Log => "log",
            Self::EndOfFrame => "end_of_frame",
            Self::FreezeInit => "freeze_init",
            Self::Freeze => "freeze",
            Self::Unfreeze => "unfreeze",
            Self::Restart => "restart",
            Self::Checkpoint => "checkpoint",
            Self::Shutdown => "shutdown",
        }
    }

    /// Stable numeric tag used in snapshots.
    pub fn tag(self) -> u8 {
        Self::ALL.iter().position(|c| *c == self).unwrap_or(0) as u8
    }

    /// Inverse of [`tag`](Self::tag).
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Whether jobs of this class are dispatched by cycle within
    /// running frames. Other classes run every time they are invoked.
    pub fn frame_dispatched(self) -> bool {
        matches!(
            self,
            Self::TopOfFrame
                | Self::Environment
                | Self::DynamicEvent
                | Self::Scheduled
                | Self::Log
                | Self::EndOfFrame
        )
    }

    /// Whether an identical `(owner, class, phase)` tuple is rejected.
    pub fn requires_unique(self) -> bool {
        matches!(
            self,
            Self::Derivative | Self::Integration | Self::DynamicEvent
        )
    }

    /// Return policy applied when a job does not choose one.
    pub fn default_policy(self) -> ReturnPolicy {
        match self {
            Self::Initialization | Self::Derivative | Self::Integration | Self::Restart => {
                ReturnPolicy::Fatal
            }
            _ => ReturnPolicy::Degraded,
        }
    }
}

impl fmt::Display for JobClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a job failure does to the executive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReturnPolicy {
    /// Stop the executive.
    Fatal,
    /// Log a warning and skip the job until it is re-enabled.
    Degraded,
}
