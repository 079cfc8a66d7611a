//! Strongly-typed identifiers for jobs, loops, events, state vectors and frames.

use std::fmt;

/// Identifies a registered job.
///
/// Jobs are assigned sequential IDs in registration order.
/// `JobId(n)` is the n-th job registered with the executive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for JobId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies an integration loop within the loop arena.
///
/// Parent and child loops refer to each other only through this index;
/// the arena owns every loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub u32);

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for LoopId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a monitored event condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u32);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for EventId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a state vector in the [`StateStore`](crate::StateStore).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StateId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Monotonically increasing frame counter.
///
/// Incremented once per executed frame. Only a snapshot restore
/// moves it backwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl FrameId {
    /// The following frame.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for FrameId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_their_index() {
        assert_eq!(JobId(3).to_string(), "3");
        assert_eq!(LoopId(0).to_string(), "0");
        assert_eq!(EventId::from(7).to_string(), "7");
        assert_eq!(StateId::from(2), StateId(2));
    }

    #[test]
    fn frame_id_next_increments() {
        assert_eq!(FrameId(0).next(), FrameId(1));
        assert_eq!(FrameId::default(), FrameId(0));
    }
}
