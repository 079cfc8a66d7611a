//! Execution context handed to every [`Job`](crate::Job) call.

use cadence_core::{EventId, FrameId, SimTime, StateId, StateStore};

/// Mode changes requested by jobs, honored at the next frame boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Requests {
    /// A job asked the executive to freeze.
    pub freeze: bool,
    /// A job asked the executive to shut down.
    pub shutdown: bool,
}

/// Details of the event crossing that triggered the current job.
#[derive(Clone, Debug, PartialEq)]
pub struct EventFiring {
    /// The event.
    pub event: EventId,
    /// Its name.
    pub name: String,
    /// Located crossing time in seconds.
    pub time: f64,
    /// Condition value at the crossing time.
    pub value: f64,
}

/// Everything a job may see and touch while it runs.
///
/// State vectors are borrowed mutably for the duration of the call;
/// the executive is the only other mutator and is suspended meanwhile.
pub struct JobContext<'a> {
    frame: FrameId,
    frame_time: SimTime,
    time: f64,
    states: &'a mut StateStore,
    requests: &'a mut Requests,
    event: Option<&'a EventFiring>,
}

impl<'a> JobContext<'a> {
    /// Context for a call at `time` seconds within the frame that starts
    /// at `frame_time`.
    pub fn new(
        frame: FrameId,
        frame_time: SimTime,
        time: f64,
        states: &'a mut StateStore,
        requests: &'a mut Requests,
    ) -> Self {
        Self {
            frame,
            frame_time,
            time,
            states,
            requests,
            event: None,
        }
    }

    /// Attach the event crossing being handled.
    pub fn with_event(mut self, firing: &'a EventFiring) -> Self {
        self.event = Some(firing);
        self
    }

    /// Current frame.
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Start of the current frame, in tics.
    pub fn frame_time(&self) -> SimTime {
        self.frame_time
    }

    /// Simulation time of this call, in seconds. Differs from the frame
    /// start for loop hooks and event triggers.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The crossing that triggered this call, for event jobs.
    pub fn event(&self) -> Option<&EventFiring> {
        self.event
    }

    /// Look up a state vector by name.
    pub fn find_state(&self, name: &str) -> Option<StateId> {
        self.states.find(name)
    }

    /// Read a state vector.
    pub fn state(&self, id: StateId) -> Option<&[f64]> {
        self.states.get(id).map(|v| v.values())
    }

    /// Write a state vector.
    pub fn state_mut(&mut self, id: StateId) -> Option<&mut [f64]> {
        self.states.get_mut(id).map(|v| v.values_mut())
    }

    /// Derivatives of a state vector at the end of its last step.
    pub fn derivs(&self, id: StateId) -> Option<&[f64]> {
        self.states.get(id).map(|v| v.derivs())
    }

    /// The whole state store.
    pub fn states(&self) -> &StateStore {
        self.states
    }

    /// Ask the executive to freeze at the next frame boundary.
    pub fn request_freeze(&mut self) {
        self.requests.freeze = true;
    }

    /// Ask the executive to shut down at the next frame boundary.
    pub fn request_shutdown(&mut self) {
        self.requests.shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::StateDef;

    #[test]
    fn context_exposes_states_and_requests() {
        let mut store = StateStore::from_defs(&[StateDef::first_order("x", vec![1.0])]);
        let mut requests = Requests::default();
        {
            let mut ctx = JobContext::new(FrameId(2), SimTime(20), 0.2, &mut store, &mut requests);
            let x = ctx.find_state("x").unwrap();
            ctx.state_mut(x).unwrap()[0] = 5.0;
            assert_eq!(ctx.state(x), Some(&[5.0][..]));
            assert_eq!(ctx.frame(), FrameId(2));
            assert!(ctx.event().is_none());
            ctx.request_shutdown();
        }
        assert!(requests.shutdown);
        assert!(!requests.freeze);
        assert_eq!(store.get(StateId(0)).unwrap().values(), &[5.0]);
    }
}
