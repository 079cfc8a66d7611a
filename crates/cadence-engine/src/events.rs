//! Registered events and their detection state.

use std::sync::Arc;

use cadence_core::{EventId, LoopId, StateId};
use cadence_event::{Direction, EventDetector};
use cadence_job::{EventCondition, Job, ReturnPolicy, StageView};

/// Public view of an event's state.
#[derive(Clone, Debug, PartialEq)]
pub struct EventStatus {
    /// Event ID.
    pub id: EventId,
    /// Event name.
    pub name: String,
    /// The state vector its condition watches.
    pub state: StateId,
    /// The loop that checks it.
    pub loop_id: LoopId,
    /// Armed by configuration or control command.
    pub enabled: bool,
    /// Disarmed by a failing handler.
    pub degraded: bool,
    /// Condition value at the end of the last step.
    pub last_value: Option<f64>,
    /// Firings so far.
    pub fire_count: u64,
    /// Time (seconds) of the last firing.
    pub last_fired: Option<f64>,
}

pub(crate) struct EventSlot {
    pub id: EventId,
    pub name: String,
    pub state: StateId,
    pub loop_id: LoopId,
    /// Layout entry of `state` within the loop buffer.
    pub entry: usize,
    pub condition: Arc<dyn EventCondition>,
    pub handler: Option<Box<dyn Job>>,
    pub direction: Direction,
    pub detector: EventDetector,
    pub policy: ReturnPolicy,
    pub enabled: bool,
    pub degraded: bool,
    pub last_value: Option<f64>,
    pub fire_count: u64,
    pub last_fired: Option<f64>,
}

impl EventSlot {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.degraded
    }

    pub fn evaluate(&self, view: &StageView<'_>) -> f64 {
        self.condition.evaluate(view)
    }

    pub fn status(&self) -> EventStatus {
        EventStatus {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            loop_id: self.loop_id,
            enabled: self.enabled,
            degraded: self.degraded,
            last_value: self.last_value,
            fire_count: self.fire_count,
            last_fired: self.last_fired,
        }
    }
}

/// Every event, indexed by [`EventId`].
#[derive(Default)]
pub(crate) struct EventTable {
    slots: Vec<EventSlot>,
}

impl EventTable {
    pub fn push(&mut self, slot: EventSlot) {
        self.slots.push(slot);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, id: EventId) -> Option<&EventSlot> {
        self.slots.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: EventId) -> Option<&mut EventSlot> {
        self.slots.get_mut(id.0 as usize)
    }

    pub fn slot(&self, index: usize) -> &EventSlot {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut EventSlot {
        &mut self.slots[index]
    }

    pub fn find(&self, name: &str) -> Option<EventId> {
        self.slots.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventSlot> {
        self.slots.iter()
    }

    /// Arm an event. Clears the degraded mark and the reference value,
    /// so a condition already past zero does not fire immediately.
    pub fn enable(&mut self, id: EventId) -> bool {
        match self.get_mut(id) {
            Some(slot) => {
                slot.enabled = true;
                slot.degraded = false;
                slot.last_value = None;
                true
            }
            None => false,
        }
    }

    pub fn disable(&mut self, id: EventId) -> bool {
        match self.get_mut(id) {
            Some(slot) => {
                slot.enabled = false;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_job::condition_fn;

    fn slot(id: u32, name: &str) -> EventSlot {
        EventSlot {
            id: EventId(id),
            name: name.into(),
            state: StateId(id),
            loop_id: LoopId(0),
            entry: 0,
            condition: Arc::new(condition_fn(|v| v.own()[0])),
            handler: None,
            direction: Direction::Either,
            detector: EventDetector::default(),
            policy: ReturnPolicy::Degraded,
            enabled: true,
            degraded: false,
            last_value: Some(1.0),
            fire_count: 0,
            last_fired: None,
        }
    }

    #[test]
    fn enable_rearms_and_forgets_reference() {
        let mut table = EventTable::default();
        table.push(slot(0, "touchdown"));
        table.slot_mut(0).degraded = true;
        assert!(!table.slot(0).is_active());
        assert!(table.enable(EventId(0)));
        let s = table.slot(0);
        assert!(s.is_active());
        assert_eq!(s.last_value, None);
        assert!(table.disable(EventId(0)));
        assert!(!table.slot(0).is_active());
        assert!(!table.enable(EventId(5)));
    }

    #[test]
    fn lookup_by_name() {
        let mut table = EventTable::default();
        table.push(slot(0, "a"));
        table.push(slot(1, "b"));
        assert_eq!(table.find("b"), Some(EventId(1)));
        assert_eq!(table.find("c"), None);
        assert_eq!(table.len(), 2);
        let status = table.get(EventId(1)).unwrap().status();
        assert_eq!(status.name, "b");
        assert_eq!(status.state, StateId(1));
    }
}
