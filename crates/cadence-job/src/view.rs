//! Read-only views of an integration loop's working state.
//!
//! Integration loops gather their state vectors into one contiguous
//! buffer. A [`StateLayout`] records where each vector lives in that
//! buffer; a [`StageView`] pairs a buffer with a layout so derivative
//! and condition functions can read any vector of the loop, at the
//! stage time being evaluated.

use std::ops::Range;

use cadence_core::{StateId, StateStore};

/// Position of one state vector within a loop buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutEntry {
    /// The state vector.
    pub state: StateId,
    /// Its name.
    pub name: String,
    /// Offset of the first value.
    pub offset: usize,
    /// Number of values.
    pub len: usize,
}

impl LayoutEntry {
    /// Index range within the buffer.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Contiguous arrangement of state vectors in a loop buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateLayout {
    entries: Vec<LayoutEntry>,
    total: usize,
}

impl StateLayout {
    /// Empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a vector; returns its entry index.
    pub fn push(&mut self, state: StateId, name: impl Into<String>, len: usize) -> usize {
        self.entries.push(LayoutEntry {
            state,
            name: name.into(),
            offset: self.total,
            len,
        });
        self.total += len;
        self.entries.len() - 1
    }

    /// All entries in buffer order.
    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    /// Total buffer length.
    pub fn total_len(&self) -> usize {
        self.total
    }

    /// Entry index of a state vector.
    pub fn position(&self, state: StateId) -> Option<usize> {
        self.entries.iter().position(|e| e.state == state)
    }
}

/// A state vector's values at a stage of an integration step.
///
/// `own()` is the vector the viewing function belongs to; `state()`
/// reaches any other vector in the same loop at the stage values. Vectors
/// outside the loop are visible, at their last committed values, when the
/// view carries the owning [`StateStore`].
#[derive(Clone, Copy, Debug)]
pub struct StageView<'a> {
    time: f64,
    buffer: &'a [f64],
    layout: &'a StateLayout,
    own: usize,
    external: Option<&'a StateStore>,
}

impl<'a> StageView<'a> {
    /// View `buffer` at `time` through `layout`, owned by entry `own`.
    pub fn new(time: f64, buffer: &'a [f64], layout: &'a StateLayout, own: usize) -> Self {
        Self {
            time,
            buffer,
            layout,
            own,
            external: None,
        }
    }

    /// Also expose vectors outside the loop from `store`.
    pub fn with_external(mut self, store: &'a StateStore) -> Self {
        self.external = Some(store);
        self
    }

    /// Stage time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The owning vector's values.
    pub fn own(&self) -> &'a [f64] {
        &self.buffer[self.layout.entries[self.own].range()]
    }

    /// Another vector, from the loop buffer when it belongs to the loop.
    pub fn state(&self, id: StateId) -> Option<&'a [f64]> {
        match self.layout.position(id) {
            Some(idx) => Some(&self.buffer[self.layout.entries[idx].range()]),
            None => self.external?.get(id).map(|v| v.values()),
        }
    }

    /// Another vector by name.
    pub fn state_named(&self, name: &str) -> Option<&'a [f64]> {
        match self.layout.entries.iter().find(|e| e.name == name) {
            Some(entry) => Some(&self.buffer[entry.range()]),
            None => {
                let store = self.external?;
                store.get(store.find(name)?).map(|v| v.values())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_slices_by_layout() {
        let mut layout = StateLayout::new();
        let a = layout.push(StateId(4), "a", 2);
        let b = layout.push(StateId(7), "b", 1);
        assert_eq!(layout.total_len(), 3);
        let buffer = [1.0, 2.0, 3.0];
        let view = StageView::new(0.5, &buffer, &layout, b);
        assert_eq!(view.own(), &[3.0]);
        assert_eq!(view.state(StateId(4)), Some(&[1.0, 2.0][..]));
        assert_eq!(view.state_named("b"), Some(&[3.0][..]));
        assert_eq!(view.state(StateId(9)), None);
        assert_eq!(view.time(), 0.5);
        assert_eq!(layout.entries()[a].range(), 0..2);
    }

    #[test]
    fn external_store_fills_in_outside_vectors() {
        use cadence_core::StateDef;

        let store = StateStore::from_defs(&[
            StateDef::first_order("inside", vec![0.0]),
            StateDef::first_order("wind", vec![4.5, -1.0]),
        ]);
        let mut layout = StateLayout::new();
        layout.push(StateId(0), "inside", 1);
        let buffer = [2.0];
        let view = StageView::new(0.0, &buffer, &layout, 0);
        assert_eq!(view.state_named("wind"), None);
        let view = view.with_external(&store);
        assert_eq!(view.state(StateId(0)), Some(&[2.0][..]));
        assert_eq!(view.state(StateId(1)), Some(&[4.5, -1.0][..]));
        assert_eq!(view.state_named("wind"), Some(&[4.5, -1.0][..]));
    }
}
