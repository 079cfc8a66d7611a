//! Integration state vectors and the store that owns them.
//!
//! A [`StateVector`] holds the values and derivatives a simulation
//! object contributes to integration. The [`StateStore`] owns every
//! vector for the lifetime of the executive; integration loops and
//! jobs refer to vectors by [`StateId`] only.

use crate::id::StateId;

/// Layout of a state vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    /// Arbitrary first-order system.
    First,
    /// Second-order system: the first half holds positions, the second
    /// half the matching velocities. Symplectic integrators rely on it.
    Second,
}

/// Declaration of a state vector.
#[derive(Clone, Debug, PartialEq)]
pub struct StateDef {
    /// Unique name.
    pub name: String,
    /// Initial values. Their count fixes the vector length.
    pub initial: Vec<f64>,
    /// Layout of the values.
    pub order: Order,
}

impl StateDef {
    /// A first-order state vector.
    pub fn first_order(name: impl Into<String>, initial: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            initial,
            order: Order::First,
        }
    }

    /// A second-order state vector from matching positions and velocities.
    pub fn second_order(name: impl Into<String>, positions: &[f64], velocities: &[f64]) -> Self {
        let mut initial = positions.to_vec();
        initial.extend_from_slice(velocities);
        Self {
            name: name.into(),
            initial,
            order: Order::Second,
        }
    }
}

/// Current values and derivatives of one state vector.
#[derive(Clone, Debug, PartialEq)]
pub struct StateVector {
    name: String,
    order: Order,
    values: Vec<f64>,
    derivs: Vec<f64>,
}

impl StateVector {
    /// Name of the vector.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layout of the vector.
    pub fn order(&self) -> Order {
        self.order
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the vector has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Current values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable current values.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Derivatives at the end of the most recent integration step.
    pub fn derivs(&self) -> &[f64] {
        &self.derivs
    }

    /// Mutable derivatives.
    pub fn derivs_mut(&mut self) -> &mut [f64] {
        &mut self.derivs
    }
}

/// Owner of every state vector.
#[derive(Clone, Debug, Default)]
pub struct StateStore {
    vectors: Vec<StateVector>,
}

impl StateStore {
    /// Build a store from declarations. IDs follow declaration order.
    pub fn from_defs(defs: &[StateDef]) -> Self {
        let vectors = defs
            .iter()
            .map(|d| StateVector {
                name: d.name.clone(),
                order: d.order,
                derivs: vec![0.0; d.initial.len()],
                values: d.initial.clone(),
            })
            .collect();
        Self { vectors }
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Look up a vector ID by name.
    pub fn find(&self, name: &str) -> Option<StateId> {
        self.vectors
            .iter()
            .position(|v| v.name == name)
            .map(|i| StateId(i as u32))
    }

    /// Borrow a vector.
    pub fn get(&self, id: StateId) -> Option<&StateVector> {
        self.vectors.get(id.0 as usize)
    }

    /// Mutably borrow a vector.
    pub fn get_mut(&mut self, id: StateId) -> Option<&mut StateVector> {
        self.vectors.get_mut(id.0 as usize)
    }

    /// Iterate over `(id, vector)` in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (StateId, &StateVector)> {
        self.vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (StateId(i as u32), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_order_layout_is_positions_then_velocities() {
        let def = StateDef::second_order("ball", &[10.0, 0.0], &[0.0, 1.5]);
        assert_eq!(def.initial, vec![10.0, 0.0, 0.0, 1.5]);
        assert_eq!(def.order, Order::Second);
    }

    #[test]
    fn store_assigns_ids_in_declaration_order() {
        let store = StateStore::from_defs(&[
            StateDef::first_order("a", vec![1.0]),
            StateDef::first_order("b", vec![2.0, 3.0]),
        ]);
        assert_eq!(store.find("b"), Some(StateId(1)));
        assert_eq!(store.find("c"), None);
        let b = store.get(StateId(1)).unwrap();
        assert_eq!(b.values(), &[2.0, 3.0]);
        assert_eq!(b.derivs(), &[0.0, 0.0]);
        assert_eq!(store.iter().count(), 2);
    }

    #[test]
    fn values_are_mutable_in_place() {
        let mut store = StateStore::from_defs(&[StateDef::first_order("x", vec![1.0])]);
        store.get_mut(StateId(0)).unwrap().values_mut()[0] = 4.0;
        assert_eq!(store.get(StateId(0)).unwrap().values(), &[4.0]);
    }
}
