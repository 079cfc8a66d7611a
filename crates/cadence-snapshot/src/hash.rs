//! FNV-1a hashing for checksums, configuration fingerprints and fast
//! trajectory comparison.
//!
//! Not cryptographic. Floats are hashed by bit pattern, so `-0.0` and
//! `0.0` differ and identical NaN payloads hash equal.

use crate::types::SnapshotImage;

/// FNV-1a offset basis for 64-bit.
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
/// FNV-1a prime for 64-bit.
const FNV_PRIME: u64 = 0x00000100000001B3;

/// Incremental 64-bit FNV-1a hasher.
///
/// ```
/// use cadence_snapshot::Fnv1a;
///
/// let mut a = Fnv1a::new();
/// a.write_str("loop");
/// a.write_f64(0.01);
/// let mut b = Fnv1a::new();
/// b.write_str("loop");
/// b.write_f64(0.01);
/// assert_eq!(a.finish(), b.finish());
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Fnv1a {
    state: u64,
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}

impl Fnv1a {
    /// Hasher at the offset basis.
    pub fn new() -> Self {
        Self { state: FNV_OFFSET }
    }

    /// Feed one byte.
    #[inline]
    pub fn write_u8(&mut self, byte: u8) {
        self.state = (self.state ^ byte as u64).wrapping_mul(FNV_PRIME);
    }

    /// Feed raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_u8(b);
        }
    }

    /// Feed a u32 as 4 LE bytes.
    pub fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    /// Feed a u64 as 8 LE bytes.
    pub fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    /// Feed an i64 as 8 LE bytes.
    pub fn write_i64(&mut self, v: i64) {
        self.write_bytes(&v.to_le_bytes());
    }

    /// Feed an f64 by bit pattern.
    pub fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    /// Feed a length-prefixed string, so `("ab", "c")` and `("a", "bc")`
    /// hash differently.
    pub fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }

    /// Current hash value.
    pub fn finish(&self) -> u64 {
        self.state
    }
}

/// FNV-1a over a byte slice. Used as the blob checksum.
pub fn checksum(bytes: &[u8]) -> u64 {
    let mut h = Fnv1a::new();
    h.write_bytes(bytes);
    h.finish()
}

/// Hash of the simulated trajectory point an image describes.
///
/// Covers the frame, time, every state value and derivative, and event
/// firing counts. Scheduling bookkeeping and integrator memory are left
/// out: two runs at the same trajectory point hash equal even if one of
/// them was restored from a snapshot.
pub fn state_hash(image: &SnapshotImage) -> u64 {
    let mut h = Fnv1a::new();
    h.write_u64(image.frame);
    h.write_i64(image.time_tics);
    for (idx, state) in image.states.iter().enumerate() {
        // Fold in the index at each boundary so order matters.
        h.write_u32(idx as u32);
        for &v in &state.values {
            h.write_f64(v);
        }
        for &d in &state.derivs {
            h.write_f64(d);
        }
    }
    for event in &image.events {
        h.write_u64(event.fire_count);
    }
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventRecord, StateRecord};

    fn image(values: Vec<Vec<f64>>) -> SnapshotImage {
        SnapshotImage {
            frame: 5,
            time_tics: 500,
            states: values
                .into_iter()
                .enumerate()
                .map(|(i, v)| StateRecord {
                    name: format!("s{i}"),
                    derivs: vec![0.0; v.len()],
                    values: v,
                })
                .collect(),
            ..SnapshotImage::default()
        }
    }

    #[test]
    fn empty_input_is_offset_basis() {
        assert_eq!(checksum(&[]), FNV_OFFSET);
        assert_eq!(Fnv1a::new().finish(), FNV_OFFSET);
    }

    #[test]
    fn known_vector() {
        // FNV-1a 64 of "a".
        assert_eq!(checksum(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn same_state_same_hash() {
        let a = image(vec![vec![1.0, 2.0], vec![3.0]]);
        let b = image(vec![vec![1.0, 2.0], vec![3.0]]);
        assert_eq!(state_hash(&a), state_hash(&b));
    }

    #[test]
    fn value_and_order_changes_change_hash() {
        let a = image(vec![vec![1.0, 2.0], vec![3.0]]);
        let b = image(vec![vec![1.0, 2.5], vec![3.0]]);
        let c = image(vec![vec![3.0], vec![1.0, 2.0]]);
        assert_ne!(state_hash(&a), state_hash(&b));
        assert_ne!(state_hash(&a), state_hash(&c));
    }

    #[test]
    fn firings_are_part_of_the_trajectory() {
        let mut a = image(vec![vec![1.0]]);
        a.events.push(EventRecord {
            name: "impact".into(),
            fire_count: 1,
            ..EventRecord::default()
        });
        let mut b = a.clone();
        b.events[0].fire_count = 2;
        assert_ne!(state_hash(&a), state_hash(&b));
    }

    #[test]
    fn scheduling_memory_is_not_part_of_the_trajectory() {
        let a = image(vec![vec![1.0]]);
        let mut b = a.clone();
        b.pending_steps = 4;
        b.realtime_ratio = 2.0;
        assert_eq!(state_hash(&a), state_hash(&b));
    }
}
