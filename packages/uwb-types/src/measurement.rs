//! Per-anchor distance measurements and the per-cycle measurement set.

use serde::{Deserialize, Serialize};

use crate::address::NodeAddress;

/// One completed ranging exchange with one anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub anchor: NodeAddress,
    pub distance_m: f32,
}

impl Measurement {
    pub fn new(anchor: NodeAddress, distance_m: f32) -> Self {
        Self { anchor, distance_m }
    }

    /// Empty table slot (what the node reports for unused entries)
    pub const fn empty() -> Self {
        Self { anchor: NodeAddress::NONE, distance_m: 0.0 }
    }

    /// A slot counts only with a real anchor address and a nonzero, finite distance
    pub fn is_valid(&self) -> bool {
        !self.anchor.is_none() && self.distance_m != 0.0 && self.distance_m.is_finite()
    }
}

// ── Measurement set (one scan cycle) ──────────────────────────────────────────

/// Measurements gathered during one scan cycle.
///
/// Insertion order is kept. Each anchor appears at most once: a second report
/// from the same anchor replaces the first in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSet {
    entries: Vec<Measurement>,
    capacity: Option<usize>,
}

impl MeasurementSet {
    pub fn new() -> Self { Self::default() }

    /// Set that refuses new anchors once `capacity` distinct anchors are held
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity), capacity: Some(capacity) }
    }

    /// Record a measurement. Returns `false` when a new anchor does not fit.
    pub fn record(&mut self, m: Measurement) -> bool {
        if let Some(slot) = self.entries.iter_mut().find(|e| e.anchor == m.anchor) {
            *slot = m;
            return true;
        }
        if self.is_full() {
            return false;
        }
        self.entries.push(m);
        true
    }

    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.entries.len() >= cap)
    }

    pub fn contains(&self, anchor: NodeAddress) -> bool {
        self.entries.iter().any(|e| e.anchor == anchor)
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn clear(&mut self) { self.entries.clear(); }

    pub fn iter(&self) -> impl Iterator<Item = &Measurement> { self.entries.iter() }

    /// Only the valid measurements, in insertion order
    pub fn valid(&self) -> impl Iterator<Item = &Measurement> {
        self.entries.iter().filter(|m| m.is_valid())
    }

    pub fn valid_count(&self) -> usize { self.valid().count() }

    /// Fixed-width view padded with empty slots, as served over the transport
    pub fn to_slots(&self, width: usize) -> Vec<Measurement> {
        let mut slots: Vec<Measurement> = self.entries.iter().take(width).copied().collect();
        slots.resize(width, Measurement::empty());
        slots
    }
}

impl FromIterator<Measurement> for MeasurementSet {
    fn from_iter<I: IntoIterator<Item = Measurement>>(iter: I) -> Self {
        let mut set = MeasurementSet::new();
        for m in iter {
            set.record(m);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_rules() {
        assert!(!Measurement::new(NodeAddress::NONE, 5.0).is_valid());
        assert!(!Measurement::new(NodeAddress::anchor(7), 0.0).is_valid());
        assert!(!Measurement::new(NodeAddress::anchor(7), f32::NAN).is_valid());
        assert!(Measurement::new(NodeAddress::anchor(7), 5.0).is_valid());
    }

    #[test]
    fn test_valid_filter_preserves_order() {
        let set: MeasurementSet = [
            Measurement::new(NodeAddress::anchor(3), 1.0),
            Measurement::new(NodeAddress::NONE, 2.0),
            Measurement::new(NodeAddress::anchor(1), 3.0),
            Measurement::new(NodeAddress::anchor(2), 0.0),
        ]
        .into_iter()
        .collect();
        let valid: Vec<u16> = set.valid().map(|m| m.anchor.raw()).collect();
        assert_eq!(valid, vec![3, 1]);
    }

    #[test]
    fn test_duplicate_anchor_last_writer_wins() {
        let mut set = MeasurementSet::new();
        set.record(Measurement::new(NodeAddress::anchor(1), 1.0));
        set.record(Measurement::new(NodeAddress::anchor(2), 2.0));
        set.record(Measurement::new(NodeAddress::anchor(1), 9.0));
        assert_eq!(set.len(), 2);
        let first = set.iter().next().unwrap();
        assert_eq!(first.anchor, NodeAddress::anchor(1));
        assert_eq!(first.distance_m, 9.0);
    }

    #[test]
    fn test_capacity_and_slots() {
        let mut set = MeasurementSet::with_capacity(2);
        assert!(set.record(Measurement::new(NodeAddress::anchor(1), 1.0)));
        assert!(set.record(Measurement::new(NodeAddress::anchor(2), 2.0)));
        assert!(set.is_full());
        assert!(!set.record(Measurement::new(NodeAddress::anchor(3), 3.0)));
        assert!(set.record(Measurement::new(NodeAddress::anchor(2), 2.5)));

        let slots = set.to_slots(4);
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[1].distance_m, 2.5);
        assert_eq!(slots[3], Measurement::empty());
    }

    #[test]
    fn test_serializes_address_as_plain_number() {
        let json = serde_json::to_string(&Measurement::new(NodeAddress::anchor(4), 1.5)).unwrap();
        assert_eq!(json, r#"{"anchor":4,"distance_m":1.5}"#);
    }
}
