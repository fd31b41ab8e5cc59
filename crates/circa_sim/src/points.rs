//! Per-location index of everything touching the circuit grid.
//!
//! [`CircuitPoints`] answers "what is at this location" in time proportional
//! to the number of incident ends and wires. It also keeps the per-location
//! width conflicts, recomputing only the locations an edit touches.

use crate::component::{Component, EndData, Wire};
use circa_common::{BitWidth, Location};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A record of ends that disagree about the width of one node.
///
/// Entries are `(location, width)` pairs; a record is never thrown, only
/// reported, and the affected node simulates with an unknown width.
#[derive(Clone, Default, PartialEq, Eq, Hash, Debug)]
pub struct WidthIncompatibilityData {
    entries: BTreeSet<(Location, BitWidth)>,
}

impl WidthIncompatibilityData {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a conflicting end; returns `false` if it was already recorded.
    pub fn add(&mut self, location: Location, width: BitWidth) -> bool {
        self.entries.insert((location, width))
    }

    /// Adds every pair recorded in `other`.
    pub fn merge(&mut self, other: &WidthIncompatibilityData) {
        self.entries.extend(other.entries.iter().copied());
    }

    /// All recorded `(location, width)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (Location, BitWidth)> + '_ {
        self.entries.iter().copied()
    }

    /// The distinct locations involved.
    pub fn points(&self) -> Vec<Location> {
        let set: BTreeSet<Location> = self.entries.iter().map(|(l, _)| *l).collect();
        set.into_iter().collect()
    }

    /// The distinct widths involved.
    pub fn widths(&self) -> Vec<BitWidth> {
        let set: BTreeSet<BitWidth> = self.entries.iter().map(|(_, w)| *w).collect();
        set.into_iter().collect()
    }

    /// Returns `true` if the record involves `location`.
    pub fn covers(&self, location: Location) -> bool {
        self.entries.iter().any(|(l, _)| *l == location)
    }

    /// Number of recorded pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for WidthIncompatibilityData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths: Vec<String> = self.widths().iter().map(|w| w.to_string()).collect();
        let points: Vec<String> = self.points().iter().map(|p| p.to_string()).collect();
        write!(
            f,
            "incompatible widths {} at {}",
            widths.join(", "),
            points.join(", ")
        )
    }
}

#[derive(Clone, Default, Debug)]
struct LocationData {
    wires: Vec<Wire>,
    ends: Vec<(Component, EndData)>,
}

impl LocationData {
    fn is_empty(&self) -> bool {
        self.wires.is_empty() && self.ends.is_empty()
    }
}

/// Index from locations to the wires and component ends touching them.
#[derive(Clone, Default, Debug)]
pub struct CircuitPoints {
    map: HashMap<Location, LocationData>,
    indexed: HashMap<Component, Vec<EndData>>,
    incompatibility: HashMap<Location, WidthIncompatibilityData>,
}

impl CircuitPoints {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes both endpoints of a wire.
    pub fn add_wire(&mut self, wire: Wire) {
        for loc in wire.ends() {
            self.map.entry(loc).or_default().wires.push(wire);
            if wire.is_degenerate() {
                break;
            }
        }
    }

    /// Removes a wire from the index.
    pub fn remove_wire(&mut self, wire: Wire) {
        for loc in wire.ends() {
            if let Some(data) = self.map.get_mut(&loc) {
                if let Some(pos) = data.wires.iter().position(|w| *w == wire) {
                    data.wires.remove(pos);
                }
                if data.is_empty() {
                    self.map.remove(&loc);
                }
            }
        }
    }

    /// Indexes a component with the given ends, replacing any earlier entry.
    pub fn add_component(&mut self, component: &Component, ends: Vec<EndData>) {
        self.remove_component(component);
        for end in &ends {
            self.map
                .entry(end.location)
                .or_default()
                .ends
                .push((component.clone(), *end));
        }
        let touched: BTreeSet<Location> = ends.iter().map(|e| e.location).collect();
        self.indexed.insert(component.clone(), ends);
        for loc in touched {
            self.recompute(loc);
        }
    }

    /// Removes a component, returning the ends it was indexed with.
    pub fn remove_component(&mut self, component: &Component) -> Option<Vec<EndData>> {
        let ends = self.indexed.remove(component)?;
        let touched: BTreeSet<Location> = ends.iter().map(|e| e.location).collect();
        for loc in &touched {
            if let Some(data) = self.map.get_mut(loc) {
                data.ends.retain(|(c, _)| c != component);
                if data.is_empty() {
                    self.map.remove(loc);
                }
            }
        }
        for loc in touched {
            self.recompute(loc);
        }
        Some(ends)
    }

    /// The ends a component was indexed with.
    pub fn ends_of(&self, component: &Component) -> Option<&[EndData]> {
        self.indexed.get(component).map(|v| v.as_slice())
    }

    /// All occupied locations.
    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.map.keys().copied()
    }

    /// Wires with an endpoint at `loc`.
    pub fn wires_at(&self, loc: Location) -> &[Wire] {
        self.map.get(&loc).map(|d| d.wires.as_slice()).unwrap_or(&[])
    }

    /// Component ends at `loc`.
    pub fn ends_at(&self, loc: Location) -> &[(Component, EndData)] {
        self.map.get(&loc).map(|d| d.ends.as_slice()).unwrap_or(&[])
    }

    /// Distinct components with an end at `loc`.
    pub fn components_at(&self, loc: Location) -> Vec<&Component> {
        let mut ret: Vec<&Component> = Vec::new();
        for (c, _) in self.ends_at(loc) {
            if !ret.contains(&c) {
                ret.push(c);
            }
        }
        ret
    }

    /// Number of wire endpoints and component ends at `loc`.
    pub fn degree(&self, loc: Location) -> usize {
        self.map
            .get(&loc)
            .map(|d| d.wires.len() + d.ends.len())
            .unwrap_or(0)
    }

    /// The width ends at `loc` agree on, or unknown if none is known or they conflict.
    pub fn width_at(&self, loc: Location) -> BitWidth {
        if self.incompatibility.contains_key(&loc) {
            return BitWidth::UNKNOWN;
        }
        self.ends_at(loc)
            .iter()
            .map(|(_, e)| e.width)
            .find(|w| w.is_known())
            .unwrap_or(BitWidth::UNKNOWN)
    }

    /// The component claiming exclusive drive of `loc`, if any.
    pub fn exclusive_at(&self, loc: Location) -> Option<&Component> {
        self.ends_at(loc)
            .iter()
            .find(|(_, e)| e.exclusive)
            .map(|(c, _)| c)
    }

    /// Locations where more than one component claims exclusive drive.
    pub fn exclusive_conflicts(&self) -> Vec<(Location, Vec<Component>)> {
        let mut ret = Vec::new();
        for (loc, data) in &self.map {
            let mut claimants: Vec<Component> = Vec::new();
            for (c, e) in &data.ends {
                if e.exclusive && !claimants.contains(c) {
                    claimants.push(c.clone());
                }
            }
            if claimants.len() > 1 {
                ret.push((*loc, claimants));
            }
        }
        ret.sort_by_key(|(loc, _)| *loc);
        ret
    }

    /// Width conflicts between ends sharing a location.
    pub fn width_incompatibilities(&self) -> impl Iterator<Item = &WidthIncompatibilityData> {
        self.incompatibility.values()
    }

    fn recompute(&mut self, loc: Location) {
        let mut widths = self
            .ends_at(loc)
            .iter()
            .map(|(_, e)| e.width)
            .filter(|w| w.is_known());
        let Some(first) = widths.next() else {
            self.incompatibility.remove(&loc);
            return;
        };
        let mut data = WidthIncompatibilityData::new();
        data.add(loc, first);
        for w in widths {
            data.add(loc, w);
        }
        if data.len() > 1 {
            self.incompatibility.insert(loc, data);
        } else {
            self.incompatibility.remove(&loc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{and_gate, input_pin, output_pin};

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    #[test]
    fn wires_indexed_at_both_ends() {
        let mut pts = CircuitPoints::new();
        let w = Wire::new(loc(0, 0), loc(20, 0));
        pts.add_wire(w);
        assert_eq!(pts.wires_at(loc(0, 0)), &[w]);
        assert_eq!(pts.wires_at(loc(20, 0)), &[w]);
        pts.remove_wire(w);
        assert_eq!(pts.locations().count(), 0);
    }

    #[test]
    fn component_ends_and_degree() {
        let mut pts = CircuitPoints::new();
        let gate = and_gate(loc(50, 50), 2);
        pts.add_component(&gate, gate.ends());
        pts.add_wire(Wire::new(loc(50, 50), loc(80, 50)));
        assert_eq!(pts.components_at(loc(50, 50)), vec![&gate]);
        assert_eq!(pts.degree(loc(50, 50)), 2);
        assert_eq!(pts.ends_of(&gate).map(|e| e.len()), Some(3));
        assert_eq!(pts.width_at(loc(50, 50)), BitWidth::ONE);
    }

    #[test]
    fn remove_component_returns_indexed_ends() {
        let mut pts = CircuitPoints::new();
        let pin = input_pin(loc(0, 0), 4, "a");
        let ends = pin.ends();
        pts.add_component(&pin, ends.clone());
        assert_eq!(pts.remove_component(&pin), Some(ends));
        assert!(pts.components_at(loc(0, 0)).is_empty());
        assert_eq!(pts.remove_component(&pin), None);
    }

    #[test]
    fn conflicting_widths_at_one_location() {
        let mut pts = CircuitPoints::new();
        let a = input_pin(loc(0, 0), 4, "a");
        let b = output_pin(loc(0, 0), 8, "b");
        pts.add_component(&a, a.ends());
        pts.add_component(&b, b.ends());
        assert_eq!(pts.width_at(loc(0, 0)), BitWidth::UNKNOWN);
        let records: Vec<_> = pts.width_incompatibilities().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].widths(), vec![BitWidth::new(4), BitWidth::new(8)]);

        pts.remove_component(&b);
        assert_eq!(pts.width_incompatibilities().count(), 0);
        assert_eq!(pts.width_at(loc(0, 0)), BitWidth::new(4));
    }

    #[test]
    fn exclusive_conflict_detected() {
        let mut pts = CircuitPoints::new();
        let a = input_pin(loc(0, 0), 1, "a");
        let b = input_pin(loc(0, 0), 1, "b");
        pts.add_component(&a, a.ends());
        assert_eq!(pts.exclusive_at(loc(0, 0)), Some(&a));
        assert!(pts.exclusive_conflicts().is_empty());
        pts.add_component(&b, b.ends());
        let conflicts = pts.exclusive_conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].1.len(), 2);
    }

    #[test]
    fn incompatibility_display() {
        let mut data = WidthIncompatibilityData::new();
        data.add(loc(0, 0), BitWidth::new(4));
        data.add(loc(10, 0), BitWidth::new(8));
        assert_eq!(
            data.to_string(),
            "incompatible widths 4, 8 at (0,0), (10,0)"
        );
        assert!(data.covers(loc(10, 0)));
        assert!(!data.add(loc(0, 0), BitWidth::new(4)));
    }
}
