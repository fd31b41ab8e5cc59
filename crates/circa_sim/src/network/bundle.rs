//! Electrical nodes and their per-bit lanes.

use crate::ids::{BundleId, ThreadId};
use crate::points::WidthIncompatibilityData;
use circa_common::{BitWidth, Location, Logic};
use std::collections::BTreeSet;

/// One electrical node: every location joined by wires (or shared tunnel labels).
#[derive(Clone, Debug)]
pub struct WireBundle {
    points: BTreeSet<Location>,
    width: BitWidth,
    width_determinant: Option<Location>,
    incompatibility: Option<WidthIncompatibilityData>,
    pull: Logic,
    threads: Option<Vec<ThreadId>>,
    splitter_attached: bool,
}

impl Default for WireBundle {
    fn default() -> Self {
        Self {
            points: BTreeSet::new(),
            width: BitWidth::UNKNOWN,
            width_determinant: None,
            incompatibility: None,
            pull: Logic::Unknown,
            threads: None,
            splitter_attached: false,
        }
    }
}

impl WireBundle {
    /// Creates an empty bundle of unknown width.
    pub fn new() -> Self {
        Self::default()
    }

    /// Locations belonging to this node.
    pub fn points(&self) -> impl Iterator<Item = Location> + '_ {
        self.points.iter().copied()
    }

    /// Returns `true` if `loc` belongs to this node.
    pub fn contains(&self, loc: Location) -> bool {
        self.points.contains(&loc)
    }

    /// The node's width; unknown while ends disagree.
    pub fn width(&self) -> BitWidth {
        if self.incompatibility.is_some() {
            BitWidth::UNKNOWN
        } else {
            self.width
        }
    }

    /// The location of the end that first fixed the width.
    pub fn width_determinant(&self) -> Option<Location> {
        self.width_determinant
    }

    /// The conflict record, if ends disagree about the width.
    pub fn incompatibility(&self) -> Option<&WidthIncompatibilityData> {
        self.incompatibility.as_ref()
    }

    /// Weak value applied to bits nothing drives.
    pub fn pull_value(&self) -> Logic {
        self.pull
    }

    /// Per-bit threads, present once the width is final and consistent.
    pub fn threads(&self) -> Option<&[ThreadId]> {
        self.threads.as_deref()
    }

    /// Returns `true` if a splitter routes bits of this node.
    pub fn is_splitter_attached(&self) -> bool {
        self.splitter_attached
    }

    pub(crate) fn insert_point(&mut self, loc: Location) {
        self.points.insert(loc);
    }

    /// Applies an end's width; returns `true` if the public width or the
    /// conflict record changed.
    pub(crate) fn set_width(&mut self, width: BitWidth, loc: Location) -> bool {
        if !width.is_known() {
            return false;
        }
        if let Some(data) = &mut self.incompatibility {
            return data.add(loc, width);
        }
        if !self.width.is_known() {
            self.width = width;
            self.width_determinant = Some(loc);
            return true;
        }
        if self.width == width {
            return false;
        }
        let mut data = WidthIncompatibilityData::new();
        if let Some(det) = self.width_determinant {
            data.add(det, self.width);
        }
        data.add(loc, width);
        self.incompatibility = Some(data);
        true
    }

    pub(crate) fn add_pull(&mut self, pull: Logic) {
        self.pull = self.pull.combine(pull);
    }

    pub(crate) fn mark_splitter_attached(&mut self) {
        self.splitter_attached = true;
    }

    pub(crate) fn set_threads(&mut self, threads: Option<Vec<ThreadId>>) {
        self.threads = threads;
    }

    /// Folds another node into this one after a wire joins them.
    pub(crate) fn absorb(&mut self, other: WireBundle) {
        self.points.extend(other.points);
        if let Some(det) = other.width_determinant {
            self.set_width(other.width, det);
        }
        if let Some(data) = other.incompatibility {
            for (loc, width) in data.entries() {
                self.set_width(width, loc);
            }
        }
        self.add_pull(other.pull);
        self.splitter_attached |= other.splitter_attached;
        self.threads = None;
    }
}

/// One bit lane shared by every bundle bit a splitter routes together.
#[derive(Clone, Debug)]
pub struct WireThread {
    lanes: Vec<(BundleId, u32)>,
    pull: Logic,
}

impl Default for WireThread {
    fn default() -> Self {
        Self {
            lanes: Vec::new(),
            pull: Logic::Unknown,
        }
    }
}

impl WireThread {
    /// The `(bundle, bit)` pairs carried by this lane.
    pub fn lanes(&self) -> &[(BundleId, u32)] {
        &self.lanes
    }

    /// Combined pull of the bundles this lane crosses.
    pub fn pull_value(&self) -> Logic {
        self.pull
    }

    pub(crate) fn add_lane(&mut self, bundle: BundleId, bit: u32, pull: Logic) {
        self.lanes.push((bundle, bit));
        self.pull = self.pull.combine(pull);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(x: i32) -> Location {
        Location::new(x, 0)
    }

    #[test]
    fn first_known_width_determines() {
        let mut b = WireBundle::new();
        assert!(!b.set_width(BitWidth::UNKNOWN, loc(0)));
        assert!(b.set_width(BitWidth::new(4), loc(10)));
        assert_eq!(b.width(), BitWidth::new(4));
        assert_eq!(b.width_determinant(), Some(loc(10)));
        assert!(!b.set_width(BitWidth::new(4), loc(20)));
    }

    #[test]
    fn conflicting_width_records_instead_of_failing() {
        let mut b = WireBundle::new();
        b.set_width(BitWidth::new(4), loc(0));
        assert!(b.set_width(BitWidth::new(8), loc(10)));
        assert_eq!(b.width(), BitWidth::UNKNOWN);
        let data = b.incompatibility().unwrap();
        assert_eq!(data.widths(), vec![BitWidth::new(4), BitWidth::new(8)]);
    }

    #[test]
    fn third_width_extends_same_record() {
        let mut b = WireBundle::new();
        b.set_width(BitWidth::new(4), loc(0));
        b.set_width(BitWidth::new(8), loc(10));
        b.set_width(BitWidth::new(16), loc(20));
        let data = b.incompatibility().unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data.points(), vec![loc(0), loc(10), loc(20)]);
    }

    #[test]
    fn pulls_combine() {
        let mut b = WireBundle::new();
        b.add_pull(Logic::One);
        assert_eq!(b.pull_value(), Logic::One);
        b.add_pull(Logic::Zero);
        assert_eq!(b.pull_value(), Logic::Error);
    }

    #[test]
    fn absorb_merges_points_and_widths() {
        let mut a = WireBundle::new();
        a.insert_point(loc(0));
        a.set_width(BitWidth::new(2), loc(0));
        let mut b = WireBundle::new();
        b.insert_point(loc(10));
        b.set_width(BitWidth::new(3), loc(10));
        b.add_pull(Logic::One);
        a.absorb(b);
        assert!(a.contains(loc(10)));
        assert_eq!(a.width(), BitWidth::UNKNOWN);
        assert_eq!(a.pull_value(), Logic::One);
        assert!(a.threads().is_none());
    }

    #[test]
    fn thread_pull_combines_lanes() {
        let mut t = WireThread::default();
        t.add_lane(BundleId::from_raw(0), 0, Logic::Unknown);
        t.add_lane(BundleId::from_raw(1), 2, Logic::Zero);
        assert_eq!(t.pull_value(), Logic::Zero);
        assert_eq!(t.lanes().len(), 2);
    }
}
