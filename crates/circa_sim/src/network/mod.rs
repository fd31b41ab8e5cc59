//! The wire bundle network of one circuit.
//!
//! Locations joined by wires (or by tunnels sharing a label) form one
//! [`WireBundle`]. Every bundle whose width is known and consistent is split
//! into per-bit [`WireThread`]s; a splitter makes a bit of one bundle and a
//! bit of another share a thread.
//!
//! A network is immutable once built and is shared through `Arc` by every
//! circuit state. Adding a wire or an ordinary component is applied
//! incrementally to a copy; anything that can re-route bits (splitters,
//! tunnels, pull resistors) or removes connectivity triggers a full rebuild
//! at the end of the transaction. Each revision carries a fresh epoch so
//! states can tell their cached values are out of date.

mod bundle;
mod union_find;
mod valued;

pub use bundle::{WireBundle, WireThread};
pub use union_find::UnionFind;
pub use valued::WireState;

use crate::attrs::Attribute;
use crate::component::{Component, EndData, FactoryKind, Wire};
use crate::ids::{next_network_epoch, BundleId, ThreadId};
use crate::library::splitter_routes;
use crate::points::{CircuitPoints, WidthIncompatibilityData};
use circa_common::{BitWidth, Location, Logic};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Bundles, threads and sink lists derived from a circuit's wiring.
#[derive(Clone, Debug)]
pub struct BundleNetwork {
    epoch: u64,
    point_bundles: HashMap<Location, BundleId>,
    bundles: Vec<Option<WireBundle>>,
    threads: Vec<WireThread>,
    free_threads: Vec<ThreadId>,
    sinks: HashMap<Location, Vec<Component>>,
    degree: HashMap<Location, usize>,
}

impl Default for BundleNetwork {
    fn default() -> Self {
        Self {
            epoch: next_network_epoch(),
            point_bundles: HashMap::new(),
            bundles: Vec::new(),
            threads: Vec::new(),
            free_threads: Vec::new(),
            sinks: HashMap::new(),
            degree: HashMap::new(),
        }
    }
}

impl BundleNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the network from scratch.
    pub fn build(points: &CircuitPoints, components: &[Component]) -> Self {
        let mut locs: Vec<Location> = points.locations().collect();
        locs.sort();
        let index: HashMap<Location, usize> =
            locs.iter().enumerate().map(|(i, l)| (*l, i)).collect();

        let mut uf = UnionFind::new(locs.len());
        for (i, loc) in locs.iter().enumerate() {
            for wire in points.wires_at(*loc) {
                if let Some(j) = wire.other_end(*loc).and_then(|o| index.get(&o)) {
                    uf.unite(i, *j);
                }
            }
        }

        let mut tunnels: BTreeMap<String, usize> = BTreeMap::new();
        for comp in components.iter().filter(|c| c.kind() == FactoryKind::Tunnel) {
            let label = comp.label();
            if label.is_empty() {
                continue;
            }
            for end in points.ends_of(comp).unwrap_or(&[]) {
                let Some(&i) = index.get(&end.location) else {
                    continue;
                };
                match tunnels.entry(label.clone()) {
                    Entry::Occupied(e) => {
                        uf.unite(*e.get(), i);
                    }
                    Entry::Vacant(e) => {
                        e.insert(i);
                    }
                }
            }
        }

        let mut net = Self::new();
        let mut root_ids: HashMap<usize, BundleId> = HashMap::new();
        for (i, loc) in locs.iter().enumerate() {
            let root = uf.find(i);
            let bundles = &mut net.bundles;
            let id = *root_ids.entry(root).or_insert_with(|| {
                bundles.push(Some(WireBundle::new()));
                BundleId::from_raw((bundles.len() - 1) as u32)
            });
            if let Some(bundle) = net.bundle_mut(id) {
                bundle.insert_point(*loc);
            }
            net.point_bundles.insert(*loc, id);
        }

        for loc in &locs {
            let Some(id) = net.bundle_id_at(*loc) else {
                continue;
            };
            for (_, end) in points.ends_at(*loc) {
                if let Some(bundle) = net.bundle_mut(id) {
                    bundle.set_width(end.width, *loc);
                }
            }
        }

        for comp in components {
            let kind = comp.kind();
            if kind != FactoryKind::PullResistor && kind != FactoryKind::Splitter {
                continue;
            }
            let pull = comp.with_attrs(|a| a.logic(Attribute::PULL).unwrap_or(Logic::Unknown));
            for end in points.ends_of(comp).unwrap_or(&[]) {
                let Some(id) = net.bundle_id_at(end.location) else {
                    continue;
                };
                if let Some(bundle) = net.bundle_mut(id) {
                    match kind {
                        FactoryKind::PullResistor => bundle.add_pull(pull),
                        _ => bundle.mark_splitter_attached(),
                    }
                }
            }
        }

        net.build_threads(points, components);

        for loc in &locs {
            net.degree.insert(*loc, points.degree(*loc));
            net.refresh_sinks(points, *loc);
        }

        debug!(
            epoch = net.epoch,
            bundles = net.bundle_count(),
            threads = net.threads.len(),
            "built bundle network"
        );
        net
    }

    fn build_threads(&mut self, points: &CircuitPoints, components: &[Component]) {
        let mut thread_uf = UnionFind::new(0);
        let mut raw: BTreeMap<BundleId, Vec<usize>> = BTreeMap::new();
        for (id, bundle) in self.bundles() {
            let width = bundle.width();
            if width.is_known() {
                raw.insert(id, (0..width.bits()).map(|_| thread_uf.push()).collect());
            }
        }

        for comp in components.iter().filter(|c| c.kind() == FactoryKind::Splitter) {
            let Some(ends) = points.ends_of(comp) else {
                continue;
            };
            let Some(combined) = ends.first().and_then(|e| self.bundle_id_at(e.location)) else {
                continue;
            };
            let routes = comp.with_attrs(splitter_routes);
            for (bit, (end_index, end_bit)) in routes.into_iter().enumerate() {
                let Some(split) = ends.get(end_index).and_then(|e| self.bundle_id_at(e.location))
                else {
                    continue;
                };
                let a = raw.get(&combined).and_then(|t| t.get(bit)).copied();
                let b = raw
                    .get(&split)
                    .and_then(|t| t.get(end_bit as usize))
                    .copied();
                if let (Some(a), Some(b)) = (a, b) {
                    thread_uf.unite(a, b);
                }
            }
        }

        let mut thread_ids: HashMap<usize, ThreadId> = HashMap::new();
        for (id, raw_threads) in raw {
            let pull = self.bundle(id).map(|b| b.pull_value()).unwrap_or(Logic::Unknown);
            let mut ids = Vec::with_capacity(raw_threads.len());
            for (bit, t) in raw_threads.into_iter().enumerate() {
                let root = thread_uf.find(t);
                let threads = &mut self.threads;
                let tid = *thread_ids.entry(root).or_insert_with(|| {
                    threads.push(WireThread::default());
                    ThreadId::from_raw((threads.len() - 1) as u32)
                });
                self.threads[tid.as_raw() as usize].add_lane(id, bit as u32, pull);
                ids.push(tid);
            }
            if let Some(bundle) = self.bundle_mut(id) {
                bundle.set_threads(Some(ids));
            }
        }
    }

    /// Revision stamp; changes whenever the network is rebuilt or edited.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The bundle containing `loc`.
    pub fn bundle_id_at(&self, loc: Location) -> Option<BundleId> {
        self.point_bundles.get(&loc).copied()
    }

    /// The bundle containing `loc`.
    pub fn bundle_at(&self, loc: Location) -> Option<&WireBundle> {
        self.bundle_id_at(loc).and_then(|id| self.bundle(id))
    }

    /// Looks up a bundle by ID.
    pub fn bundle(&self, id: BundleId) -> Option<&WireBundle> {
        self.bundles.get(id.as_raw() as usize)?.as_ref()
    }

    fn bundle_mut(&mut self, id: BundleId) -> Option<&mut WireBundle> {
        self.bundles.get_mut(id.as_raw() as usize)?.as_mut()
    }

    /// Live bundles in ID order.
    pub fn bundles(&self) -> impl Iterator<Item = (BundleId, &WireBundle)> {
        self.bundles
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.as_ref().map(|b| (BundleId::from_raw(i as u32), b)))
    }

    /// Number of live bundles.
    pub fn bundle_count(&self) -> usize {
        self.bundles.iter().filter(|b| b.is_some()).count()
    }

    /// Upper bound on bundle IDs, for sizing per-bundle tables.
    pub(crate) fn bundle_capacity(&self) -> usize {
        self.bundles.len()
    }

    /// Looks up a thread by ID.
    pub fn thread(&self, id: ThreadId) -> Option<&WireThread> {
        self.threads.get(id.as_raw() as usize)
    }

    /// Upper bound on thread IDs.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Width of the bundle containing `loc`.
    pub fn width_at(&self, loc: Location) -> BitWidth {
        self.bundle_at(loc)
            .map(|b| b.width())
            .unwrap_or(BitWidth::UNKNOWN)
    }

    /// The end location that fixed the width of the bundle containing `loc`.
    pub fn width_determinant(&self, loc: Location) -> Option<Location> {
        self.bundle_at(loc).and_then(|b| b.width_determinant())
    }

    /// Width conflicts between ends on the same bundle.
    pub fn incompatibilities(&self) -> impl Iterator<Item = &WidthIncompatibilityData> {
        self.bundles().filter_map(|(_, b)| b.incompatibility())
    }

    /// Components other than splitters with an end at `loc`.
    pub fn sinks_at(&self, loc: Location) -> &[Component] {
        self.sinks.get(&loc).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Number of wire endpoints and component ends at `loc`.
    pub fn degree(&self, loc: Location) -> usize {
        self.degree.get(&loc).copied().unwrap_or(0)
    }

    /// Returns `true` if `loc` belongs to some bundle.
    pub fn contains(&self, loc: Location) -> bool {
        self.point_bundles.contains_key(&loc)
    }

    /// Every location covered by the network.
    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.point_bundles.keys().copied()
    }

    fn refresh_sinks(&mut self, points: &CircuitPoints, loc: Location) {
        let mut sinks: Vec<Component> = Vec::new();
        for (c, _) in points.ends_at(loc) {
            if c.kind() != FactoryKind::Splitter && !sinks.contains(c) {
                sinks.push(c.clone());
            }
        }
        if sinks.is_empty() {
            self.sinks.remove(&loc);
        } else {
            self.sinks.insert(loc, sinks);
        }
    }

    fn ensure_bundle(&mut self, loc: Location) -> BundleId {
        if let Some(id) = self.bundle_id_at(loc) {
            return id;
        }
        let mut bundle = WireBundle::new();
        bundle.insert_point(loc);
        self.bundles.push(Some(bundle));
        let id = BundleId::from_raw((self.bundles.len() - 1) as u32);
        self.point_bundles.insert(loc, id);
        self.refresh_threads(id);
        id
    }

    /// Returns a bundle's threads to the free list. Bundles edited in place
    /// carry no splitter, so their threads are not shared with any other.
    fn release_threads(&mut self, id: BundleId) {
        let Some(bundle) = self.bundle_mut(id) else {
            return;
        };
        let Some(old) = bundle.threads().map(<[_]>::to_vec) else {
            return;
        };
        bundle.set_threads(None);
        self.free_threads.extend(old);
    }

    fn alloc_thread(&mut self, thread: WireThread) -> ThreadId {
        match self.free_threads.pop() {
            Some(tid) => {
                self.threads[tid.as_raw() as usize] = thread;
                tid
            }
            None => {
                self.threads.push(thread);
                ThreadId::from_raw((self.threads.len() - 1) as u32)
            }
        }
    }

    /// Gives a bundle fresh threads matching its current width, reusing
    /// released thread slots.
    fn refresh_threads(&mut self, id: BundleId) {
        self.release_threads(id);
        let Some(bundle) = self.bundle(id) else {
            return;
        };
        let width = bundle.width();
        let pull = bundle.pull_value();
        let threads = if width.is_known() {
            let mut ids = Vec::with_capacity(width.bits() as usize);
            for bit in 0..width.bits() {
                let mut thread = WireThread::default();
                thread.add_lane(id, bit, pull);
                ids.push(self.alloc_thread(thread));
            }
            Some(ids)
        } else {
            None
        };
        if let Some(bundle) = self.bundle_mut(id) {
            bundle.set_threads(threads);
        }
    }

    fn is_splitter_attached(&self, loc: Location) -> bool {
        self.bundle_at(loc)
            .map(|b| b.is_splitter_attached())
            .unwrap_or(false)
    }

    /// Applies a newly added wire in place. Returns `false` when the change
    /// needs a full rebuild instead; the network is then left untouched.
    pub(crate) fn try_add_wire(&mut self, wire: Wire, points: &CircuitPoints) -> bool {
        if wire.ends().iter().any(|l| self.is_splitter_attached(*l)) {
            return false;
        }
        let a = self.ensure_bundle(wire.end0());
        let b = self.ensure_bundle(wire.end1());
        if a != b {
            self.release_threads(b);
            let absorbed = self.bundles[b.as_raw() as usize].take();
            if let Some(other) = absorbed {
                for loc in other.points() {
                    self.point_bundles.insert(loc, a);
                }
                if let Some(bundle) = self.bundle_mut(a) {
                    bundle.absorb(other);
                }
            }
            self.refresh_threads(a);
        }
        for loc in wire.ends() {
            self.degree.insert(loc, points.degree(loc));
        }
        self.epoch = next_network_epoch();
        true
    }

    /// Applies a newly indexed component in place. Returns `false` when the
    /// component can re-route bits and the network must be rebuilt.
    pub(crate) fn try_add_component(
        &mut self,
        component: &Component,
        ends: &[EndData],
        points: &CircuitPoints,
    ) -> bool {
        match component.kind() {
            FactoryKind::Tunnel | FactoryKind::PullResistor | FactoryKind::Splitter => {
                return false
            }
            _ => {}
        }
        if ends.iter().any(|e| self.is_splitter_attached(e.location)) {
            return false;
        }
        for end in ends {
            let id = self.ensure_bundle(end.location);
            let changed = self
                .bundle_mut(id)
                .map(|b| b.set_width(end.width, end.location))
                .unwrap_or(false);
            if changed {
                self.refresh_threads(id);
            }
            self.degree.insert(end.location, points.degree(end.location));
            self.refresh_sinks(points, end.location);
        }
        self.epoch = next_network_epoch();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{input_pin, output_pin, pull_resistor, splitter, tunnel};

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    fn index(components: &[Component], wires: &[Wire]) -> CircuitPoints {
        let mut points = CircuitPoints::new();
        for c in components {
            points.add_component(c, c.ends());
        }
        for w in wires {
            points.add_wire(*w);
        }
        points
    }

    #[test]
    fn wires_join_locations() {
        let a = input_pin(loc(0, 0), 1, "a");
        let b = output_pin(loc(40, 0), 1, "b");
        let wires = [Wire::new(loc(0, 0), loc(20, 0)), Wire::new(loc(20, 0), loc(40, 0))];
        let comps = vec![a, b];
        let points = index(&comps, &wires);
        let net = BundleNetwork::build(&points, &comps);
        assert_eq!(net.bundle_count(), 1);
        assert_eq!(net.bundle_id_at(loc(0, 0)), net.bundle_id_at(loc(40, 0)));
        assert_eq!(net.width_at(loc(20, 0)), BitWidth::ONE);
        assert_eq!(net.bundle_at(loc(0, 0)).unwrap().threads().unwrap().len(), 1);
    }

    #[test]
    fn conflicting_widths_recorded_once() {
        let a = input_pin(loc(0, 0), 4, "a");
        let b = output_pin(loc(20, 0), 8, "b");
        let wires = [Wire::new(loc(0, 0), loc(20, 0))];
        let comps = vec![a, b];
        let points = index(&comps, &wires);
        let net = BundleNetwork::build(&points, &comps);
        assert_eq!(net.width_at(loc(0, 0)), BitWidth::UNKNOWN);
        let all: Vec<_> = net.incompatibilities().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].widths(), vec![BitWidth::new(4), BitWidth::new(8)]);
        assert!(net.bundle_at(loc(0, 0)).unwrap().threads().is_none());
    }

    #[test]
    fn tunnels_with_same_label_join() {
        let t1 = tunnel(loc(0, 0), 1, "bus");
        let t2 = tunnel(loc(100, 100), 1, "bus");
        let t3 = tunnel(loc(200, 0), 1, "other");
        let comps = vec![t1, t2, t3];
        let points = index(&comps, &[]);
        let net = BundleNetwork::build(&points, &comps);
        assert_eq!(net.bundle_id_at(loc(0, 0)), net.bundle_id_at(loc(100, 100)));
        assert_ne!(net.bundle_id_at(loc(0, 0)), net.bundle_id_at(loc(200, 0)));
    }

    #[test]
    fn pull_resistor_sets_bundle_pull() {
        let pin = output_pin(loc(0, 0), 1, "o");
        let pull = pull_resistor(loc(0, 0), Logic::Zero);
        let comps = vec![pin, pull];
        let points = index(&comps, &[]);
        let net = BundleNetwork::build(&points, &comps);
        assert_eq!(net.bundle_at(loc(0, 0)).unwrap().pull_value(), Logic::Zero);
        let thread = net.bundle_at(loc(0, 0)).unwrap().threads().unwrap()[0];
        assert_eq!(net.thread(thread).unwrap().pull_value(), Logic::Zero);
    }

    #[test]
    fn splitter_shares_threads() {
        // 2-bit bus at (0,0); split ends at (20,0) and (20,10).
        let s = splitter(loc(0, 0), 2, 2);
        let hi = output_pin(loc(20, 10), 1, "hi");
        let lo = output_pin(loc(20, 0), 1, "lo");
        let comps = vec![s, hi, lo];
        let points = index(&comps, &[]);
        let net = BundleNetwork::build(&points, &comps);
        let bus = net.bundle_at(loc(0, 0)).unwrap().threads().unwrap().to_vec();
        let lo_t = net.bundle_at(loc(20, 0)).unwrap().threads().unwrap()[0];
        let hi_t = net.bundle_at(loc(20, 10)).unwrap().threads().unwrap()[0];
        assert_eq!(bus, vec![lo_t, hi_t]);
        assert!(net.bundle_at(loc(0, 0)).unwrap().is_splitter_attached());
        assert!(net.sinks_at(loc(0, 0)).is_empty());
    }

    #[test]
    fn incremental_wire_matches_rebuild() {
        let a = input_pin(loc(0, 0), 1, "a");
        let b = output_pin(loc(40, 0), 1, "b");
        let comps = vec![a, b];
        let mut points = index(&comps, &[]);
        let mut net = BundleNetwork::build(&points, &comps);
        let before = net.epoch();
        let wire = Wire::new(loc(0, 0), loc(40, 0));
        points.add_wire(wire);
        assert!(net.try_add_wire(wire, &points));
        assert_ne!(net.epoch(), before);
        assert_eq!(net.bundle_id_at(loc(0, 0)), net.bundle_id_at(loc(40, 0)));
        assert_eq!(net.degree(loc(0, 0)), 2);
        let rebuilt = BundleNetwork::build(&points, &comps);
        assert_eq!(rebuilt.bundle_count(), net.bundle_count());
        assert_eq!(rebuilt.width_at(loc(40, 0)), net.width_at(loc(40, 0)));
    }

    #[test]
    fn incremental_edits_reuse_thread_slots() {
        let a = input_pin(loc(0, 0), 1, "a");
        let b = output_pin(loc(1000, 0), 1, "b");
        let comps = vec![a, b];
        let mut points = index(&comps, &[]);
        let mut net = BundleNetwork::build(&points, &comps);
        assert_eq!(net.thread_count(), 2);
        for i in 0..100 {
            let wire = Wire::new(loc(i * 10, 0), loc(i * 10 + 10, 0));
            points.add_wire(wire);
            assert!(net.try_add_wire(wire, &points));
        }
        assert_eq!(net.bundle_count(), 1);
        assert_eq!(net.thread_count(), 2);
        let threads = net.bundle_at(loc(500, 0)).unwrap().threads().unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(net.thread(threads[0]).unwrap().lanes().len(), 1);
    }

    #[test]
    fn rerouting_components_refuse_incremental_add() {
        let mut net = BundleNetwork::new();
        let points = CircuitPoints::new();
        let t = tunnel(loc(0, 0), 1, "x");
        let ends = t.ends();
        assert!(!net.try_add_component(&t, &ends, &points));
    }
}
