//! Per-state wire values on top of a shared [`BundleNetwork`].

use super::BundleNetwork;
use crate::ids::BundleId;
use circa_common::{Location, Logic, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Cached bundle and thread values of one circuit state.
#[derive(Clone, Debug)]
pub struct WireState {
    network: Arc<BundleNetwork>,
    bus_driven: Vec<Value>,
    thread_values: Vec<Logic>,
}

impl WireState {
    /// Starts with nothing driven.
    pub fn new(network: Arc<BundleNetwork>) -> Self {
        Self {
            bus_driven: vec![Value::NIL; network.bundle_capacity()],
            thread_values: vec![Logic::Unknown; network.thread_count()],
            network,
        }
    }

    /// The network these values belong to.
    pub fn network(&self) -> &Arc<BundleNetwork> {
        &self.network
    }

    /// Epoch of the network these values belong to.
    pub fn epoch(&self) -> u64 {
        self.network.epoch()
    }

    /// Recomputes every bus touched by `dirty`.
    ///
    /// `driven` resolves the combined driver value at one location. Returns
    /// the new value of every location on every affected bus; a dirty
    /// location outside the network keeps whatever its drivers give it.
    pub fn propagate(
        &mut self,
        dirty: &[Location],
        driven: impl Fn(Location) -> Value,
    ) -> Vec<(Location, Value)> {
        let net = Arc::clone(&self.network);
        let mut out = Vec::new();
        let mut dirty_buses: BTreeSet<BundleId> = BTreeSet::new();
        for loc in dirty {
            match net.bundle_id_at(*loc) {
                Some(id) => {
                    dirty_buses.insert(id);
                }
                None => out.push((*loc, driven(*loc))),
            }
        }

        let mut dirty_threads = BTreeSet::new();
        let mut affected: BTreeSet<BundleId> = BTreeSet::new();
        for id in dirty_buses {
            let Some(bundle) = net.bundle(id) else {
                continue;
            };
            let local = bundle
                .points()
                .fold(Value::NIL, |acc, p| acc.combine(driven(p)));
            self.bus_driven[id.as_raw() as usize] = local;
            match bundle.threads() {
                Some(threads) => dirty_threads.extend(threads.iter().copied()),
                None => {
                    affected.insert(id);
                }
            }
        }

        for tid in dirty_threads {
            let Some(thread) = net.thread(tid) else {
                continue;
            };
            let mut bit = Logic::Unknown;
            for (bus, index) in thread.lanes() {
                bit = bit.combine(self.bus_driven[bus.as_raw() as usize].get(*index));
                affected.insert(*bus);
            }
            if bit == Logic::Unknown {
                bit = thread.pull_value();
            }
            self.thread_values[tid.as_raw() as usize] = bit;
        }

        for id in affected {
            let Some(bundle) = net.bundle(id) else {
                continue;
            };
            let value = match bundle.threads() {
                Some(threads) => {
                    let bits: Vec<Logic> = threads
                        .iter()
                        .map(|t| self.thread_values[t.as_raw() as usize])
                        .collect();
                    Value::from_logic(&bits)
                }
                None => self.bus_driven[id.as_raw() as usize]
                    .pull_each_bit_towards(bundle.pull_value()),
            };
            out.extend(bundle.points().map(|p| (p, value)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Wire};
    use crate::library::{input_pin, output_pin, pull_resistor, splitter};
    use crate::points::CircuitPoints;
    use circa_common::BitWidth;
    use std::collections::HashMap;

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    fn network(comps: &[Component], wires: &[Wire]) -> Arc<BundleNetwork> {
        let mut points = CircuitPoints::new();
        for c in comps {
            points.add_component(c, c.ends());
        }
        for w in wires {
            points.add_wire(*w);
        }
        Arc::new(BundleNetwork::build(&points, comps))
    }

    #[test]
    fn single_driver_reaches_every_point() {
        let comps = vec![input_pin(loc(0, 0), 1, "a"), output_pin(loc(40, 0), 1, "b")];
        let net = network(&comps, &[Wire::new(loc(0, 0), loc(40, 0))]);
        let mut ws = WireState::new(net);
        let drivers: HashMap<Location, Value> = [(loc(0, 0), Value::TRUE)].into();
        let out = ws.propagate(&[loc(0, 0)], |l| {
            drivers.get(&l).copied().unwrap_or(Value::NIL)
        });
        let got: HashMap<Location, Value> = out.into_iter().collect();
        assert_eq!(got[&loc(40, 0)], Value::TRUE);
        assert_eq!(got[&loc(0, 0)], Value::TRUE);
    }

    #[test]
    fn undriven_bit_takes_pull() {
        let comps = vec![output_pin(loc(0, 0), 1, "o"), pull_resistor(loc(0, 0), Logic::One)];
        let net = network(&comps, &[]);
        let mut ws = WireState::new(net);
        let out = ws.propagate(&[loc(0, 0)], |_| Value::NIL);
        assert_eq!(out, vec![(loc(0, 0), Value::TRUE)]);
    }

    #[test]
    fn disagreeing_drivers_give_error() {
        let comps = vec![input_pin(loc(0, 0), 1, "a"), input_pin(loc(20, 0), 1, "b")];
        let net = network(&comps, &[Wire::new(loc(0, 0), loc(20, 0))]);
        let mut ws = WireState::new(net);
        let drivers: HashMap<Location, Value> =
            [(loc(0, 0), Value::TRUE), (loc(20, 0), Value::FALSE)].into();
        let out = ws.propagate(&[loc(0, 0)], |l| {
            drivers.get(&l).copied().unwrap_or(Value::NIL)
        });
        assert!(out.iter().all(|(_, v)| *v == Value::ERROR));
    }

    #[test]
    fn splitter_routes_bits_both_ways() {
        let comps = vec![
            splitter(loc(0, 0), 2, 2),
            input_pin(loc(0, 0), 2, "bus"),
            output_pin(loc(20, 0), 1, "lo"),
            output_pin(loc(20, 10), 1, "hi"),
        ];
        let net = network(&comps, &[]);
        let mut ws = WireState::new(net);
        let bus: Value = "10".parse().unwrap();
        let out = ws.propagate(&[loc(0, 0)], |l| if l == loc(0, 0) { bus } else { Value::NIL });
        let got: HashMap<Location, Value> = out.into_iter().collect();
        assert_eq!(got[&loc(20, 0)], Value::FALSE);
        assert_eq!(got[&loc(20, 10)], Value::TRUE);
        assert_eq!(got[&loc(0, 0)].width(), BitWidth::new(2));
    }
}
