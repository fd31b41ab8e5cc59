//! The event-driven propagator.
//!
//! Component outputs become timed [`SetData`] events in a priority queue.
//! Each step takes every event due at the earliest pending time, keeps the
//! latest one per driver and location, records them as causes, and then
//! drains dirty work in two phases across the whole state tree: dirty
//! points are redistributed over their bundles, then every component
//! touching a changed point recomputes its outputs, which schedules further
//! events. [`Propagator::propagate`] repeats steps until nothing is pending
//! or the iteration limit declares the circuit oscillating.

use crate::circuit::{Circuit, CircuitEvent, CircuitListener};
use crate::component::{Component, Element, FactoryKind};
use crate::error::SimError;
use crate::ids::{ComponentId, StateId};
use crate::instance::InstanceState;
use crate::library::PinState;
use crate::state::{CircuitState, StateTree};
use circa_common::{Location, Value};
use circa_config::SimConfig;
use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// One scheduled value assignment.
#[derive(Clone, Debug)]
pub struct SetData {
    /// Simulated time at which the value takes effect.
    pub time: u64,
    /// Scheduling order; breaks ties between equal times.
    pub serial: u64,
    /// The state the location belongs to.
    pub state: StateId,
    /// Where the value is asserted.
    pub location: Location,
    /// The component asserting it.
    pub cause: Component,
    /// The asserted value.
    pub value: Value,
}

impl PartialEq for SetData {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.serial == other.serial
    }
}

impl Eq for SetData {}

impl PartialOrd for SetData {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SetData {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.serial).cmp(&(other.time, other.serial))
    }
}

/// How a call to [`Propagator::propagate`] ended.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PropagationOutcome {
    /// No further value changes are pending.
    Quiesced,
    /// The iteration limit was reached with work still pending.
    Oscillating,
}

impl PropagationOutcome {
    /// Returns `true` for [`PropagationOutcome::Oscillating`].
    pub fn is_oscillating(self) -> bool {
        self == PropagationOutcome::Oscillating
    }
}

/// The simulation data components can reach while propagating.
#[derive(Clone, Debug)]
pub(crate) struct SimCore {
    pub(crate) tree: StateTree,
    pub(crate) queue: BinaryHeap<Reverse<SetData>>,
    pub(crate) time: u64,
    pub(crate) next_serial: u64,
    pub(crate) ticks: u64,
    pub(crate) config: SimConfig,
    pub(crate) value_changes: u64,
}

impl SimCore {
    pub(crate) fn enqueue(
        &mut self,
        state: StateId,
        location: Location,
        cause: &Component,
        value: Value,
        delay: u64,
    ) {
        self.next_serial += 1;
        self.queue.push(Reverse(SetData {
            time: self.time + delay,
            serial: self.next_serial,
            state,
            location,
            cause: cause.clone(),
            value,
        }));
    }

    fn has_work(&self) -> bool {
        !self.queue.is_empty() || self.tree.has_dirty()
    }

    /// Applies every event due at the earliest pending time.
    fn apply_due_events(&mut self) {
        let Some(Reverse(first)) = self.queue.peek() else {
            return;
        };
        let now = first.time;
        self.time = now;
        let mut latest: HashMap<(StateId, ComponentId, Location), SetData> = HashMap::new();
        while self.queue.peek().is_some_and(|Reverse(e)| e.time == now) {
            let Some(Reverse(event)) = self.queue.pop() else {
                break;
            };
            let key = (event.state, event.cause.id(), event.location);
            match latest.get(&key) {
                Some(prev) if prev.serial > event.serial => {}
                _ => {
                    latest.insert(key, event);
                }
            }
        }
        let mut due: Vec<SetData> = latest.into_values().collect();
        due.sort_by_key(|e| e.serial);
        for event in due {
            if let Some(state) = self.tree.get_mut(event.state) {
                if state.set_cause(&event.cause, event.location, event.value, event.serial) {
                    state.mark_point_dirty(event.location);
                }
            }
        }
    }

    /// One propagation step. Returns the `(state, location)` pairs whose
    /// value changed, or `None` if there was nothing to do.
    fn step(&mut self) -> Option<Vec<(StateId, Location)>> {
        if !self.has_work() {
            return None;
        }
        self.apply_due_events();

        let order = self.tree.preorder();
        let mut changed = Vec::new();
        for &id in &order {
            if let Some(state) = self.tree.get_mut(id) {
                let locs = state.propagate_wires();
                self.value_changes += locs.len() as u64;
                changed.extend(locs.into_iter().map(|l| (id, l)));
            }
        }

        for &id in &order {
            let Some(state) = self.tree.get(id) else {
                continue;
            };
            let circuit = state.circuit().clone();
            for component in state.drain_dirty_components() {
                let Some(ends) = circuit.with_points(|p| p.ends_of(&component).map(<[_]>::to_vec))
                else {
                    continue;
                };
                let factory = Arc::clone(component.factory());
                let is_pin = component.kind() == FactoryKind::Pin;
                let mut instance = InstanceState::new(self, id, component, ends);
                factory.propagate(&mut instance);
                if is_pin {
                    instance.mark_parent_dirty();
                }
            }
        }
        trace!(time = self.time, changed = changed.len(), "propagation step");
        Some(changed)
    }
}

/// Collects topology events for the propagator that registered it.
#[derive(Default)]
struct EventInbox {
    events: Mutex<Vec<(Circuit, CircuitEvent)>>,
}

impl CircuitListener for EventInbox {
    fn circuit_changed(&self, circuit: &Circuit, event: &CircuitEvent) {
        self.events.lock().push((circuit.clone(), event.clone()));
    }
}

/// Drives one simulation of a circuit hierarchy.
pub struct Propagator {
    circuit: Circuit,
    core: SimCore,
    inbox: Arc<EventInbox>,
    listening: HashSet<u64>,
    oscillating: bool,
    oscillation_points: Vec<(StateId, Location)>,
}

impl Propagator {
    /// Starts a simulation of `circuit` with default limits.
    pub fn new(circuit: &Circuit) -> Self {
        Self::with_config(circuit, SimConfig::default())
    }

    /// Starts a simulation of `circuit`.
    pub fn with_config(circuit: &Circuit, config: SimConfig) -> Self {
        let mut propagator = Self {
            circuit: circuit.clone(),
            core: SimCore {
                tree: StateTree::new(circuit),
                queue: BinaryHeap::new(),
                time: 0,
                next_serial: 0,
                ticks: 0,
                config,
                value_changes: 0,
            },
            inbox: Arc::new(EventInbox::default()),
            listening: HashSet::new(),
            oscillating: false,
            oscillation_points: Vec::new(),
        };
        propagator.listen_all();
        propagator
    }

    /// The simulated top-level circuit.
    pub fn root_circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// The root state's ID.
    pub fn root_state(&self) -> StateId {
        self.core.tree.root()
    }

    fn root(&self) -> Option<&CircuitState> {
        self.core.tree.get(self.core.tree.root())
    }

    /// The state tree.
    pub fn tree(&self) -> &StateTree {
        &self.core.tree
    }

    /// Looks up one state.
    pub fn state(&self, id: StateId) -> Result<&CircuitState, SimError> {
        self.core.tree.state(id)
    }

    /// The limits this simulation runs with.
    pub fn config(&self) -> &SimConfig {
        &self.core.config
    }

    /// Current simulated time.
    pub fn time(&self) -> u64 {
        self.core.time
    }

    /// Clock ticks since start or the last reset.
    pub fn ticks(&self) -> u64 {
        self.core.ticks
    }

    /// Total number of location value changes so far.
    pub fn value_changes(&self) -> u64 {
        self.core.value_changes
    }

    /// Returns `true` if the last propagation hit the iteration limit.
    pub fn is_oscillating(&self) -> bool {
        self.oscillating
    }

    /// Locations that kept changing near the end of an oscillating run.
    pub fn oscillation_points(&self) -> &[(StateId, Location)] {
        &self.oscillation_points
    }

    /// Returns `true` if events or dirty work are pending.
    pub fn is_pending(&self) -> bool {
        self.core.has_work()
    }

    fn listen_all(&mut self) {
        for circuit in self.core.tree.circuits() {
            if self.listening.insert(circuit.serial()) {
                circuit.add_listener(&self.inbox);
            }
        }
    }

    /// Applies queued topology events and adopts rebuilt networks.
    fn sync(&mut self) {
        let events = std::mem::take(&mut *self.inbox.events.lock());
        let tree = &mut self.core.tree;
        for (circuit, event) in &events {
            let ids = tree.states_of(circuit);
            match event {
                CircuitEvent::Add(Element::Component(c))
                | CircuitEvent::Invalidate(c)
                | CircuitEvent::AttributeChanged { component: c, .. } => {
                    for id in &ids {
                        if let Some(state) = tree.get(*id) {
                            state.mark_component_dirty(c);
                        }
                    }
                }
                CircuitEvent::Remove(Element::Component(c)) => {
                    for id in &ids {
                        if let Some(state) = tree.get_mut(*id) {
                            state.remove_causes_of(c);
                        }
                    }
                }
                CircuitEvent::Clear => {
                    for id in &ids {
                        if let Some(state) = tree.get_mut(*id) {
                            state.clear_causes();
                        }
                    }
                }
                CircuitEvent::TransactionDone(map) => {
                    if let Err(err) = tree.apply_transaction(circuit, map) {
                        error!(%err, circuit = %circuit, "state migration failed");
                    }
                }
                CircuitEvent::Add(Element::Wire(_))
                | CircuitEvent::Remove(Element::Wire(_))
                | CircuitEvent::CircuitAttributeChanged { .. } => {}
            }
        }
        for id in tree.preorder() {
            let Some(state) = tree.get_mut(id) else {
                continue;
            };
            let network = state.circuit().network();
            if state.sync_network(network) {
                trace!(state = %id, "adopted rebuilt network");
            }
        }
        if !events.is_empty() {
            debug!(events = events.len(), "applied topology events");
        }
    }

    /// Runs steps until quiescence or the iteration limit.
    pub fn propagate(&mut self) -> PropagationOutcome {
        self.sync();
        self.oscillating = false;
        self.oscillation_points.clear();
        let limit = self.core.config.propagation.iteration_limit;
        let watch = self.core.config.propagation.oscillation_watch_threshold();
        let mut iterations = 0u32;
        let mut watched: HashSet<(StateId, Location)> = HashSet::new();
        let outcome = loop {
            let Some(changed) = self.core.step() else {
                break PropagationOutcome::Quiesced;
            };
            iterations += 1;
            if iterations >= watch {
                watched.extend(changed);
            }
            if iterations >= limit && self.core.has_work() {
                break PropagationOutcome::Oscillating;
            }
        };
        self.listen_all();
        if outcome.is_oscillating() {
            self.oscillating = true;
            let mut points: Vec<_> = watched.into_iter().collect();
            points.sort();
            warn!(
                iterations,
                points = points.len(),
                circuit = %self.circuit,
                "oscillation apparent"
            );
            self.oscillation_points = points;
        } else {
            trace!(iterations, "propagation quiesced");
        }
        outcome
    }

    /// Runs a single step. Returns `false` if nothing was pending.
    pub fn step(&mut self) -> bool {
        self.sync();
        let worked = self.core.step().is_some();
        self.listen_all();
        worked
    }

    /// Advances every clock in every state by `ticks`. Pending work is left
    /// for the next [`propagate`](Self::propagate).
    pub fn tick(&mut self, ticks: u64) {
        self.sync();
        self.core.ticks += ticks;
        let now = self.core.ticks;
        for id in self.core.tree.preorder() {
            let Some(state) = self.core.tree.get(id) else {
                continue;
            };
            let circuit = state.circuit().clone();
            for clock in circuit.clocks() {
                let Some(ends) = circuit.with_points(|p| p.ends_of(&clock).map(<[_]>::to_vec))
                else {
                    continue;
                };
                let factory = Arc::clone(clock.factory());
                let mut instance = InstanceState::new(&mut self.core, id, clock.clone(), ends);
                if factory.tick(&mut instance, now) {
                    if let Some(state) = self.core.tree.get(id) {
                        state.mark_component_dirty(&clock);
                    }
                }
            }
        }
        trace!(ticks = now, "ticked clocks");
    }

    /// Clears every value, driver and pending event; the hierarchy survives.
    pub fn reset(&mut self) {
        self.sync();
        self.core.queue.clear();
        self.core.time = 0;
        self.core.ticks = 0;
        self.core.tree.reset();
        self.oscillating = false;
        self.oscillation_points.clear();
        debug!(circuit = %self.circuit, "reset simulation");
    }

    /// An independent copy of this simulation, pending work included.
    pub fn fork(&mut self) -> Propagator {
        self.sync();
        let mut forked = Propagator {
            circuit: self.circuit.clone(),
            core: self.core.clone(),
            inbox: Arc::new(EventInbox::default()),
            listening: HashSet::new(),
            oscillating: self.oscillating,
            oscillation_points: self.oscillation_points.clone(),
        };
        forked.listen_all();
        forked
    }

    /// Schedules a component in the root state for recomputation.
    pub fn mark_component_dirty(&mut self, component: &Component) {
        if let Some(root) = self.root() {
            root.mark_component_dirty(component);
        }
    }

    /// The value at `loc` in the root state.
    pub fn value_at(&self, loc: Location) -> Value {
        self.root().map_or(Value::NIL, |s| s.value_at(loc))
    }

    /// The value at `loc` in any state.
    pub fn value_in(&self, state: StateId, loc: Location) -> Result<Value, SimError> {
        Ok(self.state(state)?.value_at(loc))
    }

    /// Drives a root-level input pin. Takes effect on the next propagation.
    pub fn set_pin_value(&mut self, pin: &Component, value: Value) -> Result<(), SimError> {
        let expected = check_pin(pin)?;
        if value.width() != expected {
            return Err(SimError::WidthMismatch {
                expected,
                found: value.width(),
            });
        }
        let root = self.core.tree.root();
        if let Some(state) = self.core.tree.get_mut(root) {
            state.set_data(pin, crate::state::ComponentData::Owned(Box::new(PinState { value })));
            state.mark_component_dirty(pin);
        }
        Ok(())
    }

    /// The value a root-level pin sees (output pins) or drives (input pins).
    pub fn pin_value(&self, pin: &Component) -> Result<Value, SimError> {
        let width = check_pin(pin)?;
        let value = self.value_at(pin.location());
        Ok(if value.is_nil() {
            Value::unknown(width)
        } else {
            value
        })
    }
}

fn check_pin(pin: &Component) -> Result<circa_common::BitWidth, SimError> {
    if pin.kind() != FactoryKind::Pin {
        return Err(SimError::NotAPin {
            component: pin.to_string(),
        });
    }
    Ok(pin.with_attrs(|a| a.width()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Wire;
    use crate::library::{and_gate, input_pin, output_pin};
    use crate::mutation::CircuitMutation;

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    #[test]
    fn events_order_by_time_then_serial() {
        let gate = and_gate(loc(0, 0), 2);
        let mk = |time, serial| SetData {
            time,
            serial,
            state: StateId::from_raw(0),
            location: loc(0, 0),
            cause: gate.clone(),
            value: Value::TRUE,
        };
        let mut heap = BinaryHeap::new();
        heap.push(Reverse(mk(2, 1)));
        heap.push(Reverse(mk(1, 3)));
        heap.push(Reverse(mk(1, 2)));
        let order: Vec<(u64, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|Reverse(e)| (e.time, e.serial))
            .collect();
        assert_eq!(order, vec![(1, 2), (1, 3), (2, 1)]);
    }

    #[test]
    fn pin_drives_through_wire() {
        let c = Circuit::new("c");
        let a = input_pin(loc(0, 0), 1, "a");
        let o = output_pin(loc(40, 0), 1, "o");
        let mut m = CircuitMutation::new();
        m.add(&c, a.clone())
            .add(&c, o.clone())
            .add(&c, Wire::new(loc(0, 0), loc(40, 0)));
        m.execute().unwrap();

        let mut sim = Propagator::new(&c);
        assert_eq!(sim.propagate(), PropagationOutcome::Quiesced);
        assert_eq!(sim.pin_value(&o).unwrap(), Value::FALSE);
        sim.set_pin_value(&a, Value::TRUE).unwrap();
        sim.propagate();
        assert_eq!(sim.pin_value(&o).unwrap(), Value::TRUE);
        assert!(sim.time() > 0);
    }

    #[test]
    fn pin_errors() {
        let c = Circuit::new("c");
        let a = input_pin(loc(0, 0), 2, "a");
        let gate = and_gate(loc(50, 0), 2);
        let mut sim = Propagator::new(&c);
        assert!(matches!(
            sim.set_pin_value(&gate, Value::TRUE),
            Err(SimError::NotAPin { .. })
        ));
        assert!(matches!(
            sim.set_pin_value(&a, Value::TRUE),
            Err(SimError::WidthMismatch { .. })
        ));
    }

    #[test]
    fn step_reports_idle() {
        let c = Circuit::new("empty");
        let mut sim = Propagator::new(&c);
        assert!(!sim.step());
        assert!(!sim.is_pending());
    }
}
