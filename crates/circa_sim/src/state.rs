//! Hierarchical simulation state.
//!
//! Each [`CircuitState`] holds the live values of one circuit instance. The
//! states of one simulation form a [`StateTree`]: an arena in which a
//! subcircuit component's data in its parent state is the ID of the child
//! state, and each child records its parent ID and instance component for
//! navigation only. Forking a simulation clones the whole arena.

use crate::arena::SlotArena;
use crate::circuit::Circuit;
use crate::component::Component;
use crate::error::SimError;
use crate::ids::StateId;
use crate::mutation::ReplacementMap;
use crate::network::{BundleNetwork, WireState};
use circa_common::{CircaResult, InternalError, Location, Value};
use circa_config::LockingConfig;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-component data that is copied when a simulation forks.
pub trait InstanceData: Any + Send + Sync + fmt::Debug {
    /// Copies the data into a new box.
    fn clone_data(&self) -> Box<dyn InstanceData>;
    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Clone + Any + Send + Sync + fmt::Debug> InstanceData for T {
    fn clone_data(&self) -> Box<dyn InstanceData> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What a state keeps for one component.
pub enum ComponentData {
    /// The child state of a subcircuit instance.
    Substate(StateId),
    /// Data copied on fork.
    Owned(Box<dyn InstanceData>),
    /// Data shared between forks.
    Shared(Arc<dyn Any + Send + Sync>),
}

impl Clone for ComponentData {
    fn clone(&self) -> Self {
        match self {
            ComponentData::Substate(id) => ComponentData::Substate(*id),
            ComponentData::Owned(data) => ComponentData::Owned((**data).clone_data()),
            ComponentData::Shared(data) => ComponentData::Shared(Arc::clone(data)),
        }
    }
}

impl fmt::Debug for ComponentData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentData::Substate(id) => write!(f, "Substate({id})"),
            ComponentData::Owned(data) => write!(f, "Owned({data:?})"),
            ComponentData::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}

/// Pending work items, appendable through a shared reference.
pub struct DirtySet<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for DirtySet<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone + Eq + Hash> DirtySet<T> {
    /// Adds an item.
    pub fn mark(&self, item: T) {
        self.items.lock().push(item);
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Takes every pending item, first occurrence order, without duplicates.
    pub fn drain(&self) -> Vec<T> {
        let items = std::mem::take(&mut *self.items.lock());
        let mut seen = HashSet::with_capacity(items.len());
        items.into_iter().filter(|i| seen.insert(i.clone())).collect()
    }

    /// Copies the pending items without taking them.
    ///
    /// Waits at most `policy.snapshot_retries` times for the lock; on
    /// exhaustion logs a warning and returns an empty snapshot.
    pub fn snapshot(&self, policy: &LockingConfig) -> Vec<T> {
        let wait = Duration::from_millis(policy.snapshot_retry_millis);
        for _ in 0..policy.snapshot_retries.max(1) {
            if let Some(items) = self.items.try_lock_for(wait) {
                return items.clone();
            }
        }
        warn!(
            retries = policy.snapshot_retries,
            "gave up snapshotting dirty set"
        );
        Vec::new()
    }
}

impl<T: Clone> Clone for DirtySet<T> {
    fn clone(&self) -> Self {
        Self {
            items: Mutex::new(self.items.lock().clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DirtySet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.lock().iter()).finish()
    }
}

/// One driver's contribution to the value at a location.
#[derive(Clone, Debug)]
pub struct Cause {
    /// The driving component.
    pub component: Component,
    /// The value it asserts.
    pub value: Value,
    /// Serial of the event that set it; later events win.
    pub priority: u64,
}

/// Live simulation state of one circuit instance.
#[derive(Clone, Debug)]
pub struct CircuitState {
    circuit: Circuit,
    parent: Option<(StateId, Component)>,
    values: HashMap<Location, Value>,
    causes: HashMap<Location, Vec<Cause>>,
    data: HashMap<Component, ComponentData>,
    dirty_components: DirtySet<Component>,
    dirty_points: DirtySet<Location>,
    wires: WireState,
}

impl CircuitState {
    fn new(circuit: &Circuit, parent: Option<(StateId, Component)>) -> Self {
        let state = Self {
            circuit: circuit.clone(),
            parent,
            values: HashMap::new(),
            causes: HashMap::new(),
            data: HashMap::new(),
            dirty_components: DirtySet::default(),
            dirty_points: DirtySet::default(),
            wires: WireState::new(circuit.network()),
        };
        state.mark_all_dirty();
        state
    }

    /// The circuit this state simulates.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// The parent state and the instance component, for substates.
    pub fn parent(&self) -> Option<&(StateId, Component)> {
        self.parent.as_ref()
    }

    /// Child states, ordered by ID.
    pub fn substates(&self) -> Vec<StateId> {
        let mut ids: Vec<StateId> = self
            .data
            .values()
            .filter_map(|d| match d {
                ComponentData::Substate(id) => Some(*id),
                _ => None,
            })
            .collect();
        ids.sort();
        ids
    }

    /// The child state of a subcircuit instance.
    pub fn substate_of(&self, component: &Component) -> Option<StateId> {
        match self.data.get(component) {
            Some(ComponentData::Substate(id)) => Some(*id),
            _ => None,
        }
    }

    /// The resolved value at `loc`; [`Value::NIL`] if nothing reached it.
    pub fn value_at(&self, loc: Location) -> Value {
        self.values.get(&loc).copied().unwrap_or(Value::NIL)
    }

    /// The drivers asserting a value at `loc`.
    pub fn causes_at(&self, loc: Location) -> &[Cause] {
        self.causes.get(&loc).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The combination of every driver's value at `loc`.
    pub fn driven_at(&self, loc: Location) -> Value {
        self.causes_at(loc)
            .iter()
            .fold(Value::NIL, |acc, c| acc.combine(c.value))
    }

    /// Raw per-component data.
    pub fn data(&self, component: &Component) -> Option<&ComponentData> {
        self.data.get(component)
    }

    /// Typed per-component data.
    pub fn instance_data<T: 'static>(&self, component: &Component) -> Option<&T> {
        match self.data.get(component)? {
            ComponentData::Owned(d) => (**d).as_any().downcast_ref(),
            ComponentData::Shared(d) => d.downcast_ref(),
            ComponentData::Substate(_) => None,
        }
    }

    pub(crate) fn instance_data_mut<T: 'static>(&mut self, component: &Component) -> Option<&mut T> {
        match self.data.get_mut(component)? {
            ComponentData::Owned(d) => (**d).as_any_mut().downcast_mut(),
            _ => None,
        }
    }

    pub(crate) fn set_data(&mut self, component: &Component, data: ComponentData) {
        self.data.insert(component.clone(), data);
    }

    /// Schedules `component` for recomputation.
    pub fn mark_component_dirty(&self, component: &Component) {
        self.dirty_components.mark(component.clone());
    }

    /// Schedules the bundle through `loc` for redistribution.
    pub fn mark_point_dirty(&self, loc: Location) {
        self.dirty_points.mark(loc);
    }

    /// Pending components, without draining them.
    pub fn dirty_components(&self, policy: &LockingConfig) -> Vec<Component> {
        self.dirty_components.snapshot(policy)
    }

    /// Pending points, without draining them.
    pub fn dirty_points(&self, policy: &LockingConfig) -> Vec<Location> {
        self.dirty_points.snapshot(policy)
    }

    pub(crate) fn has_dirty(&self) -> bool {
        !self.dirty_components.is_empty() || !self.dirty_points.is_empty()
    }

    pub(crate) fn drain_dirty_components(&self) -> Vec<Component> {
        self.dirty_components.drain()
    }

    fn mark_all_dirty(&self) {
        for c in self.circuit.components() {
            self.mark_component_dirty(&c);
        }
        self.mark_network_dirty();
    }

    fn mark_network_dirty(&self) {
        let mut locs: Vec<Location> = self.wires.network().locations().collect();
        locs.sort();
        for loc in locs {
            self.mark_point_dirty(loc);
        }
    }

    /// Records `component` asserting `value` at `loc`. Returns `true` if the
    /// combined driven value there changed.
    pub(crate) fn set_cause(
        &mut self,
        component: &Component,
        loc: Location,
        value: Value,
        priority: u64,
    ) -> bool {
        let before = self.driven_at(loc);
        let causes = self.causes.entry(loc).or_default();
        let pos = causes.iter().position(|c| c.component == *component);
        match (pos, value.is_nil()) {
            (Some(i), true) => {
                causes.remove(i);
            }
            (Some(i), false) => {
                causes[i].value = value;
                causes[i].priority = priority;
            }
            (None, true) => {}
            (None, false) => causes.push(Cause {
                component: component.clone(),
                value,
                priority,
            }),
        }
        if causes.is_empty() {
            self.causes.remove(&loc);
        }
        self.driven_at(loc) != before
    }

    /// Drops every value `component` drives and marks those points dirty.
    pub(crate) fn remove_causes_of(&mut self, component: &Component) {
        let mut touched = Vec::new();
        self.causes.retain(|loc, causes| {
            let before = causes.len();
            causes.retain(|c| c.component != *component);
            if causes.len() != before {
                touched.push(*loc);
            }
            !causes.is_empty()
        });
        for loc in touched {
            self.mark_point_dirty(loc);
        }
    }

    /// Drops every driver and marks the whole network dirty.
    pub(crate) fn clear_causes(&mut self) {
        self.causes.clear();
        self.mark_network_dirty();
    }

    /// Redistributes dirty points over their bundles. Returns the locations
    /// whose value changed.
    pub(crate) fn propagate_wires(&mut self) -> Vec<Location> {
        let dirty = self.dirty_points.drain();
        if dirty.is_empty() {
            return Vec::new();
        }
        let causes = &self.causes;
        let driven = |loc: Location| {
            causes
                .get(&loc)
                .map(|cs| cs.iter().fold(Value::NIL, |acc, c| acc.combine(c.value)))
                .unwrap_or(Value::NIL)
        };
        let assignments = self.wires.propagate(&dirty, driven);
        let mut changed = Vec::new();
        for (loc, value) in assignments {
            if self.value_at(loc) == value {
                continue;
            }
            if value.is_nil() {
                self.values.remove(&loc);
            } else {
                self.values.insert(loc, value);
            }
            for sink in self.wires.network().sinks_at(loc) {
                self.dirty_components.mark(sink.clone());
            }
            changed.push(loc);
        }
        changed
    }

    /// Adopts a new bundle network if the circuit's has moved on.
    pub(crate) fn sync_network(&mut self, network: Arc<BundleNetwork>) -> bool {
        if network.epoch() == self.wires.epoch() {
            return false;
        }
        self.values.retain(|loc, _| network.contains(*loc));
        self.wires = WireState::new(network);
        self.mark_network_dirty();
        true
    }

    /// Clears transient values, keeping subcircuit links.
    fn reset(&mut self) {
        self.values.clear();
        self.causes.clear();
        self.dirty_components.drain();
        self.dirty_points.drain();
        self.data
            .retain(|_, d| matches!(d, ComponentData::Substate(_)));
        self.wires = WireState::new(self.circuit.network());
        self.mark_all_dirty();
    }

    /// Returns `true` if no work is pending in this state.
    pub fn is_settled(&self) -> bool {
        !self.has_dirty()
    }
}

/// The arena of states belonging to one simulation.
#[derive(Clone, Debug)]
pub struct StateTree {
    states: SlotArena<StateId, CircuitState>,
    root: StateId,
}

impl StateTree {
    /// Creates a tree with a fresh root state for `circuit`.
    pub fn new(circuit: &Circuit) -> Self {
        let mut states = SlotArena::new();
        let root = states.alloc(CircuitState::new(circuit, None));
        debug!(circuit = %circuit, "created root state");
        Self { states, root }
    }

    /// The root state's ID.
    pub fn root(&self) -> StateId {
        self.root
    }

    /// Looks up a state.
    pub fn get(&self, id: StateId) -> Option<&CircuitState> {
        self.states.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: StateId) -> Option<&mut CircuitState> {
        self.states.get_mut(id)
    }

    /// Looks up a state, failing with [`SimError::StateNotFound`].
    pub fn state(&self, id: StateId) -> Result<&CircuitState, SimError> {
        self.get(id).ok_or(SimError::StateNotFound(id.as_raw()))
    }

    /// Number of live states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always `false`; a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Every state, parents before children.
    pub fn preorder(&self) -> Vec<StateId> {
        let mut order = Vec::with_capacity(self.states.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(state) = self.states.get(id) else {
                continue;
            };
            order.push(id);
            stack.extend(state.substates().into_iter().rev());
        }
        order
    }

    /// Every state simulating `circuit`.
    pub fn states_of(&self, circuit: &Circuit) -> Vec<StateId> {
        self.states
            .iter()
            .filter(|(_, s)| s.circuit() == circuit)
            .map(|(id, _)| id)
            .collect()
    }

    /// Distinct circuits simulated anywhere in the tree.
    pub fn circuits(&self) -> Vec<Circuit> {
        let mut seen = HashSet::new();
        self.states
            .iter()
            .filter(|(_, s)| seen.insert(s.circuit().serial()))
            .map(|(_, s)| s.circuit().clone())
            .collect()
    }

    pub(crate) fn has_dirty(&self) -> bool {
        self.states.iter().any(|(_, s)| s.has_dirty())
    }

    /// Returns the child state for a subcircuit instance, creating it on
    /// first use. Refuses, with a warning, to instantiate a circuit inside
    /// itself.
    pub(crate) fn substate_or_create(
        &mut self,
        parent: StateId,
        component: &Component,
        circuit: &Circuit,
    ) -> Option<StateId> {
        let existing = self.get(parent)?.substate_of(component);
        if existing.is_some() {
            return existing;
        }
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            let state = self.get(id)?;
            if state.circuit() == circuit {
                warn!(circuit = %circuit, "refusing to instantiate a circuit inside itself");
                return None;
            }
            cursor = state.parent().map(|(p, _)| *p);
        }
        let child = self
            .states
            .alloc(CircuitState::new(circuit, Some((parent, component.clone()))));
        self.get_mut(parent)?
            .set_data(component, ComponentData::Substate(child));
        debug!(circuit = %circuit, state = %child, "created substate");
        Some(child)
    }

    /// Removes a state and all of its descendants.
    pub(crate) fn remove_subtree(&mut self, id: StateId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(state) = self.states.remove(next) {
                stack.extend(state.substates());
            }
        }
    }

    /// Resets every state, keeping the subcircuit hierarchy.
    pub fn reset(&mut self) {
        for (_, state) in self.states.iter_mut() {
            state.reset();
        }
    }

    /// Migrates per-component data after a transaction on `circuit`.
    ///
    /// Data of a replaced component moves to a replacement from the same
    /// factory if there is one; otherwise it is dropped, along with the child
    /// state of a removed subcircuit instance. A substate link pointing at a
    /// state that is no longer in the tree is an internal error.
    pub(crate) fn apply_transaction(
        &mut self,
        circuit: &Circuit,
        map: &ReplacementMap,
    ) -> CircaResult<()> {
        for id in self.states_of(circuit) {
            let mut orphaned = Vec::new();
            let mut moved_parents = Vec::new();
            let Some(state) = self.get_mut(id) else {
                continue;
            };
            let mut olds: Vec<&Component> = map.replaced_components().collect();
            olds.sort_by_key(|c| c.id());
            for old in olds {
                state.remove_causes_of(old);
                let Some(data) = state.data.remove(old) else {
                    continue;
                };
                let target = map.replacements_for(old).and_then(|news| {
                    news.iter()
                        .filter(|n| n.same_factory(old) && !state.data.contains_key(*n))
                        .min_by_key(|n| n.id())
                        .cloned()
                });
                match (target, data) {
                    (Some(new), data) => {
                        if let ComponentData::Substate(child) = data {
                            moved_parents.push((child, new.clone()));
                        }
                        state.data.insert(new, data);
                    }
                    (None, ComponentData::Substate(child)) => orphaned.push(child),
                    (None, _) => {}
                }
            }
            for added in map.additions() {
                state.mark_component_dirty(added);
            }
            for (child, new) in moved_parents {
                let child_state = self.get_mut(child).ok_or_else(|| dangling(id, child))?;
                child_state.parent = Some((id, new));
            }
            for child in orphaned {
                if self.get(child).is_none() {
                    return Err(dangling(id, child));
                }
                self.remove_subtree(child);
            }
        }
        Ok(())
    }
}

fn dangling(parent: StateId, child: StateId) -> InternalError {
    InternalError::new(format!("state {parent} links to missing substate {child}"))
}
