//! The view of the simulation a component gets while it propagates.

use crate::attrs::AttributeSet;
use crate::circuit::Circuit;
use crate::component::{Component, EndData};
use crate::ids::StateId;
use crate::propagator::SimCore;
use crate::state::{ComponentData, InstanceData};
use circa_common::{Location, Value};
use std::any::Any;
use std::sync::Arc;

/// One component's propagation context: its ports in one circuit state.
pub struct InstanceState<'a> {
    core: &'a mut SimCore,
    state: StateId,
    component: Component,
    ends: Vec<EndData>,
}

impl<'a> InstanceState<'a> {
    pub(crate) fn new(
        core: &'a mut SimCore,
        state: StateId,
        component: Component,
        ends: Vec<EndData>,
    ) -> Self {
        Self {
            core,
            state,
            component,
            ends,
        }
    }

    /// The component being propagated.
    pub fn component(&self) -> &Component {
        &self.component
    }

    /// The state the component lives in.
    pub fn state_id(&self) -> StateId {
        self.state
    }

    /// Snapshot of the component's attributes.
    pub fn attributes(&self) -> AttributeSet {
        self.component.attributes()
    }

    /// Number of ends.
    pub fn port_count(&self) -> usize {
        self.ends.len()
    }

    /// The end at `index`.
    pub fn end(&self, index: usize) -> Option<&EndData> {
        self.ends.get(index)
    }

    /// The value on port `index`. A port nothing has reached reads as
    /// all-unknown of the port's width.
    pub fn port_value(&self, index: usize) -> Value {
        let Some(end) = self.ends.get(index) else {
            return Value::UNKNOWN;
        };
        let value = self.value_at(end.location);
        if !value.is_nil() {
            value
        } else if end.width.is_known() {
            Value::unknown(end.width)
        } else {
            Value::UNKNOWN
        }
    }

    fn value_at(&self, loc: Location) -> Value {
        self.core
            .tree
            .get(self.state)
            .map(|s| s.value_at(loc))
            .unwrap_or(Value::NIL)
    }

    /// Returns `true` if anything besides this end touches the port.
    pub fn is_port_connected(&self, index: usize) -> bool {
        let Some(end) = self.ends.get(index) else {
            return false;
        };
        self.core
            .tree
            .get(self.state)
            .map(|s| s.circuit().with_points(|p| p.degree(end.location)) > 1)
            .unwrap_or(false)
    }

    /// Schedules port `index` to carry `value` after `delay` time units.
    pub fn set_port(&mut self, index: usize, value: Value, delay: u64) {
        if let Some(end) = self.ends.get(index) {
            let location = end.location;
            self.core
                .enqueue(self.state, location, &self.component, value, delay);
        }
    }

    /// The configured propagation delay of a gate.
    pub fn gate_delay(&self) -> u64 {
        u64::from(self.core.config.propagation.gate_delay)
    }

    /// Clock ticks elapsed since the simulation started or was reset.
    pub fn tick_count(&self) -> u64 {
        self.core.ticks
    }

    /// The component's typed data in this state.
    pub fn data<T: 'static>(&self) -> Option<&T> {
        self.core
            .tree
            .get(self.state)?
            .instance_data(&self.component)
    }

    /// The component's typed data, mutably.
    pub fn data_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.core
            .tree
            .get_mut(self.state)?
            .instance_data_mut(&self.component)
    }

    /// Stores data that is copied when the simulation forks.
    pub fn set_data<T: InstanceData>(&mut self, data: T) {
        if let Some(state) = self.core.tree.get_mut(self.state) {
            state.set_data(&self.component, ComponentData::Owned(Box::new(data)));
        }
    }

    /// Stores data that forks share.
    pub fn set_shared(&mut self, data: Arc<dyn Any + Send + Sync>) {
        if let Some(state) = self.core.tree.get_mut(self.state) {
            state.set_data(&self.component, ComponentData::Shared(data));
        }
    }

    /// Returns the typed data, inserting `init()` first if there is none.
    pub fn data_or_insert_with<T: InstanceData + Clone>(&mut self, init: impl FnOnce() -> T) -> T {
        if let Some(existing) = self.data::<T>() {
            return existing.clone();
        }
        let value = init();
        self.set_data(value.clone());
        value
    }

    /// Schedules the enclosing subcircuit instance, if any, for recomputation.
    pub(crate) fn mark_parent_dirty(&self) {
        let Some((parent, instance)) = self
            .core
            .tree
            .get(self.state)
            .and_then(|s| s.parent().cloned())
        else {
            return;
        };
        if let Some(state) = self.core.tree.get(parent) {
            state.mark_component_dirty(&instance);
        }
    }

    /// The child state behind this subcircuit instance, created on first use.
    pub(crate) fn substate(&mut self, circuit: &Circuit) -> Option<StateId> {
        self.core
            .tree
            .substate_or_create(self.state, &self.component, circuit)
    }

    pub(crate) fn core(&self) -> &SimCore {
        self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut SimCore {
        self.core
    }
}
