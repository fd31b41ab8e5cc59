//! Applies changes to write-locked circuits and collects their effects.

use super::{ChangeKind, CircuitChange, ReplacementMap};
use crate::attrs::{AttrValue, Attribute};
use crate::circuit::{Circuit, CircuitContents, CircuitEvent, PortSpec};
use crate::component::{Component, Element, FactoryKind, Wire};
use crate::error::MutationError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, trace};

/// The only way to change circuit topology.
///
/// A mutator exists only while a transaction holds its locks. Every method
/// fails with [`MutationError::IllegalState`] if the current thread does not
/// hold the target circuit's write lock.
pub struct CircuitMutator {
    pub(crate) log: Vec<CircuitChange>,
    pub(crate) maps: BTreeMap<u64, (Circuit, ReplacementMap)>,
    pub(crate) touched: BTreeMap<u64, (Circuit, Vec<PortSpec>)>,
    pub(crate) events: Vec<(Circuit, CircuitEvent)>,
}

impl CircuitMutator {
    pub(crate) fn new() -> Self {
        Self {
            log: Vec::new(),
            maps: BTreeMap::new(),
            touched: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    fn contents<R>(
        &mut self,
        circuit: &Circuit,
        f: impl FnOnce(&mut CircuitContents) -> R,
    ) -> Result<R, MutationError> {
        if !self.touched.contains_key(&circuit.serial()) {
            let ports = circuit
                .write_contents(|c| c.ports.clone())
                .ok_or_else(|| illegal(circuit))?;
            self.touched
                .insert(circuit.serial(), (circuit.clone(), ports));
        }
        circuit.write_contents(f).ok_or_else(|| illegal(circuit))
    }

    fn map(&mut self, circuit: &Circuit) -> &mut ReplacementMap {
        &mut self
            .maps
            .entry(circuit.serial())
            .or_insert_with(|| (circuit.clone(), ReplacementMap::new()))
            .1
    }

    fn record(&mut self, circuit: &Circuit, kind: ChangeKind) {
        trace!(circuit = %circuit, change = ?kind, "logged change");
        self.log.push(CircuitChange::new(circuit, kind));
    }

    fn emit(&mut self, circuit: &Circuit, event: CircuitEvent) {
        self.events.push((circuit.clone(), event));
    }

    fn apply_add(&mut self, circuit: &Circuit, element: &Element) -> Result<bool, MutationError> {
        match element {
            Element::Wire(wire) => {
                let wire = *wire;
                let added = self.contents(circuit, |c| {
                    if !c.wires.insert(wire) {
                        return false;
                    }
                    c.points.add_wire(wire);
                    if !c.network_stale
                        && !Arc::make_mut(&mut c.network).try_add_wire(wire, &c.points)
                    {
                        c.network_stale = true;
                    }
                    true
                })?;
                if added {
                    self.emit(circuit, CircuitEvent::Add(element.clone()));
                }
                Ok(added)
            }
            Element::Component(comp) => {
                // Computed outside the write closure: a subcircuit's ends read
                // the child circuit's contents.
                let ends = comp.ends();
                let added = self.contents(circuit, |c| {
                    if c.components.contains(comp) {
                        return false;
                    }
                    c.components.push(comp.clone());
                    c.points.add_component(comp, ends.clone());
                    if !c.network_stale
                        && !Arc::make_mut(&mut c.network).try_add_component(comp, &ends, &c.points)
                    {
                        c.network_stale = true;
                    }
                    if comp.kind() == FactoryKind::Clock {
                        c.clocks.push(comp.clone());
                    }
                    true
                })?;
                if added {
                    if let Some(child) = comp.factory().subcircuit() {
                        child.register_user(circuit, comp.id());
                    }
                    self.map(circuit).add(comp.clone())?;
                    self.emit(circuit, CircuitEvent::Add(element.clone()));
                }
                Ok(added)
            }
        }
    }

    fn apply_remove(
        &mut self,
        circuit: &Circuit,
        element: &Element,
    ) -> Result<bool, MutationError> {
        let removed = match element {
            Element::Wire(wire) => {
                let wire: Wire = *wire;
                self.contents(circuit, |c| {
                    if !c.wires.remove(&wire) {
                        return false;
                    }
                    c.points.remove_wire(wire);
                    c.network_stale = true;
                    true
                })?
            }
            Element::Component(comp) => {
                let removed = self.contents(circuit, |c| {
                    let Some(pos) = c.components.iter().position(|x| x == comp) else {
                        return false;
                    };
                    c.components.remove(pos);
                    c.points.remove_component(comp);
                    c.clocks.retain(|x| x != comp);
                    c.network_stale = true;
                    true
                })?;
                if removed {
                    if let Some(child) = comp.factory().subcircuit() {
                        child.unregister_user(comp.id());
                    }
                    self.map(circuit).remove(comp.clone())?;
                }
                removed
            }
        };
        if removed {
            self.emit(circuit, CircuitEvent::Remove(element.clone()));
        }
        Ok(removed)
    }

    /// Removes every element of `circuit`.
    pub fn clear(&mut self, circuit: &Circuit) -> Result<(), MutationError> {
        let removed: Vec<Element> = self.contents(circuit, |c| {
            let mut removed: Vec<Element> =
                c.components.drain(..).map(Element::Component).collect();
            removed.extend(std::mem::take(&mut c.wires).into_iter().map(Element::Wire));
            c.points = Default::default();
            c.clocks.clear();
            c.network_stale = true;
            removed
        })?;
        for element in &removed {
            if let Element::Component(comp) = element {
                if let Some(child) = comp.factory().subcircuit() {
                    child.unregister_user(comp.id());
                }
                self.map(circuit).remove(comp.clone())?;
            }
        }
        self.emit(circuit, CircuitEvent::Clear);
        self.record(circuit, ChangeKind::Clear { removed });
        Ok(())
    }

    /// Adds an element; adding one already present is a no-op.
    pub fn add(&mut self, circuit: &Circuit, element: Element) -> Result<(), MutationError> {
        if self.apply_add(circuit, &element)? {
            self.record(circuit, ChangeKind::Add(element));
        }
        Ok(())
    }

    /// Adds several elements.
    pub fn add_all(&mut self, circuit: &Circuit, elements: Vec<Element>) -> Result<(), MutationError> {
        let mut added = Vec::with_capacity(elements.len());
        for element in elements {
            if self.apply_add(circuit, &element)? {
                added.push(element);
            }
        }
        if !added.is_empty() {
            self.record(circuit, ChangeKind::AddAll(added));
        }
        Ok(())
    }

    /// Removes an element; removing one not present is a no-op.
    pub fn remove(&mut self, circuit: &Circuit, element: Element) -> Result<(), MutationError> {
        if self.apply_remove(circuit, &element)? {
            self.record(circuit, ChangeKind::Remove(element));
        }
        Ok(())
    }

    /// Removes several elements.
    pub fn remove_all(
        &mut self,
        circuit: &Circuit,
        elements: Vec<Element>,
    ) -> Result<(), MutationError> {
        let mut removed = Vec::with_capacity(elements.len());
        for element in elements {
            if self.apply_remove(circuit, &element)? {
                removed.push(element);
            }
        }
        if !removed.is_empty() {
            self.record(circuit, ChangeKind::RemoveAll(removed));
        }
        Ok(())
    }

    /// Removes every replaced component, then adds every replacement.
    pub fn replace(&mut self, circuit: &Circuit, map: ReplacementMap) -> Result<(), MutationError> {
        let mut olds: Vec<Component> = map.replaced_components().cloned().collect();
        let mut news: Vec<Component> = map.additions().cloned().collect();
        olds.sort_by_key(Component::id);
        news.sort_by_key(Component::id);
        for old in olds {
            self.apply_remove(circuit, &Element::Component(old))?;
        }
        for new in news {
            self.apply_add(circuit, &Element::Component(new))?;
        }
        // apply_* recorded plain additions and removals; the explicit map
        // also carries which component took over from which.
        self.map(circuit).append(&map)?;
        self.record(circuit, ChangeKind::Replace(map));
        Ok(())
    }

    /// Sets a component attribute.
    pub fn set(
        &mut self,
        circuit: &Circuit,
        component: &Component,
        attr: Attribute,
        value: AttrValue,
    ) -> Result<(), MutationError> {
        self.set_optional(circuit, component, attr, Some(value))
    }

    pub(crate) fn set_optional(
        &mut self,
        circuit: &Circuit,
        component: &Component,
        attr: Attribute,
        value: Option<AttrValue>,
    ) -> Result<(), MutationError> {
        let present = self.contents(circuit, |c| c.components.contains(component))?;
        let old = match &value {
            Some(v) => component.set_attribute(attr, v.clone()),
            None => component.clear_attribute(attr),
        };
        if present {
            let ends = component.ends();
            self.contents(circuit, |c| {
                if c.points.ends_of(component) != Some(ends.as_slice()) {
                    c.points.add_component(component, ends);
                    c.network_stale = true;
                } else if component.kind() == FactoryKind::Tunnel
                    || component.kind() == FactoryKind::PullResistor
                    || component.kind() == FactoryKind::Splitter
                {
                    c.network_stale = true;
                }
            })?;
        }
        self.emit(
            circuit,
            CircuitEvent::AttributeChanged {
                component: component.clone(),
                attr,
                old: old.clone(),
                new: value.clone(),
            },
        );
        self.record(
            circuit,
            ChangeKind::Set {
                component: component.clone(),
                attr,
                old,
                new: value,
            },
        );
        Ok(())
    }

    /// Sets a circuit-level attribute.
    pub fn set_for_circuit(
        &mut self,
        circuit: &Circuit,
        attr: Attribute,
        value: AttrValue,
    ) -> Result<(), MutationError> {
        self.set_for_circuit_optional(circuit, attr, Some(value))
    }

    pub(crate) fn set_for_circuit_optional(
        &mut self,
        circuit: &Circuit,
        attr: Attribute,
        value: Option<AttrValue>,
    ) -> Result<(), MutationError> {
        let old = self.contents(circuit, |c| match &value {
            Some(v) => c.attrs.set(attr, v.clone()),
            None => c.attrs.remove(attr),
        })?;
        self.emit(
            circuit,
            CircuitEvent::CircuitAttributeChanged {
                attr,
                old: old.clone(),
                new: value.clone(),
            },
        );
        self.record(circuit, ChangeKind::SetForCircuit { attr, old, new: value });
        Ok(())
    }

    /// Undoes everything logged so far and discards buffered events.
    pub(crate) fn rollback(&mut self) {
        let log = std::mem::take(&mut self.log);
        for change in log.iter().rev() {
            if let Err(err) = change.reverse().execute(self) {
                error!(%err, circuit = %change.circuit(), "rollback step failed");
            }
        }
        self.log.clear();
        self.events.clear();
        self.maps.clear();
        for (circuit, _) in self.touched.values() {
            circuit.write_contents(|c| {
                if c.network_stale {
                    c.rebuild_network();
                }
                c.ports = c.compute_ports();
            });
        }
    }
}

fn illegal(circuit: &Circuit) -> MutationError {
    MutationError::IllegalState {
        circuit: circuit.name(),
    }
}
