//! Individual topology changes and their duals.

use super::{CircuitMutator, ReplacementMap};
use crate::attrs::{AttrValue, Attribute};
use crate::circuit::Circuit;
use crate::component::{Component, Element, FactoryKind};
use crate::error::MutationError;

/// What a [`CircuitChange`] does.
#[derive(Clone, Debug)]
pub enum ChangeKind {
    /// Remove everything. `removed` is filled in when the change executes.
    Clear {
        /// Elements the circuit held before clearing.
        removed: Vec<Element>,
    },
    /// Add one element.
    Add(Element),
    /// Add several elements.
    AddAll(Vec<Element>),
    /// Remove one element.
    Remove(Element),
    /// Remove several elements.
    RemoveAll(Vec<Element>),
    /// Remove every replaced component and add every replacement.
    Replace(ReplacementMap),
    /// Set (or clear, with `None`) a component attribute.
    Set {
        /// The component.
        component: Component,
        /// The attribute.
        attr: Attribute,
        /// Value before; filled in when the change executes.
        old: Option<AttrValue>,
        /// Value after.
        new: Option<AttrValue>,
    },
    /// Set (or clear) a circuit attribute.
    SetForCircuit {
        /// The attribute.
        attr: Attribute,
        /// Value before; filled in when the change executes.
        old: Option<AttrValue>,
        /// Value after.
        new: Option<AttrValue>,
    },
}

/// One change to one circuit.
#[derive(Clone, Debug)]
pub struct CircuitChange {
    circuit: Circuit,
    kind: ChangeKind,
}

impl CircuitChange {
    /// Wraps a change kind.
    pub fn new(circuit: &Circuit, kind: ChangeKind) -> Self {
        Self {
            circuit: circuit.clone(),
            kind,
        }
    }

    /// The circuit the change applies to.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// What the change does.
    pub fn kind(&self) -> &ChangeKind {
        &self.kind
    }

    /// The change that undoes this one.
    pub fn reverse(&self) -> CircuitChange {
        let kind = match &self.kind {
            ChangeKind::Clear { removed } => ChangeKind::AddAll(removed.clone()),
            ChangeKind::Add(e) => ChangeKind::Remove(e.clone()),
            ChangeKind::AddAll(es) => ChangeKind::RemoveAll(es.clone()),
            ChangeKind::Remove(e) => ChangeKind::Add(e.clone()),
            ChangeKind::RemoveAll(es) => ChangeKind::AddAll(es.clone()),
            ChangeKind::Replace(map) => ChangeKind::Replace(map.inverse()),
            ChangeKind::Set {
                component,
                attr,
                old,
                new,
            } => ChangeKind::Set {
                component: component.clone(),
                attr: *attr,
                old: new.clone(),
                new: old.clone(),
            },
            ChangeKind::SetForCircuit { attr, old, new } => ChangeKind::SetForCircuit {
                attr: *attr,
                old: new.clone(),
                new: old.clone(),
            },
        };
        CircuitChange::new(&self.circuit, kind)
    }

    /// Returns `true` if the change can alter the circuit's port list, so
    /// that circuits instantiating it must be locked too.
    pub fn concerns_supercircuit(&self) -> bool {
        let is_pin = |e: &Element| matches!(e, Element::Component(c) if c.kind() == FactoryKind::Pin);
        match &self.kind {
            ChangeKind::Clear { .. } => true,
            ChangeKind::Add(e) | ChangeKind::Remove(e) => is_pin(e),
            ChangeKind::AddAll(es) | ChangeKind::RemoveAll(es) => es.iter().any(is_pin),
            ChangeKind::Replace(map) => map
                .replaced_components()
                .chain(map.additions())
                .any(|c| c.kind() == FactoryKind::Pin),
            ChangeKind::Set {
                component, attr, ..
            } => component.factory().attribute_concerns_supercircuit(*attr),
            ChangeKind::SetForCircuit { .. } => false,
        }
    }

    /// Components this change may add to its circuit.
    pub(crate) fn added_components(&self) -> Vec<Component> {
        let component = |e: &Element| match e {
            Element::Component(c) => Some(c.clone()),
            Element::Wire(_) => None,
        };
        match &self.kind {
            ChangeKind::Add(e) => component(e).into_iter().collect(),
            ChangeKind::AddAll(es) => es.iter().filter_map(component).collect(),
            ChangeKind::Replace(map) => map.additions().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Applies the change through `mutator`, which logs the executed form.
    pub(crate) fn execute(&self, mutator: &mut CircuitMutator) -> Result<(), MutationError> {
        let circuit = &self.circuit;
        match &self.kind {
            ChangeKind::Clear { .. } => mutator.clear(circuit),
            ChangeKind::Add(e) => mutator.add(circuit, e.clone()),
            ChangeKind::AddAll(es) => mutator.add_all(circuit, es.clone()),
            ChangeKind::Remove(e) => mutator.remove(circuit, e.clone()),
            ChangeKind::RemoveAll(es) => mutator.remove_all(circuit, es.clone()),
            ChangeKind::Replace(map) => mutator.replace(circuit, map.clone()),
            ChangeKind::Set {
                component,
                attr,
                new,
                ..
            } => mutator.set_optional(circuit, component, *attr, new.clone()),
            ChangeKind::SetForCircuit { attr, new, .. } => {
                mutator.set_for_circuit_optional(circuit, *attr, new.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Wire;
    use crate::library::{and_gate, input_pin};
    use circa_common::{BitWidth, Location};

    fn circuit() -> Circuit {
        Circuit::new("c")
    }

    #[test]
    fn add_and_remove_are_duals() {
        let c = circuit();
        let w: Element = Wire::new(Location::new(0, 0), Location::new(10, 0)).into();
        let add = CircuitChange::new(&c, ChangeKind::Add(w.clone()));
        assert!(matches!(add.reverse().kind(), ChangeKind::Remove(e) if *e == w));
        assert!(matches!(add.reverse().reverse().kind(), ChangeKind::Add(_)));
    }

    #[test]
    fn clear_reverses_to_add_all() {
        let c = circuit();
        let g: Element = and_gate(Location::new(50, 0), 2).into();
        let clear = CircuitChange::new(
            &c,
            ChangeKind::Clear {
                removed: vec![g.clone()],
            },
        );
        assert!(matches!(clear.reverse().kind(), ChangeKind::AddAll(es) if es == &vec![g]));
    }

    #[test]
    fn set_swaps_values() {
        let c = circuit();
        let pin = input_pin(Location::new(0, 0), 1, "a");
        let set = CircuitChange::new(
            &c,
            ChangeKind::Set {
                component: pin,
                attr: Attribute::WIDTH,
                old: Some(AttrValue::Width(BitWidth::ONE)),
                new: Some(AttrValue::Width(BitWidth::new(8))),
            },
        );
        match set.reverse().kind() {
            ChangeKind::Set { old, new, .. } => {
                assert_eq!(*old, Some(AttrValue::Width(BitWidth::new(8))));
                assert_eq!(*new, Some(AttrValue::Width(BitWidth::ONE)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pin_changes_concern_supercircuit() {
        let c = circuit();
        let pin = input_pin(Location::new(0, 0), 1, "a");
        let gate = and_gate(Location::new(50, 0), 2);
        assert!(CircuitChange::new(&c, ChangeKind::Add(pin.clone().into())).concerns_supercircuit());
        assert!(!CircuitChange::new(&c, ChangeKind::Add(gate.clone().into())).concerns_supercircuit());
        let width = |component: Component| ChangeKind::Set {
            component,
            attr: Attribute::WIDTH,
            old: None,
            new: Some(AttrValue::Width(BitWidth::new(2))),
        };
        assert!(CircuitChange::new(&c, width(pin)).concerns_supercircuit());
        assert!(!CircuitChange::new(&c, width(gate)).concerns_supercircuit());
        assert!(CircuitChange::new(&c, ChangeKind::Clear { removed: vec![] }).concerns_supercircuit());
    }
}
