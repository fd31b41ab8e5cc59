//! Instances of one circuit inside another.

use crate::circuit::Circuit;
use crate::component::{ComponentFactory, EndData, EndKind, FactoryKind};
use crate::attrs::AttributeSet;
use crate::instance::InstanceState;
use crate::library::PinState;
use crate::state::ComponentData;
use circa_common::{Location, Value};

/// Places a circuit as a component whose ends are the circuit's ports.
#[derive(Debug)]
pub struct SubcircuitFactory {
    circuit: Circuit,
    name: String,
}

impl SubcircuitFactory {
    /// A factory instantiating `circuit`.
    pub fn new(circuit: &Circuit) -> Self {
        Self {
            circuit: circuit.clone(),
            name: circuit.name(),
        }
    }
}

impl ComponentFactory for SubcircuitFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> FactoryKind {
        FactoryKind::Subcircuit
    }

    fn ends(&self, location: Location, _attrs: &AttributeSet) -> Vec<EndData> {
        self.circuit
            .ports()
            .into_iter()
            .map(|port| {
                let at = location.translate(port.offset.x, port.offset.y);
                match port.kind {
                    EndKind::Output => EndData::output(at, port.width),
                    _ => EndData::input(at, port.width),
                }
            })
            .collect()
    }

    fn propagate(&self, instance: &mut InstanceState<'_>) {
        let Some(child) = instance.substate(&self.circuit) else {
            return;
        };
        let ports = self.circuit.ports();
        let count = ports.len().min(instance.port_count());
        for (index, port) in ports.iter().enumerate().take(count) {
            if port.kind.is_output() {
                continue;
            }
            let value = instance.port_value(index);
            let Some(state) = instance.core_mut().tree.get_mut(child) else {
                return;
            };
            if state.instance_data::<PinState>(&port.pin).map(|p| p.value) != Some(value) {
                state.set_data(&port.pin, ComponentData::Owned(Box::new(PinState { value })));
                state.mark_component_dirty(&port.pin);
            }
        }
        for (index, port) in ports.iter().enumerate().take(count) {
            if !port.kind.is_output() {
                continue;
            }
            let seen = instance
                .core()
                .tree
                .get(child)
                .map_or(Value::NIL, |s| s.value_at(port.pin.location()));
            let value = if seen.is_nil() {
                Value::unknown(port.width)
            } else {
                seen
            };
            instance.set_port(index, value, 1);
        }
    }

    fn subcircuit(&self) -> Option<&Circuit> {
        Some(&self.circuit)
    }
}
