//! The standard component library.
//!
//! Factories are stateless and shared; the constructor functions here place
//! one component with the attributes most callers need.

mod gates;
mod memory;
mod subcircuit;
mod wiring;

pub use gates::{input_location, Gate, GateOp, DEFAULT_INPUTS};
pub use memory::{DFlipFlop, FlipFlopState, CLK, D, Q, Q_BAR};
pub use subcircuit::SubcircuitFactory;
pub use wiring::{
    is_output_pin, splitter_routes, Clock, Constant, Pin, PinState, PullResistor, Splitter, Tunnel,
};

use crate::attrs::{AttrValue, Attribute, AttributeSet};
use crate::circuit::Circuit;
use crate::component::Component;
use circa_common::{BitWidth, Location, Logic, Value};
use std::sync::Arc;

/// Places a gate of `op` with `inputs` inputs and data width `width`.
pub fn gate(op: GateOp, loc: Location, inputs: u32, width: u32) -> Component {
    let attrs = AttributeSet::new()
        .with(Attribute::INPUTS, AttrValue::Int(inputs))
        .with(Attribute::WIDTH, AttrValue::Width(BitWidth::new(width)));
    Component::with_attributes(Arc::new(Gate::new(op)), loc, attrs)
}

/// A one-bit AND gate.
pub fn and_gate(loc: Location, inputs: u32) -> Component {
    gate(GateOp::And, loc, inputs, 1)
}

/// A one-bit OR gate.
pub fn or_gate(loc: Location, inputs: u32) -> Component {
    gate(GateOp::Or, loc, inputs, 1)
}

/// A one-bit XOR gate.
pub fn xor_gate(loc: Location, inputs: u32) -> Component {
    gate(GateOp::Xor, loc, inputs, 1)
}

/// A one-bit NAND gate.
pub fn nand_gate(loc: Location, inputs: u32) -> Component {
    gate(GateOp::Nand, loc, inputs, 1)
}

/// A one-bit NOR gate.
pub fn nor_gate(loc: Location, inputs: u32) -> Component {
    gate(GateOp::Nor, loc, inputs, 1)
}

/// A one-bit XNOR gate.
pub fn xnor_gate(loc: Location, inputs: u32) -> Component {
    gate(GateOp::Xnor, loc, inputs, 1)
}

/// A one-bit inverter; its input is 30 units left of `loc`.
pub fn not_gate(loc: Location) -> Component {
    gate(GateOp::Not, loc, 1, 1)
}

/// A one-bit buffer.
pub fn buffer(loc: Location) -> Component {
    gate(GateOp::Buffer, loc, 1, 1)
}

fn pin(loc: Location, width: u32, label: &str, output: bool) -> Component {
    let attrs = AttributeSet::new()
        .with(Attribute::WIDTH, AttrValue::Width(BitWidth::new(width)))
        .with(Attribute::LABEL, AttrValue::Text(label.to_string()))
        .with(Attribute::OUTPUT, AttrValue::Bool(output));
    Component::with_attributes(Arc::new(Pin), loc, attrs)
}

/// An input pin, driving 0 until set.
pub fn input_pin(loc: Location, width: u32, label: &str) -> Component {
    pin(loc, width, label, false)
}

/// An output pin.
pub fn output_pin(loc: Location, width: u32, label: &str) -> Component {
    pin(loc, width, label, true)
}

/// A constant driver of `value`.
pub fn constant(loc: Location, value: Value) -> Component {
    let attrs = AttributeSet::new()
        .with(Attribute::WIDTH, AttrValue::Width(value.width()))
        .with(Attribute::VALUE, AttrValue::Value(value));
    Component::with_attributes(Arc::new(Constant), loc, attrs)
}

/// A clock staying `high` ticks high and `low` ticks low.
pub fn clock(loc: Location, high: u32, low: u32) -> Component {
    let attrs = AttributeSet::new()
        .with(Attribute::HIGH, AttrValue::Int(high))
        .with(Attribute::LOW, AttrValue::Int(low));
    Component::with_attributes(Arc::new(Clock), loc, attrs)
}

/// A pull resistor towards `pull`.
pub fn pull_resistor(loc: Location, pull: Logic) -> Component {
    let attrs = AttributeSet::new().with(Attribute::PULL, AttrValue::Logic(pull));
    Component::with_attributes(Arc::new(PullResistor), loc, attrs)
}

/// A tunnel of `width` bits joined by `label`.
pub fn tunnel(loc: Location, width: u32, label: &str) -> Component {
    let attrs = AttributeSet::new()
        .with(Attribute::WIDTH, AttrValue::Width(BitWidth::new(width)))
        .with(Attribute::LABEL, AttrValue::Text(label.to_string()));
    Component::with_attributes(Arc::new(Tunnel), loc, attrs)
}

/// A splitter of a `width`-bit bus into `fanout` groups.
pub fn splitter(loc: Location, width: u32, fanout: u32) -> Component {
    let attrs = AttributeSet::new()
        .with(Attribute::WIDTH, AttrValue::Width(BitWidth::new(width)))
        .with(Attribute::FANOUT, AttrValue::Int(fanout));
    Component::with_attributes(Arc::new(Splitter), loc, attrs)
}

/// A D flip-flop with Q at `loc`.
pub fn d_flip_flop(loc: Location) -> Component {
    Component::new(Arc::new(DFlipFlop), loc)
}

/// An instance of `circuit` anchored at `loc`.
pub fn subcircuit(circuit: &Circuit, loc: Location) -> Component {
    Component::new(Arc::new(SubcircuitFactory::new(circuit)), loc)
}
