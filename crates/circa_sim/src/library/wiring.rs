//! Pins, constants, clocks and the components that shape wiring.

use crate::attrs::{Attribute, AttrValue, AttributeSet};
use crate::component::{Component, ComponentFactory, EndData, FactoryKind};
use crate::expr::{constant_expressions, ExpressionComputer, ExpressionMap};
use crate::instance::InstanceState;
use circa_common::{BitWidth, Location, Logic, Value};

/// The value an input pin drives.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct PinState {
    /// Current pin value.
    pub value: Value,
}

/// Circuit input and output ports.
#[derive(Debug)]
pub struct Pin;

/// Returns `true` for pins with the output attribute set.
pub fn is_output_pin(component: &Component) -> bool {
    component.kind() == FactoryKind::Pin && component.with_attrs(|a| a.flag(Attribute::OUTPUT, false))
}

impl ComponentFactory for Pin {
    fn name(&self) -> &str {
        "Pin"
    }

    fn kind(&self) -> FactoryKind {
        FactoryKind::Pin
    }

    fn default_attributes(&self) -> AttributeSet {
        AttributeSet::new()
            .with(Attribute::WIDTH, AttrValue::Width(BitWidth::ONE))
            .with(Attribute::OUTPUT, AttrValue::Bool(false))
            .with(Attribute::LABEL, AttrValue::Text(String::new()))
    }

    fn ends(&self, location: Location, attrs: &AttributeSet) -> Vec<EndData> {
        if attrs.flag(Attribute::OUTPUT, false) {
            vec![EndData::input(location, attrs.width())]
        } else {
            vec![EndData::output(location, attrs.width())]
        }
    }

    fn propagate(&self, instance: &mut InstanceState<'_>) {
        let attrs = instance.attributes();
        if attrs.flag(Attribute::OUTPUT, false) {
            return;
        }
        let width = attrs.width();
        let stored = instance
            .data::<PinState>()
            .map(|s| s.value)
            .filter(|v| v.width() == width);
        let value = match stored {
            Some(value) => value,
            None => {
                let initial = Value::known(width, 0);
                instance.set_data(PinState { value: initial });
                initial
            }
        };
        instance.set_port(0, value, 1);
    }

    fn attribute_concerns_supercircuit(&self, attr: Attribute) -> bool {
        attr == Attribute::WIDTH || attr == Attribute::OUTPUT || attr == Attribute::LABEL
    }
}

/// Drives a fixed value.
#[derive(Debug)]
pub struct Constant;

impl Constant {
    fn value(attrs: &AttributeSet) -> Value {
        let width = attrs.width();
        match attrs.value(Attribute::VALUE) {
            Some(v) if v.width() == width => v,
            Some(v) => v.extend_width(width, Logic::Zero),
            None => Value::known(width, 1),
        }
    }
}

impl ComponentFactory for Constant {
    fn name(&self) -> &str {
        "Constant"
    }

    fn default_attributes(&self) -> AttributeSet {
        AttributeSet::new()
            .with(Attribute::WIDTH, AttrValue::Width(BitWidth::ONE))
            .with(Attribute::VALUE, AttrValue::Value(Value::TRUE))
    }

    fn ends(&self, location: Location, attrs: &AttributeSet) -> Vec<EndData> {
        vec![EndData::output(location, attrs.width())]
    }

    fn propagate(&self, instance: &mut InstanceState<'_>) {
        let value = Constant::value(&instance.attributes());
        instance.set_port(0, value, 1);
    }

    fn expression_computer(&self) -> Option<&dyn ExpressionComputer> {
        Some(self)
    }
}

impl ExpressionComputer for Constant {
    fn compute(&self, component: &Component, ends: &[EndData], map: &mut ExpressionMap) {
        let value = component.with_attrs(Constant::value);
        constant_expressions(ends, |bit| value.get(bit), map);
    }
}

/// A square wave advanced by simulation ticks.
#[derive(Debug)]
pub struct Clock;

#[derive(Clone, Copy, PartialEq, Debug)]
struct ClockState {
    value: Value,
}

impl Clock {
    fn value_at(attrs: &AttributeSet, ticks: u64) -> Value {
        let high = u64::from(attrs.int(Attribute::HIGH, 1).max(1));
        let low = u64::from(attrs.int(Attribute::LOW, 1).max(1));
        Value::from_bool(ticks % (high + low) >= low)
    }
}

impl ComponentFactory for Clock {
    fn name(&self) -> &str {
        "Clock"
    }

    fn kind(&self) -> FactoryKind {
        FactoryKind::Clock
    }

    fn default_attributes(&self) -> AttributeSet {
        AttributeSet::new()
            .with(Attribute::HIGH, AttrValue::Int(1))
            .with(Attribute::LOW, AttrValue::Int(1))
            .with(Attribute::LABEL, AttrValue::Text(String::new()))
    }

    fn ends(&self, location: Location, _attrs: &AttributeSet) -> Vec<EndData> {
        vec![EndData::output(location, BitWidth::ONE)]
    }

    fn propagate(&self, instance: &mut InstanceState<'_>) {
        let value = Clock::value_at(&instance.attributes(), instance.tick_count());
        instance.set_data(ClockState { value });
        instance.set_port(0, value, 1);
    }

    fn tick(&self, instance: &mut InstanceState<'_>, ticks: u64) -> bool {
        let value = Clock::value_at(&instance.attributes(), ticks);
        let before = instance.data::<ClockState>().map(|s| s.value);
        instance.set_data(ClockState { value });
        before != Some(value)
    }
}

/// Gives undriven bits of its bundle a default level.
#[derive(Debug)]
pub struct PullResistor;

impl ComponentFactory for PullResistor {
    fn name(&self) -> &str {
        "Pull Resistor"
    }

    fn kind(&self) -> FactoryKind {
        FactoryKind::PullResistor
    }

    fn default_attributes(&self) -> AttributeSet {
        AttributeSet::new().with(Attribute::PULL, AttrValue::Logic(Logic::Zero))
    }

    fn ends(&self, location: Location, _attrs: &AttributeSet) -> Vec<EndData> {
        vec![EndData::input(location, BitWidth::UNKNOWN)]
    }

    fn propagate(&self, _instance: &mut InstanceState<'_>) {}
}

/// Joins every bundle carrying a tunnel with the same label.
#[derive(Debug)]
pub struct Tunnel;

impl ComponentFactory for Tunnel {
    fn name(&self) -> &str {
        "Tunnel"
    }

    fn kind(&self) -> FactoryKind {
        FactoryKind::Tunnel
    }

    fn default_attributes(&self) -> AttributeSet {
        AttributeSet::new()
            .with(Attribute::WIDTH, AttrValue::Width(BitWidth::ONE))
            .with(Attribute::LABEL, AttrValue::Text(String::new()))
    }

    fn ends(&self, location: Location, attrs: &AttributeSet) -> Vec<EndData> {
        vec![EndData::bidirectional(location, attrs.width())]
    }

    fn propagate(&self, _instance: &mut InstanceState<'_>) {}
}

/// Fans a bus out into groups of bits.
///
/// End 0 carries the whole bus at the anchor. Split end `j + 1` sits at
/// `(20, 10 * j)` from the anchor and carries the bits assigned to group `j`,
/// low bits going to low groups.
#[derive(Debug)]
pub struct Splitter;

fn fanout(attrs: &AttributeSet) -> u32 {
    let width = attrs.width().bits().max(1);
    attrs.int(Attribute::FANOUT, 2).clamp(1, width)
}

fn group_of(bit: u32, width: u32, fanout: u32) -> u32 {
    bit * fanout / width
}

/// For each bus bit, the split end index and the bit within that end.
pub fn splitter_routes(attrs: &AttributeSet) -> Vec<(usize, u32)> {
    let width = attrs.width().bits();
    if width == 0 {
        return Vec::new();
    }
    let fanout = fanout(attrs);
    let mut used = vec![0u32; fanout as usize];
    (0..width)
        .map(|bit| {
            let group = group_of(bit, width, fanout) as usize;
            let end_bit = used[group];
            used[group] += 1;
            (group + 1, end_bit)
        })
        .collect()
}

impl ComponentFactory for Splitter {
    fn name(&self) -> &str {
        "Splitter"
    }

    fn kind(&self) -> FactoryKind {
        FactoryKind::Splitter
    }

    fn default_attributes(&self) -> AttributeSet {
        AttributeSet::new()
            .with(Attribute::WIDTH, AttrValue::Width(BitWidth::new(2)))
            .with(Attribute::FANOUT, AttrValue::Int(2))
    }

    fn ends(&self, location: Location, attrs: &AttributeSet) -> Vec<EndData> {
        let width = attrs.width();
        let mut group_widths = vec![0u32; fanout(attrs) as usize];
        for (end, _) in splitter_routes(attrs) {
            group_widths[end - 1] += 1;
        }
        let mut ends = vec![EndData::bidirectional(location, width)];
        ends.extend(group_widths.into_iter().enumerate().map(|(j, w)| {
            EndData::bidirectional(location.translate(20, 10 * j as i32), BitWidth::new(w))
        }));
        ends
    }

    fn propagate(&self, _instance: &mut InstanceState<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter_attrs(width: u32, fanout: u32) -> AttributeSet {
        AttributeSet::new()
            .with(Attribute::WIDTH, AttrValue::Width(BitWidth::new(width)))
            .with(Attribute::FANOUT, AttrValue::Int(fanout))
    }

    #[test]
    fn splitter_groups_low_bits_first() {
        let routes = splitter_routes(&splitter_attrs(4, 2));
        assert_eq!(routes, vec![(1, 0), (1, 1), (2, 0), (2, 1)]);
        let routes = splitter_routes(&splitter_attrs(3, 3));
        assert_eq!(routes, vec![(1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn splitter_fanout_is_clamped() {
        let ends = Splitter.ends(Location::new(0, 0), &splitter_attrs(2, 8));
        assert_eq!(ends.len(), 3);
        assert_eq!(ends[2].location, Location::new(20, 10));
        assert_eq!(ends[2].width, BitWidth::ONE);
    }

    #[test]
    fn clock_phases() {
        let attrs = AttributeSet::new()
            .with(Attribute::HIGH, AttrValue::Int(2))
            .with(Attribute::LOW, AttrValue::Int(1));
        let wave: Vec<Value> = (0..6).map(|t| Clock::value_at(&attrs, t)).collect();
        assert_eq!(
            wave,
            vec![Value::FALSE, Value::TRUE, Value::TRUE, Value::FALSE, Value::TRUE, Value::TRUE]
        );
    }

    #[test]
    fn constant_fits_width() {
        let attrs = AttributeSet::new()
            .with(Attribute::WIDTH, AttrValue::Width(BitWidth::new(4)))
            .with(Attribute::VALUE, AttrValue::Value(Value::TRUE));
        assert_eq!(Constant::value(&attrs), Value::known(BitWidth::new(4), 1));
    }

    #[test]
    fn output_pins_sense() {
        let attrs = Pin.default_attributes().with(Attribute::OUTPUT, AttrValue::Bool(true));
        let ends = Pin.ends(Location::new(0, 0), &attrs);
        assert!(!ends[0].kind.is_output());
        assert!(Pin.attribute_concerns_supercircuit(Attribute::LABEL));
    }
}
