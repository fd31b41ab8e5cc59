//! Edge-triggered storage.

use crate::attrs::AttributeSet;
use crate::component::{ComponentFactory, EndData};
use crate::instance::InstanceState;
use circa_common::{BitWidth, Location, Logic, Value};

/// End index of the stored output.
pub const Q: usize = 0;
/// End index of the data input.
pub const D: usize = 1;
/// End index of the clock input.
pub const CLK: usize = 2;
/// End index of the inverted output.
pub const Q_BAR: usize = 3;

/// Per-instance flip-flop contents.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct FlipFlopState {
    /// The stored bit.
    pub q: Value,
    last_clock: Logic,
}

impl Default for FlipFlopState {
    fn default() -> Self {
        Self {
            q: Value::FALSE,
            last_clock: Logic::Unknown,
        }
    }
}

/// A D flip-flop capturing its input on the clock's rising edge.
#[derive(Debug)]
pub struct DFlipFlop;

impl ComponentFactory for DFlipFlop {
    fn name(&self) -> &str {
        "D Flip-Flop"
    }

    fn ends(&self, location: Location, _attrs: &AttributeSet) -> Vec<EndData> {
        vec![
            EndData::output(location, BitWidth::ONE),
            EndData::input(location.translate(-40, 0), BitWidth::ONE),
            EndData::input(location.translate(-40, 20), BitWidth::ONE),
            EndData::output(location.translate(0, 20), BitWidth::ONE),
        ]
    }

    fn propagate(&self, instance: &mut InstanceState<'_>) {
        let mut state = instance.data_or_insert_with(FlipFlopState::default);
        let clock = instance.port_value(CLK).get(0);
        if state.last_clock == Logic::Zero && clock == Logic::One {
            let d = instance.port_value(D);
            if d.is_fully_defined() {
                state.q = d;
            }
        }
        state.last_clock = clock;
        instance.set_data(state);
        let delay = instance.gate_delay();
        instance.set_port(Q, state.q, delay);
        instance.set_port(Q_BAR, !state.q, delay);
    }
}
