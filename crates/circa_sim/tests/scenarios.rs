//! End-to-end propagation scenarios: gates, buses, feedback, hierarchy and
//! clocked storage.

use circa_sim::library::{
    and_gate, clock, d_flip_flop, input_pin, not_gate, output_pin, pull_resistor, subcircuit,
};
use circa_sim::{
    Circuit, CircuitMutation, Component, Location, Logic, PropagationOutcome, Propagator, Value,
    Wire,
};

fn loc(x: i32, y: i32) -> Location {
    Location::new(x, y)
}

fn wire(x0: i32, y0: i32, x1: i32, y1: i32) -> Wire {
    Wire::new(loc(x0, y0), loc(x1, y1))
}

struct AndCircuit {
    circuit: Circuit,
    a: Component,
    b: Component,
    out: Component,
    b_feed: Wire,
}

/// Two pins into an AND gate at (100, 50). Pin `b` reaches the gate through
/// a junction at (40, 60).
fn and_circuit() -> AndCircuit {
    let circuit = Circuit::new("and");
    let a = input_pin(loc(20, 40), 1, "a");
    let b = input_pin(loc(20, 60), 1, "b");
    let out = output_pin(loc(140, 50), 1, "out");
    let b_feed = wire(20, 60, 40, 60);
    let mut m = CircuitMutation::new();
    m.add(&circuit, a.clone())
        .add(&circuit, b.clone())
        .add(&circuit, out.clone())
        .add(&circuit, and_gate(loc(100, 50), 2))
        .add(&circuit, wire(20, 40, 70, 40))
        .add(&circuit, b_feed)
        .add(&circuit, wire(40, 60, 70, 60))
        .add(&circuit, wire(100, 50, 140, 50));
    m.execute().unwrap();
    AndCircuit {
        circuit,
        a,
        b,
        out,
        b_feed,
    }
}

#[test]
fn and_gate_with_both_inputs_high() {
    let t = and_circuit();
    let mut sim = Propagator::new(&t.circuit);
    sim.set_pin_value(&t.a, Value::TRUE).unwrap();
    sim.set_pin_value(&t.b, Value::TRUE).unwrap();
    assert_eq!(sim.propagate(), PropagationOutcome::Quiesced);
    assert_eq!(sim.pin_value(&t.out).unwrap(), Value::TRUE);
    assert_eq!(sim.value_at(loc(70, 60)), Value::TRUE);
}

#[test]
fn removing_an_input_wire_leaves_it_floating() {
    let t = and_circuit();
    let mut sim = Propagator::new(&t.circuit);
    sim.set_pin_value(&t.a, Value::TRUE).unwrap();
    sim.set_pin_value(&t.b, Value::TRUE).unwrap();
    sim.propagate();

    let mut m = CircuitMutation::new();
    m.remove(&t.circuit, t.b_feed);
    m.execute().unwrap();
    assert_eq!(sim.propagate(), PropagationOutcome::Quiesced);
    assert_eq!(sim.value_at(loc(70, 60)), Value::UNKNOWN);
    assert_eq!(sim.pin_value(&t.out).unwrap(), Value::UNKNOWN);
    assert_eq!(sim.value_at(loc(20, 60)), Value::TRUE);
}

#[test]
fn pull_up_decides_a_floating_input() {
    let t = and_circuit();
    let mut sim = Propagator::new(&t.circuit);
    sim.set_pin_value(&t.a, Value::TRUE).unwrap();
    sim.set_pin_value(&t.b, Value::FALSE).unwrap();
    sim.propagate();
    assert_eq!(sim.pin_value(&t.out).unwrap(), Value::FALSE);

    let mut m = CircuitMutation::new();
    m.remove(&t.circuit, t.b_feed)
        .add(&t.circuit, pull_resistor(loc(40, 60), Logic::One));
    m.execute().unwrap();
    sim.propagate();
    assert_eq!(sim.pin_value(&t.out).unwrap(), Value::TRUE);
}

#[test]
fn not_loop_with_pull_down_oscillates() {
    let circuit = Circuit::new("ring");
    let mut m = CircuitMutation::new();
    m.add(&circuit, not_gate(loc(100, 0)))
        .add(&circuit, pull_resistor(loc(100, 30), Logic::Zero))
        .add(&circuit, wire(100, 0, 100, 30))
        .add(&circuit, wire(100, 30, 70, 30))
        .add(&circuit, wire(70, 30, 70, 0));
    m.execute().unwrap();

    let mut sim = Propagator::new(&circuit);
    assert_eq!(sim.propagate(), PropagationOutcome::Oscillating);
    assert!(sim.is_oscillating());
    assert!(!sim.oscillation_points().is_empty());
    assert!(sim.is_pending());
}

#[test]
fn bare_not_loop_settles_unknown() {
    let circuit = Circuit::new("loop");
    let mut m = CircuitMutation::new();
    m.add(&circuit, not_gate(loc(100, 0)))
        .add(&circuit, wire(100, 0, 100, 30))
        .add(&circuit, wire(100, 30, 70, 30))
        .add(&circuit, wire(70, 30, 70, 0));
    m.execute().unwrap();

    let mut sim = Propagator::new(&circuit);
    assert_eq!(sim.propagate(), PropagationOutcome::Quiesced);
    assert_eq!(sim.value_at(loc(70, 0)), Value::UNKNOWN);
}

fn two_drivers() -> (Circuit, Component, Component) {
    let circuit = Circuit::new("bus");
    let p = input_pin(loc(0, 0), 1, "p");
    let q = input_pin(loc(40, 0), 1, "q");
    let mut m = CircuitMutation::new();
    m.add(&circuit, p.clone())
        .add(&circuit, q.clone())
        .add(&circuit, wire(0, 0, 20, 0))
        .add(&circuit, wire(20, 0, 40, 0));
    m.execute().unwrap();
    (circuit, p, q)
}

#[test]
fn conflicting_drivers_give_error_everywhere() {
    let (circuit, p, q) = two_drivers();
    let mut sim = Propagator::new(&circuit);
    sim.set_pin_value(&p, Value::TRUE).unwrap();
    sim.set_pin_value(&q, Value::FALSE).unwrap();
    sim.propagate();
    for x in [0, 20, 40] {
        assert_eq!(sim.value_at(loc(x, 0)), Value::ERROR);
    }
}

#[test]
fn agreeing_drivers_share_the_value() {
    let (circuit, p, q) = two_drivers();
    let mut sim = Propagator::new(&circuit);
    sim.set_pin_value(&p, Value::TRUE).unwrap();
    sim.set_pin_value(&q, Value::TRUE).unwrap();
    sim.propagate();
    for x in [0, 20, 40] {
        assert_eq!(sim.value_at(loc(x, 0)), Value::TRUE);
    }
}

#[test]
fn one_width_record_per_conflicting_node() {
    let c = Circuit::new("widths");
    let (l1, l2) = (loc(0, 0), loc(30, 0));
    let mut m = CircuitMutation::new();
    m.add(&c, input_pin(l1, 4, "a"))
        .add(&c, output_pin(l1, 8, "b"))
        .add(&c, output_pin(l2, 4, "c"))
        .add(&c, Wire::new(l1, l2));
    m.execute().unwrap();

    let records = c.width_incompatibilities();
    assert_eq!(records.iter().filter(|r| r.covers(l1)).count(), 1);
    assert_eq!(records.len(), 1);
    assert_eq!(c.width_at(l2), circa_sim::BitWidth::UNKNOWN);

    let mut m = CircuitMutation::new();
    m.add(&c, output_pin(l2, 2, "d"));
    m.execute().unwrap();
    let records = c.width_incompatibilities();
    assert_eq!(records.len(), 1);
    assert!(records[0].covers(l2));
    assert_eq!(records[0].widths().len(), 3);

    // The node still simulates, with an unknown width.
    let mut sim = Propagator::new(&c);
    assert!(!sim.propagate().is_oscillating());
}

#[test]
fn forked_simulations_agree_and_stay_independent() {
    let t = and_circuit();
    let mut sim = Propagator::new(&t.circuit);
    sim.propagate();
    let mut fork = sim.fork();

    for p in [&mut sim, &mut fork] {
        p.set_pin_value(&t.a, Value::TRUE).unwrap();
        p.set_pin_value(&t.b, Value::TRUE).unwrap();
        p.propagate();
    }
    for point in [loc(20, 40), loc(70, 60), loc(100, 50), loc(140, 50)] {
        assert_eq!(sim.value_at(point), fork.value_at(point));
    }
    assert_eq!(sim.time(), fork.time());

    fork.set_pin_value(&t.a, Value::FALSE).unwrap();
    fork.propagate();
    assert_eq!(fork.pin_value(&t.out).unwrap(), Value::FALSE);
    assert_eq!(sim.pin_value(&t.out).unwrap(), Value::TRUE);
}

#[test]
fn propagating_twice_changes_nothing() {
    let t = and_circuit();
    let mut sim = Propagator::new(&t.circuit);
    sim.set_pin_value(&t.a, Value::TRUE).unwrap();
    sim.propagate();
    let changes = sim.value_changes();
    assert_eq!(sim.propagate(), PropagationOutcome::Quiesced);
    assert_eq!(sim.value_changes(), changes);
}

#[test]
fn reset_restores_initial_values() {
    let t = and_circuit();
    let mut sim = Propagator::new(&t.circuit);
    sim.set_pin_value(&t.a, Value::TRUE).unwrap();
    sim.set_pin_value(&t.b, Value::TRUE).unwrap();
    sim.propagate();
    sim.reset();
    sim.propagate();
    assert_eq!(sim.pin_value(&t.out).unwrap(), Value::FALSE);
    assert_eq!(sim.ticks(), 0);
}

/// An inverter wrapped as a subcircuit with input `x` and output `y`.
fn inverter() -> Circuit {
    let inner = Circuit::new("inverter");
    let mut m = CircuitMutation::new();
    m.add(&inner, input_pin(loc(0, 0), 1, "x"))
        .add(&inner, not_gate(loc(60, 0)))
        .add(&inner, output_pin(loc(100, 0), 1, "y"))
        .add(&inner, wire(0, 0, 30, 0))
        .add(&inner, wire(60, 0, 100, 0));
    m.execute().unwrap();
    inner
}

#[test]
fn values_cross_subcircuit_boundaries() {
    let inner = inverter();
    let outer = Circuit::new("outer");
    let a = input_pin(loc(150, 200), 1, "a");
    let b = output_pin(loc(300, 200), 1, "b");
    let instance = subcircuit(&inner, loc(200, 200));
    assert_eq!(instance.ends().len(), 2);
    let mut m = CircuitMutation::new();
    m.add(&outer, a.clone())
        .add(&outer, b.clone())
        .add(&outer, instance.clone())
        .add(&outer, wire(150, 200, 200, 200))
        .add(&outer, wire(240, 200, 300, 200));
    m.execute().unwrap();
    assert_eq!(inner.supercircuits(), vec![outer.clone()]);

    let mut sim = Propagator::new(&outer);
    sim.propagate();
    assert_eq!(sim.pin_value(&b).unwrap(), Value::TRUE);
    assert_eq!(sim.tree().len(), 2);

    sim.set_pin_value(&a, Value::TRUE).unwrap();
    sim.propagate();
    assert_eq!(sim.pin_value(&b).unwrap(), Value::FALSE);
    let child = sim
        .state(sim.root_state())
        .unwrap()
        .substate_of(&instance)
        .unwrap();
    assert_eq!(sim.value_in(child, loc(100, 0)).unwrap(), Value::FALSE);
}

#[test]
fn clock_ticks_drive_a_flip_flop() {
    let circuit = Circuit::new("register");
    let d = input_pin(loc(20, 100), 1, "d");
    let q = output_pin(loc(140, 100), 1, "q");
    let mut m = CircuitMutation::new();
    m.add(&circuit, d.clone())
        .add(&circuit, q.clone())
        .add(&circuit, clock(loc(20, 120), 1, 1))
        .add(&circuit, d_flip_flop(loc(100, 100)))
        .add(&circuit, wire(20, 100, 60, 100))
        .add(&circuit, wire(20, 120, 60, 120))
        .add(&circuit, wire(100, 100, 140, 100));
    m.execute().unwrap();

    let mut sim = Propagator::new(&circuit);
    sim.set_pin_value(&d, Value::TRUE).unwrap();
    sim.propagate();
    assert_eq!(sim.pin_value(&q).unwrap(), Value::FALSE);

    sim.tick(1);
    assert!(sim.is_pending());
    assert_eq!(sim.pin_value(&q).unwrap(), Value::FALSE);
    sim.propagate();
    assert_eq!(sim.value_at(loc(60, 120)), Value::TRUE);
    assert_eq!(sim.pin_value(&q).unwrap(), Value::TRUE);

    sim.set_pin_value(&d, Value::FALSE).unwrap();
    sim.tick(1);
    sim.propagate();
    assert_eq!(sim.pin_value(&q).unwrap(), Value::TRUE);
}
