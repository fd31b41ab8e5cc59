//! Combinational analysis and test vectors over small circuits.

use circa_config::{AnalysisConfig, SimConfig};
use circa_sim::library::{
    and_gate, clock, d_flip_flop, input_pin, not_gate, or_gate, output_pin, pull_resistor, xor_gate,
};
use circa_sim::{
    compute_expressions, compute_table, run_test_vector, AnalyzeError, Circuit, CircuitMutation,
    Location, Logic, RowOutcome, TestFailure, TestVector, TestVectorError, Value, Wire,
};

fn loc(x: i32, y: i32) -> Location {
    Location::new(x, y)
}

fn wire(x0: i32, y0: i32, x1: i32, y1: i32) -> Wire {
    Wire::new(loc(x0, y0), loc(x1, y1))
}

/// `sum = a ^ b`, `carry = a & b`.
fn half_adder() -> Circuit {
    let c = Circuit::new("half adder");
    let mut m = CircuitMutation::new();
    m.add(&c, input_pin(loc(20, 10), 1, "a"))
        .add(&c, input_pin(loc(20, 30), 1, "b"))
        .add(&c, xor_gate(loc(100, 20), 2))
        .add(&c, and_gate(loc(100, 80), 2))
        .add(&c, output_pin(loc(140, 20), 1, "sum"))
        .add(&c, output_pin(loc(140, 80), 1, "carry"))
        .add(&c, wire(20, 10, 50, 10))
        .add(&c, wire(50, 10, 70, 10))
        .add(&c, wire(50, 10, 50, 70))
        .add(&c, wire(50, 70, 70, 70))
        .add(&c, wire(20, 30, 40, 30))
        .add(&c, wire(40, 30, 70, 30))
        .add(&c, wire(40, 30, 40, 90))
        .add(&c, wire(40, 90, 70, 90))
        .add(&c, wire(100, 20, 140, 20))
        .add(&c, wire(100, 80, 140, 80));
    m.execute().unwrap();
    c
}

/// `y = ~(e & y)`: stable while `e` is low, oscillates once it rises.
fn gated_ring() -> Circuit {
    let c = Circuit::new("gated ring");
    let mut m = CircuitMutation::new();
    m.add(&c, input_pin(loc(20, -10), 1, "e"))
        .add(&c, and_gate(loc(100, 0), 2))
        .add(&c, not_gate(loc(160, 0)))
        .add(&c, output_pin(loc(200, 0), 1, "y"))
        .add(&c, wire(20, -10, 70, -10))
        .add(&c, wire(100, 0, 130, 0))
        .add(&c, wire(160, 0, 200, 0))
        .add(&c, wire(160, 0, 160, 40))
        .add(&c, wire(160, 40, 70, 40))
        .add(&c, wire(70, 40, 70, 10));
    m.execute().unwrap();
    c
}

#[test]
fn half_adder_expressions() {
    let exprs = compute_expressions(&half_adder(), &AnalysisConfig::default()).unwrap();
    let rendered: Vec<(String, String)> = exprs
        .iter()
        .map(|e| (e.name.clone(), e.expression.as_ref().unwrap().to_string()))
        .collect();
    assert_eq!(
        rendered,
        vec![
            ("sum".to_string(), "a ^ b".to_string()),
            ("carry".to_string(), "a & b".to_string()),
        ]
    );
}

#[test]
fn feedback_is_circular() {
    let c = Circuit::new("latch");
    let mut m = CircuitMutation::new();
    m.add(&c, input_pin(loc(20, -10), 1, "a"))
        .add(&c, or_gate(loc(100, 0), 2))
        .add(&c, not_gate(loc(200, 0)))
        .add(&c, wire(20, -10, 70, -10))
        .add(&c, wire(100, 0, 170, 0))
        .add(&c, wire(200, 0, 200, 40))
        .add(&c, wire(200, 40, 70, 40))
        .add(&c, wire(70, 40, 70, 10));
    m.execute().unwrap();
    let config = AnalysisConfig {
        max_expression_iterations: 10,
        ..AnalysisConfig::default()
    };
    assert!(matches!(compute_expressions(&c, &config), Err(AnalyzeError::Circular)));
}

#[test]
fn clocks_cannot_be_analyzed() {
    let c = Circuit::new("clocked");
    let mut m = CircuitMutation::new();
    m.add(&c, clock(loc(0, 0), 1, 1))
        .add(&c, output_pin(loc(40, 0), 1, "o"))
        .add(&c, wire(0, 0, 40, 0));
    m.execute().unwrap();
    let err = compute_expressions(&c, &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(err, AnalyzeError::CannotHandle(name) if name == "Clock"));
}

#[test]
fn half_adder_table() {
    let table = compute_table(&half_adder(), &SimConfig::default()).unwrap();
    assert_eq!(table.inputs.len(), 2);
    assert_eq!(table.rows.len(), 4);
    let expect = [(0, 0), (1, 0), (1, 0), (0, 1)];
    for (row, (sum, carry)) in expect.into_iter().enumerate() {
        assert_eq!(
            table.outputs_of(row).unwrap(),
            &[Value::from_bool(sum == 1), Value::from_bool(carry == 1)]
        );
    }
    assert_eq!(table.rows[2].inputs, vec![Value::TRUE, Value::FALSE]);
}

#[test]
fn oscillating_rows_are_recorded() {
    let table = compute_table(&gated_ring(), &SimConfig::default()).unwrap();
    assert_eq!(table.outputs_of(0).unwrap(), &[Value::TRUE]);
    assert_eq!(table.rows[1].outcome, RowOutcome::Oscillation);
    assert!(table.to_string().contains("oscillation"));
}

#[test]
fn table_limits() {
    let wide = Circuit::new("wide");
    let mut m = CircuitMutation::new();
    m.add(&wide, input_pin(loc(0, 0), 4, "bus"))
        .add(&wide, output_pin(loc(0, 40), 1, "o"));
    m.execute().unwrap();
    let mut config = SimConfig::default();
    config.analysis.max_table_inputs = 2;
    assert!(matches!(
        compute_table(&wide, &config),
        Err(AnalyzeError::TooManyInputs { count: 4, max: 2 })
    ));

    let blind = Circuit::new("blind");
    let mut m = CircuitMutation::new();
    m.add(&blind, input_pin(loc(0, 0), 1, "a"));
    m.execute().unwrap();
    assert!(matches!(
        compute_table(&blind, &SimConfig::default()),
        Err(AnalyzeError::NoOutputs)
    ));
}

#[test]
fn passing_vector() {
    let vector: TestVector = "a b sum carry\n0 0 0 0\n0 1 1 0\n1 0 1 0\n1 1 0 1\n"
        .parse()
        .unwrap();
    let report = run_test_vector(&half_adder(), &vector, &SimConfig::default()).unwrap();
    assert!(report.is_success());
    assert_eq!(report.passed(), 4);
}

#[test]
fn failing_row_lists_mismatched_pins() {
    let vector: TestVector = "a b sum carry\n1 1 1 x\n0 0 x 0\n".parse().unwrap();
    let report = run_test_vector(&half_adder(), &vector, &SimConfig::default()).unwrap();
    assert_eq!(report.passed(), 1);
    let (row, failure) = &report.failures[0];
    assert_eq!(*row, 0);
    match failure {
        TestFailure::Mismatch(pins) => {
            assert_eq!(pins.len(), 1);
            assert_eq!(pins[0].pin, "sum");
            assert_eq!(pins[0].actual, Value::FALSE);
        }
        other => panic!("unexpected failure {other:?}"),
    }
}

#[test]
fn oscillation_fails_the_row() {
    let c = Circuit::new("ring");
    let mut m = CircuitMutation::new();
    m.add(&c, input_pin(loc(0, 100), 1, "e"))
        .add(&c, not_gate(loc(100, 0)))
        .add(&c, pull_resistor(loc(100, 30), Logic::Zero))
        .add(&c, output_pin(loc(140, 0), 1, "y"))
        .add(&c, wire(100, 0, 140, 0))
        .add(&c, wire(100, 0, 100, 30))
        .add(&c, wire(100, 30, 70, 30))
        .add(&c, wire(70, 30, 70, 0));
    m.execute().unwrap();
    let mut config = SimConfig::default();
    config.propagation.iteration_limit = 50;
    let vector: TestVector = "e y\n0 x\n".parse().unwrap();
    let report = run_test_vector(&c, &vector, &config).unwrap();
    assert!(matches!(report.failures[0].1, TestFailure::Oscillation));
}

#[test]
fn vector_columns_must_match_pins() {
    let c = half_adder();
    let vector: TestVector = "a nope\n0 0\n".parse().unwrap();
    assert!(matches!(
        run_test_vector(&c, &vector, &SimConfig::default()),
        Err(TestVectorError::UnknownPin(name)) if name == "nope"
    ));
    let vector: TestVector = "a[2] b\n00 0\n".parse().unwrap();
    assert!(matches!(
        run_test_vector(&c, &vector, &SimConfig::default()),
        Err(TestVectorError::WidthMismatch { .. })
    ));
}

/// A latch whose `write` input clocks `data` into `Q` on its rising edge.
fn write_latch() -> Circuit {
    let c = Circuit::new("latch");
    let mut m = CircuitMutation::new();
    m.add(&c, input_pin(loc(20, 100), 1, "data"))
        .add(&c, input_pin(loc(20, 120), 1, "write"))
        .add(&c, d_flip_flop(loc(100, 100)))
        .add(&c, output_pin(loc(140, 100), 1, "Q"))
        .add(&c, output_pin(loc(140, 120), 1, "NQ"))
        .add(&c, wire(20, 100, 60, 100))
        .add(&c, wire(20, 120, 60, 120))
        .add(&c, wire(100, 100, 140, 100))
        .add(&c, wire(100, 120, 140, 120));
    m.execute().unwrap();
    c
}

const LATCH_ROWS: &str = "\
1     0    0     0 1
2     1    0     0 1
3     1    1     1 0
4     0    0     1 0
5     0    1     0 1
";

#[test]
fn latch_sequence_keeps_state_between_rows() {
    let text = format!("# latch\n<seq> data write Q NQ\n{LATCH_ROWS}");
    let vector: TestVector = text.parse().unwrap();
    assert_eq!(vector.columns.len(), 4);
    assert_eq!(vector.schedule(), vec![vec![0, 1, 2, 3, 4]]);
    let report = run_test_vector(&write_latch(), &vector, &SimConfig::default()).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(report.passed(), 5);
}

#[test]
fn latch_sequence_with_explicit_set() {
    let rows: String = LATCH_ROWS.lines().map(|l| format!("1 {l}\n")).collect();
    let vector: TestVector = format!("<set> <seq> data write Q NQ\n{rows}").parse().unwrap();
    assert!(vector.rows.iter().all(|r| r.set == 1));
    let report = run_test_vector(&write_latch(), &vector, &SimConfig::default()).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);
}

#[test]
fn rows_without_seq_start_from_reset() {
    // Row 4 expects the value latched by row 3, which a reset forgets.
    let rows: String = LATCH_ROWS.lines().map(|l| format!("{}\n", &l[1..])).collect();
    let vector: TestVector = format!("data write Q NQ\n{rows}").parse().unwrap();
    let report = run_test_vector(&write_latch(), &vector, &SimConfig::default()).unwrap();
    let failed: Vec<usize> = report.failures.iter().map(|(row, _)| *row).collect();
    assert_eq!(failed, vec![2, 3]);
}

#[test]
fn sequences_run_in_seq_order() {
    let text = "<set> <seq> data write Q NQ\n\
                7 3 0 0 1 0\n\
                7 1 1 0 0 1\n\
                7 2 1 1 1 0\n";
    let vector: TestVector = text.parse().unwrap();
    let report = run_test_vector(&write_latch(), &vector, &SimConfig::default()).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);
}

#[test]
fn dont_care_and_float_cells() {
    // `<DC>` on an input keeps the latched data; `<DC>` on an output skips it.
    let text = "<seq> data write Q NQ\n1 1 0 0 1\n2 <DC> 1 1 <DC>\n";
    let vector: TestVector = text.parse().unwrap();
    let report = run_test_vector(&write_latch(), &vector, &SimConfig::default()).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);

    let c = Circuit::new("feed");
    let mut m = CircuitMutation::new();
    m.add(&c, input_pin(loc(20, 0), 1, "in"))
        .add(&c, output_pin(loc(60, 0), 1, "out"))
        .add(&c, wire(20, 0, 60, 0));
    m.execute().unwrap();
    let vector: TestVector = "in out\n<float> <float>\n1 <float>\n".parse().unwrap();
    let report = run_test_vector(&c, &vector, &SimConfig::default()).unwrap();
    assert_eq!(report.passed(), 1);
    let (row, failure) = &report.failures[0];
    assert_eq!(*row, 1);
    match failure {
        TestFailure::Mismatch(pins) => {
            assert_eq!(pins[0].pin, "out");
            assert_eq!(pins[0].actual, Value::TRUE);
            assert_eq!(pins[0].expected, Value::UNKNOWN);
        }
        other => panic!("unexpected failure {other:?}"),
    }
}
