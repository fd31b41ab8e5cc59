//! Combinational analysis: symbolic expressions and truth tables.
//!
//! [`compute_expressions`] walks expressions from the input pins through
//! every component's [`ExpressionComputer`](crate::expr::ExpressionComputer)
//! until they stop changing. [`compute_table`] simulates every input
//! combination from a settled base state instead, so it also handles
//! components that have no symbolic form.

use crate::circuit::{Circuit, PortSpec};
use crate::component::{EndKind, FactoryKind};
use crate::error::AnalyzeError;
use crate::expr::{Expression, ExpressionMap};
use crate::propagator::Propagator;
use circa_common::{BitWidth, Value};
use circa_config::{AnalysisConfig, SimConfig};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The expression computed for one output bit.
#[derive(Clone, PartialEq, Debug)]
pub struct PinExpression {
    /// Output name, with a `[bit]` suffix for multi-bit pins.
    pub name: String,
    /// The expression, or `None` if nothing reaches the bit.
    pub expression: Option<Expression>,
}

/// A named pin in a truth table.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TableColumn {
    /// The pin's label, or a positional name for unlabeled pins.
    pub name: String,
    /// The pin's width.
    pub width: BitWidth,
}

/// The outputs observed for one input row.
#[derive(Clone, PartialEq, Debug)]
pub enum RowOutcome {
    /// Settled output values, in output column order.
    Values(Vec<Value>),
    /// The circuit oscillated for this row.
    Oscillation,
}

/// One row of a truth table.
#[derive(Clone, PartialEq, Debug)]
pub struct TableRow {
    /// Input values, in input column order.
    pub inputs: Vec<Value>,
    /// What the outputs did.
    pub outcome: RowOutcome,
}

/// A complete truth table.
#[derive(Clone, PartialEq, Debug)]
pub struct TruthTable {
    /// Input pins; the first is the most significant in row numbering.
    pub inputs: Vec<TableColumn>,
    /// Output pins.
    pub outputs: Vec<TableColumn>,
    /// One row per input combination.
    pub rows: Vec<TableRow>,
}

impl TruthTable {
    /// Output values of row `row`, or `None` if it oscillated.
    pub fn outputs_of(&self, row: usize) -> Option<&[Value]> {
        match &self.rows.get(row)?.outcome {
            RowOutcome::Values(values) => Some(values),
            RowOutcome::Oscillation => None,
        }
    }
}

impl fmt::Display for TruthTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |cols: &[TableColumn]| {
            cols.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(" ")
        };
        writeln!(f, "{} | {}", names(&self.inputs), names(&self.outputs))?;
        for row in &self.rows {
            let ins: Vec<String> = row.inputs.iter().map(Value::to_string).collect();
            let outs = match &row.outcome {
                RowOutcome::Values(values) => {
                    values.iter().map(Value::to_string).collect::<Vec<_>>().join(" ")
                }
                RowOutcome::Oscillation => "oscillation".to_string(),
            };
            writeln!(f, "{} | {}", ins.join(" "), outs)?;
        }
        Ok(())
    }
}

fn columns(ports: &[PortSpec], kind: EndKind, prefix: &str) -> Vec<(PortSpec, TableColumn)> {
    ports
        .iter()
        .filter(|p| p.kind == kind)
        .enumerate()
        .map(|(i, p)| {
            let label = p.pin.label();
            let name = if label.is_empty() {
                format!("{prefix}{i}")
            } else {
                label
            };
            (
                p.clone(),
                TableColumn {
                    name,
                    width: p.width,
                },
            )
        })
        .collect()
}

fn bit_name(column: &TableColumn, bit: u32) -> String {
    if column.width.bits() > 1 {
        format!("{}[{bit}]", column.name)
    } else {
        column.name.clone()
    }
}

/// Derives a boolean expression for every output pin bit of `circuit`.
pub fn compute_expressions(
    circuit: &Circuit,
    config: &AnalysisConfig,
) -> Result<Vec<PinExpression>, AnalyzeError> {
    let ports = circuit.ports();
    let mut map = ExpressionMap::new(circuit.network());
    for (port, column) in columns(&ports, EndKind::Input, "in") {
        for bit in 0..column.width.bits() {
            map.put(port.pin.location(), bit, Expression::var(bit_name(&column, bit)));
        }
    }
    map.take_changed();

    let mut computing = Vec::new();
    for component in circuit.components() {
        match component.kind() {
            FactoryKind::Pin
            | FactoryKind::Splitter
            | FactoryKind::Tunnel
            | FactoryKind::PullResistor => continue,
            _ => {}
        }
        let factory = Arc::clone(component.factory());
        if factory.expression_computer().is_none() {
            return Err(AnalyzeError::CannotHandle(factory.name().to_string()));
        }
        let ends = component.ends();
        computing.push((component, factory, ends));
    }

    let mut converged = false;
    for iteration in 0..config.max_expression_iterations {
        for (component, factory, ends) in &computing {
            if let Some(computer) = factory.expression_computer() {
                computer.compute(component, ends, &mut map);
            }
        }
        if !map.take_changed() {
            debug!(circuit = %circuit, iterations = iteration + 1, "expressions converged");
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(AnalyzeError::Circular);
    }

    let mut out = Vec::new();
    for (port, column) in columns(&ports, EndKind::Output, "out") {
        for bit in 0..column.width.bits() {
            out.push(PinExpression {
                name: bit_name(&column, bit),
                expression: map.get(port.pin.location(), bit).cloned(),
            });
        }
    }
    Ok(out)
}

/// Simulates every input combination of `circuit`.
pub fn compute_table(circuit: &Circuit, config: &SimConfig) -> Result<TruthTable, AnalyzeError> {
    let ports = circuit.ports();
    let inputs = columns(&ports, EndKind::Input, "in");
    let outputs = columns(&ports, EndKind::Output, "out");
    if outputs.is_empty() {
        return Err(AnalyzeError::NoOutputs);
    }
    let total: u32 = inputs.iter().map(|(_, c)| c.width.bits()).sum();
    let max = config.analysis.max_table_inputs;
    if total > max || total >= u64::BITS {
        return Err(AnalyzeError::TooManyInputs { count: total, max });
    }

    let mut base = Propagator::with_config(circuit, config.clone());
    base.propagate();

    let mut rows = Vec::with_capacity(1usize << total);
    for row in 0..(1u64 << total) {
        let mut sim = base.fork();
        let mut remaining = total;
        let mut values = Vec::with_capacity(inputs.len());
        for (port, column) in &inputs {
            remaining -= column.width.bits();
            let value = Value::known(column.width, (row >> remaining) & column.width.mask());
            sim.set_pin_value(&port.pin, value)?;
            values.push(value);
        }
        let outcome = if sim.propagate().is_oscillating() {
            RowOutcome::Oscillation
        } else {
            let mut seen = Vec::with_capacity(outputs.len());
            for (port, _) in &outputs {
                seen.push(sim.pin_value(&port.pin)?);
            }
            RowOutcome::Values(seen)
        };
        rows.push(TableRow {
            inputs: values,
            outcome,
        });
    }
    debug!(circuit = %circuit, rows = rows.len(), "computed truth table");
    Ok(TruthTable {
        inputs: inputs.into_iter().map(|(_, c)| c).collect(),
        outputs: outputs.into_iter().map(|(_, c)| c).collect(),
        rows,
    })
}
