//! Simulation core for hierarchical digital logic circuits.
//!
//! A [`Circuit`] holds placed components and wires behind a per-circuit
//! read/write lock. Wires are merged into bundles by a [`BundleNetwork`]
//! that infers widths, records width conflicts and joins bits across
//! splitters into threads. Changes go through [`CircuitMutation`]
//! transactions, which lock every affected circuit in serial order, log each
//! change so it can be undone, repair the network and only then notify
//! listeners. A [`Propagator`] simulates a circuit and all of its
//! subcircuit instances as a [`StateTree`], driving values through a timed
//! event queue until they settle or oscillate.
//!
//! # Usage
//!
//! ```ignore
//! use circa_sim::{library, Circuit, CircuitMutation, Propagator, Wire};
//!
//! let circuit = Circuit::new("main");
//! let a = library::input_pin(Location::new(0, 0), 1, "a");
//! let out = library::output_pin(Location::new(40, 0), 1, "out");
//! let mut m = CircuitMutation::new();
//! m.add(&circuit, a.clone()).add(&circuit, out.clone());
//! m.add(&circuit, Wire::new(Location::new(0, 0), Location::new(40, 0)));
//! m.execute()?;
//!
//! let mut sim = Propagator::new(&circuit);
//! sim.set_pin_value(&a, Value::TRUE)?;
//! sim.propagate();
//! assert_eq!(sim.pin_value(&out)?, Value::TRUE);
//! ```
//!
//! # Modules
//!
//! - `component`, `attrs`: placed elements and their attributes
//! - `points`: location index of wire and component ends
//! - `network`: bundles, threads and wire value resolution
//! - `circuit`: circuits, ports and change listeners
//! - `mutation`: locking, transactions, change logs and replacement maps
//! - `state`, `instance`: per-simulation values and component data
//! - `propagator`: the event queue and oscillation detection
//! - `library`: the standard components
//! - `analyze`, `expr`, `test_vector`: combinational analysis and testing

#![warn(missing_docs)]

pub mod analyze;
pub mod arena;
pub mod attrs;
pub mod circuit;
pub mod component;
pub mod error;
pub mod expr;
pub mod ids;
pub mod instance;
pub mod library;
pub mod mutation;
pub mod network;
pub mod points;
pub mod propagator;
pub mod state;
pub mod test_vector;

pub use analyze::{compute_expressions, compute_table, PinExpression, RowOutcome, TruthTable};
pub use attrs::{AttrValue, Attribute, AttributeSet};
pub use circuit::{Circuit, CircuitEvent, CircuitListener, PortSpec};
pub use component::{Component, ComponentFactory, Element, EndData, EndKind, FactoryKind, Wire};
pub use error::{AnalyzeError, MutationError, PinMismatch, SimError, TestFailure, TestVectorError};
pub use expr::{Expression, ExpressionComputer, ExpressionMap};
pub use ids::{BundleId, ComponentId, StateId, ThreadId};
pub use instance::InstanceState;
pub use mutation::{
    CircuitChange, CircuitMutation, CircuitMutator, CircuitTransaction, ReplacementMap,
    TransactionResult,
};
pub use network::{BundleNetwork, WireBundle, WireThread};
pub use points::{CircuitPoints, WidthIncompatibilityData};
pub use propagator::{PropagationOutcome, Propagator, SetData};
pub use state::{CircuitState, StateTree};
pub use test_vector::{run_test_vector, TestCell, TestReport, TestRow, TestVector};

pub use circa_common::{BitWidth, Location, Logic, Value};
pub use circa_config::SimConfig;
