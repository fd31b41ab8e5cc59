//! Test vectors: tables of pin values a circuit is expected to satisfy.
//!
//! The text format has a header naming pins by label, each with an optional
//! `[width]`, followed by one row of values per test. Everything after `#` on
//! a line is a comment.
//!
//! A cell is one of:
//! - a bit string, most significant bit first, exactly as wide as the column,
//!   using `0`, `1`, `x` (don't care on outputs, floating on inputs) and `E`;
//! - `0x`, `0o` or `0b` followed by hex, octal or binary digits;
//! - a decimal number, optionally negative (two's complement in the column);
//! - `<DC>`: the input keeps its previous value, the output is not checked;
//! - `<float>`: the input floats, the output must float.
//!
//! `_` may separate digits anywhere in a number.
//!
//! Two optional header columns, `<set>` and `<seq>`, hold numbers rather than
//! pin values. A row whose `<seq>` is 0 (the default) runs on a freshly reset
//! simulation. Rows with a nonzero `<seq>` and the same `<set>` form one
//! sequence: the simulation is reset before the first of them and then kept
//! across the rest, which run in ascending `<seq>` order. Trailing `<set>` or
//! `<seq>` values may be left out and count as 0.
//!
//! ```text
//! # half adder
//! a b sum carry
//! 0 0 0   0
//! 1 1 0   1
//! ```

use crate::circuit::Circuit;
use crate::component::Component;
use crate::error::{PinMismatch, TestFailure, TestVectorError};
use crate::library::is_output_pin;
use crate::propagator::Propagator;
use circa_common::{BitWidth, Logic, Value};
use circa_config::SimConfig;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// One column of a test vector.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VectorColumn {
    /// Pin label.
    pub name: String,
    /// Declared width.
    pub width: BitWidth,
}

/// One cell of a test row.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum TestCell {
    /// A value to drive, or to expect with unknown bits matching anything.
    Value(Value),
    /// `<DC>`.
    DontCare,
    /// `<float>`.
    Floating,
}

/// One row: its sequencing numbers and one cell per pin column.
#[derive(Clone, PartialEq, Debug)]
pub struct TestRow {
    /// The `<set>` number, 0 if absent.
    pub set: u32,
    /// The `<seq>` number, 0 if absent.
    pub seq: u32,
    /// Cells, in column order.
    pub cells: Vec<TestCell>,
}

impl TestRow {
    /// Returns `true` if the row continues from the state its set left behind.
    pub fn is_sequential(&self) -> bool {
        self.seq != 0
    }
}

/// A parsed test vector.
#[derive(Clone, PartialEq, Debug)]
pub struct TestVector {
    /// Pin columns, in header order.
    pub columns: Vec<VectorColumn>,
    /// Rows, in file order.
    pub rows: Vec<TestRow>,
}

impl TestVector {
    /// Reads and parses a vector file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TestVectorError> {
        std::fs::read_to_string(path)?.parse()
    }

    /// Row indices grouped into runs that share one simulation, in the order
    /// the runs start in the file. Each run is sorted by `<seq>`.
    pub fn schedule(&self) -> Vec<Vec<usize>> {
        let mut runs: Vec<Vec<usize>> = Vec::new();
        let mut by_set: HashMap<u32, usize> = HashMap::new();
        for (index, row) in self.rows.iter().enumerate() {
            if !row.is_sequential() {
                runs.push(vec![index]);
                continue;
            }
            match by_set.entry(row.set) {
                Entry::Occupied(run) => runs[*run.get()].push(index),
                Entry::Vacant(slot) => {
                    slot.insert(runs.len());
                    runs.push(vec![index]);
                }
            }
        }
        for run in &mut runs {
            run.sort_by_key(|&i| self.rows[i].seq);
        }
        runs
    }
}

enum HeaderColumn {
    Pin(VectorColumn),
    Set,
    Seq,
}

fn parse_header(tokens: &[&str], line: usize) -> Result<Vec<HeaderColumn>, TestVectorError> {
    let mut header = Vec::with_capacity(tokens.len());
    for token in tokens {
        let column = if token.eq_ignore_ascii_case("<set>") {
            HeaderColumn::Set
        } else if token.eq_ignore_ascii_case("<seq>") {
            HeaderColumn::Seq
        } else {
            HeaderColumn::Pin(parse_column(token, line)?)
        };
        let repeated = header.iter().any(|h| {
            matches!(
                (h, &column),
                (HeaderColumn::Set, HeaderColumn::Set) | (HeaderColumn::Seq, HeaderColumn::Seq)
            )
        });
        if repeated {
            return Err(TestVectorError::Parse {
                line,
                reason: format!("'{token}' appears twice"),
            });
        }
        header.push(column);
    }
    Ok(header)
}

fn parse_column(token: &str, line: usize) -> Result<VectorColumn, TestVectorError> {
    let bad = |reason: String| TestVectorError::Parse { line, reason };
    let Some((name, rest)) = token.split_once('[') else {
        return Ok(VectorColumn {
            name: token.to_string(),
            width: BitWidth::ONE,
        });
    };
    let digits = rest
        .strip_suffix(']')
        .ok_or_else(|| bad(format!("unterminated width in '{token}'")))?;
    let bits: u32 = digits
        .parse()
        .map_err(|_| bad(format!("invalid width in '{token}'")))?;
    if bits == 0 || bits > BitWidth::MAX.bits() || name.is_empty() {
        return Err(bad(format!("invalid column '{token}'")));
    }
    Ok(VectorColumn {
        name: name.to_string(),
        width: BitWidth::new(bits),
    })
}

fn parse_row(header: &[HeaderColumn], tokens: &[&str], line: usize) -> Result<TestRow, TestVectorError> {
    let short_of_pins = header
        .get(tokens.len()..)
        .map_or(true, |missing| missing.iter().any(|h| matches!(h, HeaderColumn::Pin(_))));
    if short_of_pins {
        return Err(TestVectorError::Parse {
            line,
            reason: format!("expected {} values, found {}", header.len(), tokens.len()),
        });
    }
    let mut row = TestRow {
        set: 0,
        seq: 0,
        cells: Vec::with_capacity(header.len()),
    };
    for (token, column) in tokens.iter().zip(header) {
        match column {
            HeaderColumn::Set => row.set = parse_number(token, "<set>", line)?,
            HeaderColumn::Seq => row.seq = parse_number(token, "<seq>", line)?,
            HeaderColumn::Pin(col) => row
                .cells
                .push(parse_cell(token, col).map_err(|reason| TestVectorError::Parse { line, reason })?),
        }
    }
    Ok(row)
}

fn parse_number(token: &str, column: &str, line: usize) -> Result<u32, TestVectorError> {
    token.parse().map_err(|_| TestVectorError::Parse {
        line,
        reason: format!("{column} value '{token}' is not a number"),
    })
}

fn parse_cell(token: &str, col: &VectorColumn) -> Result<TestCell, String> {
    if token.eq_ignore_ascii_case("<dc>") {
        return Ok(TestCell::DontCare);
    }
    if token.eq_ignore_ascii_case("<float>") {
        return Ok(TestCell::Floating);
    }
    let digits: String = token.chars().filter(|c| *c != '_').collect();
    let lower = digits.to_ascii_lowercase();
    let width = col.width.bits() as usize;

    let value = if digits.chars().count() == width && digits.chars().all(|c| Logic::from_char(c).is_some()) {
        bit_string(token, &digits, col)?
    } else if let Some(hex) = lower.strip_prefix("0x") {
        radix_value(token, hex, 16, col)?
    } else if let Some(oct) = lower.strip_prefix("0o") {
        radix_value(token, oct, 8, col)?
    } else if let Some(bin) = lower.strip_prefix("0b") {
        bit_string(token, bin, col)?
    } else if let Some(magnitude) = lower.strip_prefix('-') {
        negative(token, magnitude, col)?
    } else if !lower.is_empty() && lower.chars().all(|c| c.is_ascii_digit()) {
        let n: u64 = lower
            .parse()
            .map_err(|_| format!("'{token}' does not fit in 64 bits"))?;
        fit(token, n, 64 - n.leading_zeros(), col, "")?
    } else {
        return Err(format!(
            "'{token}' is not a {} for column '{}'",
            bits_phrase(col.width.bits()),
            col.name
        ));
    };
    Ok(TestCell::Value(value))
}

fn bits_phrase(bits: u32) -> String {
    if bits == 1 {
        "1-bit value".to_string()
    } else {
        format!("{bits}-bit value")
    }
}

fn too_many_bits(token: &str, col: &VectorColumn, needed: u32, hint: &str) -> String {
    let bits = col.width.bits();
    let unit = if bits == 1 { "bit" } else { "bits" };
    format!(
        "too many bits in '{token}': expected {bits} {unit}; did you mean {}[{needed}]?{hint}",
        col.name
    )
}

fn fit(token: &str, n: u64, needed: u32, col: &VectorColumn, hint: &str) -> Result<Value, String> {
    let bits = col.width.bits();
    if bits < 64 && n >> bits != 0 {
        return Err(too_many_bits(token, col, needed, hint));
    }
    Ok(Value::known(col.width, n))
}

fn radix_value(token: &str, digits: &str, radix: u32, col: &VectorColumn) -> Result<Value, String> {
    if digits.is_empty() {
        return Err(format!("'{token}' has no digits"));
    }
    let n = u64::from_str_radix(digits, radix)
        .map_err(|_| format!("'{token}' is not a valid base-{radix} number"))?;
    let (per_digit, hint) = if radix == 16 {
        (4, " Each 0x digit is 4 bits.")
    } else {
        (3, " Each 0o digit is 3 bits.")
    };
    fit(token, n, digits.len() as u32 * per_digit, col, hint)
}

fn bit_string(token: &str, digits: &str, col: &VectorColumn) -> Result<Value, String> {
    let value: Value = digits.parse().map_err(|e| format!("'{token}': {e}"))?;
    let found = value.width().bits();
    if found > col.width.bits() {
        return Err(too_many_bits(token, col, found, " Each 0b digit is 1 bit."));
    }
    Ok(value.extend_width(col.width, Logic::Zero))
}

fn negative(token: &str, magnitude: &str, col: &VectorColumn) -> Result<Value, String> {
    if magnitude.is_empty() || !magnitude.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("'{token}' is not a decimal number"));
    }
    let n: u64 = magnitude
        .parse()
        .map_err(|_| format!("'{token}' does not fit in 64 bits"))?;
    let bits = col.width.bits();
    if n > 1u64 << (bits - 1) {
        return Err(format!(
            "'{token}' is below the smallest signed {} of column '{}'",
            bits_phrase(bits),
            col.name
        ));
    }
    Ok(Value::known(col.width, n.wrapping_neg()))
}

impl FromStr for TestVector {
    type Err = TestVectorError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut header: Option<Vec<HeaderColumn>> = None;
        let mut rows = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let content = raw.split('#').next().unwrap_or_default();
            let tokens: Vec<&str> = content.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            match &header {
                None => header = Some(parse_header(&tokens, line)?),
                Some(columns) => rows.push(parse_row(columns, &tokens, line)?),
            }
        }
        let header = header.ok_or_else(|| TestVectorError::Parse {
            line: 0,
            reason: "missing header".to_string(),
        })?;
        let columns = header
            .into_iter()
            .filter_map(|h| match h {
                HeaderColumn::Pin(col) => Some(col),
                HeaderColumn::Set | HeaderColumn::Seq => None,
            })
            .collect();
        Ok(TestVector { columns, rows })
    }
}

/// The outcome of running every row of a vector.
#[derive(Debug, Default)]
pub struct TestReport {
    /// Rows executed.
    pub rows: usize,
    /// Failed rows, 0-based in file order, with the reason.
    pub failures: Vec<(usize, TestFailure)>,
}

impl TestReport {
    /// Rows that passed.
    pub fn passed(&self) -> usize {
        self.rows - self.failures.len()
    }

    /// Returns `true` if every row passed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Circuit {
    /// Runs one test row on the propagator's current state: drives the input
    /// pins among `pins` and checks the output pins once the circuit settles.
    ///
    /// Callers reset the propagator first unless the row continues a
    /// sequence.
    pub fn do_test_vector(
        &self,
        propagator: &mut Propagator,
        pins: &[Component],
        cells: &[TestCell],
    ) -> Result<(), TestFailure> {
        for (pin, cell) in pins.iter().zip(cells) {
            if is_output_pin(pin) {
                continue;
            }
            match cell {
                TestCell::Value(value) => propagator.set_pin_value(pin, *value)?,
                TestCell::Floating => {
                    let width = pin.with_attrs(|a| a.width());
                    propagator.set_pin_value(pin, Value::unknown(width))?;
                }
                TestCell::DontCare => {}
            }
        }
        if propagator.propagate().is_oscillating() {
            return Err(TestFailure::Oscillation);
        }
        let mut mismatches = Vec::new();
        for (pin, cell) in pins.iter().zip(cells) {
            if !is_output_pin(pin) {
                continue;
            }
            let actual = propagator.pin_value(pin)?;
            let (expected, matched) = match cell {
                TestCell::DontCare => continue,
                TestCell::Floating => (Value::unknown(actual.width()), actual.is_unknown()),
                TestCell::Value(expected) => (*expected, expected.compatible(&actual)),
            };
            if !matched {
                mismatches.push(PinMismatch {
                    pin: pin.label(),
                    expected,
                    actual,
                });
            }
        }
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(TestFailure::Mismatch(mismatches))
        }
    }
}

/// Runs every row of `vector` against `circuit`, resetting the simulation
/// before each independent row and before each sequence.
pub fn run_test_vector(
    circuit: &Circuit,
    vector: &TestVector,
    config: &SimConfig,
) -> Result<TestReport, TestVectorError> {
    let mut pins = Vec::with_capacity(vector.columns.len());
    for column in &vector.columns {
        let pin = circuit
            .pin_by_label(&column.name)
            .ok_or_else(|| TestVectorError::UnknownPin(column.name.clone()))?;
        let found = pin.with_attrs(|a| a.width());
        if found != column.width {
            return Err(TestVectorError::WidthMismatch {
                pin: column.name.clone(),
                expected: column.width,
                found,
            });
        }
        pins.push(pin);
    }

    let mut propagator = Propagator::with_config(circuit, config.clone());
    let mut report = TestReport::default();
    for run in vector.schedule() {
        propagator.reset();
        for index in run {
            report.rows += 1;
            let cells = &vector.rows[index].cells;
            if let Err(failure) = circuit.do_test_vector(&mut propagator, &pins, cells) {
                debug!(row = index, %failure, "test vector row failed");
                report.failures.push((index, failure));
            }
        }
    }
    report.failures.sort_by_key(|(index, _)| *index);
    Ok(report)
}
