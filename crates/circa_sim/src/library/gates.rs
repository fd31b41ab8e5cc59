//! Logic gates.

use crate::attrs::{Attribute, AttrValue, AttributeSet};
use crate::component::{Component, ComponentFactory, EndData};
use crate::expr::{Expression, ExpressionComputer, ExpressionMap};
use crate::instance::InstanceState;
use circa_common::{BitWidth, Location, Value};

/// Default number of gate inputs.
pub const DEFAULT_INPUTS: u32 = 2;

/// The operation a [`Gate`] computes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GateOp {
    /// Conjunction.
    And,
    /// Disjunction.
    Or,
    /// Exclusive or.
    Xor,
    /// Negated conjunction.
    Nand,
    /// Negated disjunction.
    Nor,
    /// Negated exclusive or.
    Xnor,
    /// Single-input negation.
    Not,
    /// Single-input copy.
    Buffer,
}

impl GateOp {
    fn name(self) -> &'static str {
        match self {
            GateOp::And => "AND Gate",
            GateOp::Or => "OR Gate",
            GateOp::Xor => "XOR Gate",
            GateOp::Nand => "NAND Gate",
            GateOp::Nor => "NOR Gate",
            GateOp::Xnor => "XNOR Gate",
            GateOp::Not => "NOT Gate",
            GateOp::Buffer => "Buffer",
        }
    }

    fn is_unary(self) -> bool {
        matches!(self, GateOp::Not | GateOp::Buffer)
    }

    fn negated(self) -> bool {
        matches!(self, GateOp::Nand | GateOp::Nor | GateOp::Xnor | GateOp::Not)
    }

    fn fold(self, inputs: &[Value]) -> Value {
        let mut iter = inputs.iter().copied();
        let Some(first) = iter.next() else {
            return Value::NIL;
        };
        let combined = match self {
            GateOp::And | GateOp::Nand => iter.fold(first, |a, b| a & b),
            GateOp::Or | GateOp::Nor => iter.fold(first, |a, b| a | b),
            GateOp::Xor | GateOp::Xnor => iter.fold(first, |a, b| a ^ b),
            GateOp::Not | GateOp::Buffer => first,
        };
        if self.negated() {
            !combined
        } else {
            combined
        }
    }

    fn fold_expr(self, inputs: Vec<Expression>) -> Expression {
        let combined = match self {
            GateOp::And | GateOp::Nand => Expression::and(inputs),
            GateOp::Or | GateOp::Nor => Expression::or(inputs),
            GateOp::Xor | GateOp::Xnor => Expression::xor(inputs),
            GateOp::Not | GateOp::Buffer => Expression::and(inputs),
        };
        if self.negated() {
            combined.not()
        } else {
            combined
        }
    }
}

/// Factory for every gate type; the output is end 0 at the anchor.
#[derive(Debug)]
pub struct Gate {
    op: GateOp,
}

impl Gate {
    /// A factory computing `op`.
    pub fn new(op: GateOp) -> Self {
        Self { op }
    }

    /// The gate's operation.
    pub fn op(&self) -> GateOp {
        self.op
    }

    fn input_count(&self, attrs: &AttributeSet) -> u32 {
        if self.op.is_unary() {
            1
        } else {
            attrs.int(Attribute::INPUTS, DEFAULT_INPUTS).max(1)
        }
    }
}

/// Location of input `index` of `count` on a gate anchored at `loc`.
pub fn input_location(loc: Location, index: u32, count: u32) -> Location {
    let offset = 10 * (2 * index as i32 - (count as i32 - 1));
    loc.translate(-30, offset)
}

impl ComponentFactory for Gate {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn default_attributes(&self) -> AttributeSet {
        let attrs = AttributeSet::new().with(Attribute::WIDTH, AttrValue::Width(BitWidth::ONE));
        if self.op.is_unary() {
            attrs
        } else {
            attrs.with(Attribute::INPUTS, AttrValue::Int(DEFAULT_INPUTS))
        }
    }

    fn ends(&self, location: Location, attrs: &AttributeSet) -> Vec<EndData> {
        let width = attrs.width();
        let count = self.input_count(attrs);
        let mut ends = vec![EndData::output(location, width)];
        ends.extend((0..count).map(|i| EndData::input(input_location(location, i, count), width)));
        ends
    }

    fn propagate(&self, instance: &mut InstanceState<'_>) {
        let width = instance.attributes().width();
        let inputs: Vec<Value> = (1..instance.port_count())
            .filter(|&i| instance.is_port_connected(i))
            .map(|i| instance.port_value(i))
            .collect();
        let out = if inputs.is_empty() {
            Value::error(width)
        } else {
            self.op.fold(&inputs)
        };
        let delay = instance.gate_delay();
        instance.set_port(0, out, delay);
    }

    fn expression_computer(&self) -> Option<&dyn ExpressionComputer> {
        Some(self)
    }
}

impl ExpressionComputer for Gate {
    fn compute(&self, _component: &Component, ends: &[EndData], map: &mut ExpressionMap) {
        let Some((out, inputs)) = ends.split_first() else {
            return;
        };
        for bit in 0..out.width.bits() {
            let terms: Vec<Expression> = inputs
                .iter()
                .filter_map(|end| map.get(end.location, bit).cloned())
                .collect();
            if !terms.is_empty() {
                map.put(out.location, bit, self.op.fold_expr(terms));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Value {
        s.parse().unwrap()
    }

    #[test]
    fn inputs_straddle_the_anchor() {
        let at = Location::new(100, 100);
        assert_eq!(input_location(at, 0, 2), Location::new(70, 90));
        assert_eq!(input_location(at, 1, 2), Location::new(70, 110));
        assert_eq!(input_location(at, 1, 3), Location::new(70, 100));
        assert_eq!(input_location(at, 0, 1), Location::new(70, 100));
    }

    #[test]
    fn fold_semantics() {
        assert_eq!(GateOp::And.fold(&[v("1"), v("0")]), v("0"));
        assert_eq!(GateOp::And.fold(&[v("x"), v("0")]), v("0"));
        assert_eq!(GateOp::Or.fold(&[v("x"), v("1")]), v("1"));
        assert_eq!(GateOp::Nand.fold(&[v("1"), v("1")]), v("0"));
        assert_eq!(GateOp::Xnor.fold(&[v("1"), v("0")]), v("0"));
        assert_eq!(GateOp::Not.fold(&[v("10")]), v("01"));
        assert_eq!(GateOp::Buffer.fold(&[v("E")]), v("E"));
    }

    #[test]
    fn unary_gates_ignore_input_count() {
        let not = Gate::new(GateOp::Not);
        let attrs = AttributeSet::new().with(Attribute::INPUTS, AttrValue::Int(5));
        assert_eq!(not.ends(Location::new(50, 50), &attrs).len(), 2);
        let and = Gate::new(GateOp::And);
        assert_eq!(and.ends(Location::new(50, 50), &attrs).len(), 6);
    }
}
