//! Boolean expressions for combinational analysis.
//!
//! Analysis assigns an [`Expression`] to every wire thread it can reach.
//! Components that support analysis expose an [`ExpressionComputer`] that
//! reads the expressions on their inputs from an [`ExpressionMap`] and writes
//! expressions for their outputs.

use crate::component::{Component, EndData};
use crate::ids::ThreadId;
use crate::network::BundleNetwork;
use circa_common::{Location, Logic};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A boolean expression over named input bits.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Expression {
    /// A constant bit.
    Constant(bool),
    /// An input bit.
    Variable(String),
    /// Negation.
    Not(Box<Expression>),
    /// Conjunction of two or more terms.
    And(Vec<Expression>),
    /// Disjunction of two or more terms.
    Or(Vec<Expression>),
    /// Exclusive or of two or more terms.
    Xor(Vec<Expression>),
}

impl Expression {
    /// A variable.
    pub fn var(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    /// Negates `self`, folding double negation and constants.
    pub fn not(self) -> Self {
        match self {
            Expression::Constant(b) => Expression::Constant(!b),
            Expression::Not(inner) => *inner,
            other => Expression::Not(Box::new(other)),
        }
    }

    /// Builds an n-ary operator node; a single term is returned as is.
    pub fn and(terms: Vec<Expression>) -> Self {
        Self::nary(terms, Expression::And)
    }

    /// See [`Expression::and`].
    pub fn or(terms: Vec<Expression>) -> Self {
        Self::nary(terms, Expression::Or)
    }

    /// See [`Expression::and`].
    pub fn xor(terms: Vec<Expression>) -> Self {
        Self::nary(terms, Expression::Xor)
    }

    fn nary(mut terms: Vec<Expression>, build: fn(Vec<Expression>) -> Expression) -> Self {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            build(terms)
        }
    }

    /// Evaluates under `assignment`; `None` if a variable is unassigned.
    pub fn evaluate(&self, assignment: &impl Fn(&str) -> Option<bool>) -> Option<bool> {
        Some(match self {
            Expression::Constant(b) => *b,
            Expression::Variable(name) => assignment(name)?,
            Expression::Not(inner) => !inner.evaluate(assignment)?,
            Expression::And(terms) => {
                let mut acc = true;
                for t in terms {
                    acc &= t.evaluate(assignment)?;
                }
                acc
            }
            Expression::Or(terms) => {
                let mut acc = false;
                for t in terms {
                    acc |= t.evaluate(assignment)?;
                }
                acc
            }
            Expression::Xor(terms) => {
                let mut acc = false;
                for t in terms {
                    acc ^= t.evaluate(assignment)?;
                }
                acc
            }
        })
    }

    /// Names of the variables used, sorted and deduplicated.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Expression::Constant(_) => {}
            Expression::Variable(name) => out.push(name.clone()),
            Expression::Not(inner) => inner.collect_variables(out),
            Expression::And(terms) | Expression::Or(terms) | Expression::Xor(terms) => {
                for t in terms {
                    t.collect_variables(out);
                }
            }
        }
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        match self {
            Expression::Constant(_) | Expression::Variable(_) => 1,
            Expression::Not(inner) => 1 + inner.size(),
            Expression::And(terms) | Expression::Or(terms) | Expression::Xor(terms) => {
                1 + terms.iter().map(Expression::size).sum::<usize>()
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expression::Or(_) => 1,
            Expression::Xor(_) => 2,
            Expression::And(_) => 3,
            Expression::Not(_) => 4,
            Expression::Constant(_) | Expression::Variable(_) => 5,
        }
    }

    fn fmt_child(&self, child: &Expression, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if child.precedence() <= self.precedence() {
            write!(f, "({child})")
        } else {
            write!(f, "{child}")
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (terms, op) = match self {
            Expression::Constant(b) => return write!(f, "{}", u8::from(*b)),
            Expression::Variable(name) => return f.write_str(name),
            Expression::Not(inner) => {
                f.write_str("~")?;
                return self.fmt_child(inner, f);
            }
            Expression::And(terms) => (terms, " & "),
            Expression::Or(terms) => (terms, " | "),
            Expression::Xor(terms) => (terms, " ^ "),
        };
        for (i, t) in terms.iter().enumerate() {
            if i > 0 {
                f.write_str(op)?;
            }
            self.fmt_child(t, f)?;
        }
        Ok(())
    }
}

/// Expressions keyed by wire thread, addressed through locations.
#[derive(Clone, Debug)]
pub struct ExpressionMap {
    network: Arc<BundleNetwork>,
    exprs: HashMap<ThreadId, Expression>,
    changed: bool,
}

impl ExpressionMap {
    /// An empty map over `network`.
    pub fn new(network: Arc<BundleNetwork>) -> Self {
        Self {
            network,
            exprs: HashMap::new(),
            changed: false,
        }
    }

    fn thread(&self, loc: Location, bit: u32) -> Option<ThreadId> {
        self.network
            .bundle_at(loc)?
            .threads()?
            .get(bit as usize)
            .copied()
    }

    /// The expression on bit `bit` at `loc`.
    pub fn get(&self, loc: Location, bit: u32) -> Option<&Expression> {
        self.exprs.get(&self.thread(loc, bit)?)
    }

    /// Assigns the expression on bit `bit` at `loc`. Points outside any
    /// bundle of known width are ignored.
    pub fn put(&mut self, loc: Location, bit: u32, expr: Expression) {
        let Some(thread) = self.thread(loc, bit) else {
            return;
        };
        if self.exprs.get(&thread) != Some(&expr) {
            self.exprs.insert(thread, expr);
            self.changed = true;
        }
    }

    /// Returns whether any assignment changed since the last call, and
    /// clears the flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

/// Symbolic evaluation of one component type.
pub trait ExpressionComputer: Send + Sync {
    /// Reads input expressions at `ends` and writes output expressions.
    fn compute(&self, component: &Component, ends: &[EndData], map: &mut ExpressionMap);
}

/// An [`ExpressionComputer`] for components producing a constant.
pub(crate) fn constant_expressions(ends: &[EndData], value: impl Fn(u32) -> Logic, map: &mut ExpressionMap) {
    let Some(out) = ends.first() else {
        return;
    };
    for bit in 0..out.width.bits() {
        match value(bit) {
            Logic::Zero => map.put(out.location, bit, Expression::Constant(false)),
            Logic::One => map.put(out.location, bit, Expression::Constant(true)),
            Logic::Unknown | Logic::Error => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(s: &str) -> Expression {
        Expression::var(s)
    }

    #[test]
    fn display_respects_precedence() {
        let e = Expression::and(vec![Expression::or(vec![var("a"), var("b")]), var("c").not()]);
        assert_eq!(e.to_string(), "(a | b) & ~c");
        let e = Expression::or(vec![Expression::and(vec![var("a"), var("b")]), var("c")]);
        assert_eq!(e.to_string(), "a & b | c");
        let e = Expression::and(vec![var("a"), var("b")]).not();
        assert_eq!(e.to_string(), "~(a & b)");
    }

    #[test]
    fn negated_atoms_render_bare() {
        let e = Expression::xor(vec![var("a").not(), var("b")]);
        assert_eq!(e.to_string(), "~a ^ b");
        let e = Expression::Not(Box::new(Expression::Constant(true)));
        assert_eq!(e.to_string(), "~1");
        let e = Expression::Not(Box::new(var("a").not()));
        assert_eq!(e.to_string(), "~(~a)");
    }

    #[test]
    fn builders_fold() {
        assert_eq!(var("a").not().not(), var("a"));
        assert_eq!(Expression::Constant(true).not(), Expression::Constant(false));
        assert_eq!(Expression::and(vec![var("a")]), var("a"));
    }

    #[test]
    fn evaluates_under_assignment() {
        let e = Expression::xor(vec![var("a"), Expression::and(vec![var("b"), var("c")])]);
        let env = |n: &str| match n {
            "a" => Some(true),
            "b" => Some(true),
            "c" => Some(false),
            _ => None,
        };
        assert_eq!(e.evaluate(&env), Some(true));
        assert_eq!(var("z").evaluate(&env), None);
        assert_eq!(e.variables(), vec!["a", "b", "c"]);
        assert_eq!(e.size(), 5);
    }
}
