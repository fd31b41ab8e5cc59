//! Component and circuit attributes.
//!
//! An [`AttributeSet`] maps [`Attribute`] keys to [`AttrValue`]s. Sets are
//! read freely; changes made through a transaction are announced to circuit
//! listeners as attribute-change events.

use circa_common::{BitWidth, Logic, Value};
use std::collections::BTreeMap;
use std::fmt;

/// The key of an attribute.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Attribute(&'static str);

impl Attribute {
    /// Bit width of a component's data ends.
    pub const WIDTH: Attribute = Attribute("width");
    /// User-visible label; also the join key for tunnels.
    pub const LABEL: Attribute = Attribute("label");
    /// Number of gate inputs.
    pub const INPUTS: Attribute = Attribute("inputs");
    /// Whether a pin is an output pin.
    pub const OUTPUT: Attribute = Attribute("output");
    /// Driven value of a constant or initial value of a pin.
    pub const VALUE: Attribute = Attribute("value");
    /// Pull direction of a pull resistor.
    pub const PULL: Attribute = Attribute("pull");
    /// Number of split ends of a splitter.
    pub const FANOUT: Attribute = Attribute("fanout");
    /// Ticks a clock stays high.
    pub const HIGH: Attribute = Attribute("high");
    /// Ticks a clock stays low.
    pub const LOW: Attribute = Attribute("low");
    /// Name of a circuit.
    pub const NAME: Attribute = Attribute("name");

    /// Creates a custom attribute key.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the key's name.
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// The value of an attribute.
#[derive(Clone, PartialEq, Debug)]
pub enum AttrValue {
    /// A bit width.
    Width(BitWidth),
    /// A small count.
    Int(u32),
    /// A flag.
    Bool(bool),
    /// Free text.
    Text(String),
    /// A signal value.
    Value(Value),
    /// A single-bit level.
    Logic(Logic),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Width(w) => write!(f, "{w}"),
            AttrValue::Int(n) => write!(f, "{n}"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Text(s) => write!(f, "{s:?}"),
            AttrValue::Value(v) => write!(f, "{v}"),
            AttrValue::Logic(l) => write!(f, "{l}"),
        }
    }
}

/// An ordered map of attribute values.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct AttributeSet {
    values: BTreeMap<Attribute, AttrValue>,
}

impl AttributeSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`AttributeSet::set`].
    pub fn with(mut self, attr: Attribute, value: AttrValue) -> Self {
        self.values.insert(attr, value);
        self
    }

    /// Returns the value stored for `attr`.
    pub fn get(&self, attr: Attribute) -> Option<&AttrValue> {
        self.values.get(&attr)
    }

    /// Stores a value and returns the previous one.
    pub fn set(&mut self, attr: Attribute, value: AttrValue) -> Option<AttrValue> {
        self.values.insert(attr, value)
    }

    /// Removes a value.
    pub fn remove(&mut self, attr: Attribute) -> Option<AttrValue> {
        self.values.remove(&attr)
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (Attribute, &AttrValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// The [`Attribute::WIDTH`] value, defaulting to one bit.
    pub fn width(&self) -> BitWidth {
        match self.get(Attribute::WIDTH) {
            Some(AttrValue::Width(w)) => *w,
            Some(AttrValue::Int(n)) => BitWidth::new(*n),
            _ => BitWidth::ONE,
        }
    }

    /// The [`Attribute::LABEL`] value, or an empty string.
    pub fn label(&self) -> &str {
        self.text(Attribute::LABEL).unwrap_or("")
    }

    /// An integer attribute or `default`.
    pub fn int(&self, attr: Attribute, default: u32) -> u32 {
        match self.get(attr) {
            Some(AttrValue::Int(n)) => *n,
            _ => default,
        }
    }

    /// A boolean attribute or `default`.
    pub fn flag(&self, attr: Attribute, default: bool) -> bool {
        match self.get(attr) {
            Some(AttrValue::Bool(b)) => *b,
            _ => default,
        }
    }

    /// A text attribute.
    pub fn text(&self, attr: Attribute) -> Option<&str> {
        match self.get(attr) {
            Some(AttrValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// A value attribute.
    pub fn value(&self, attr: Attribute) -> Option<Value> {
        match self.get(attr) {
            Some(AttrValue::Value(v)) => Some(*v),
            _ => None,
        }
    }

    /// A single-bit level attribute.
    pub fn logic(&self, attr: Attribute) -> Option<Logic> {
        match self.get(attr) {
            Some(AttrValue::Logic(l)) => Some(*l),
            _ => None,
        }
    }
}
