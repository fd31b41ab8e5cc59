//! Packed multi-bit signal values.
//!
//! A [`Value`] stores up to 64 bits as three masks (driven level, unknown,
//! error) plus a width. Operators work a whole word at a time and follow the
//! per-bit truth tables of [`Logic`].

use crate::logic::Logic;
use crate::width::BitWidth;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};
use std::str::FromStr;

/// A signal value on a bundle, location or port.
///
/// Invariants: no bit above `width` is set in any mask, and each bit is set
/// in at most one of `unknown` and `error`; `value` bits are only set for
/// driven-high bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value {
    width: BitWidth,
    value: u64,
    unknown: u64,
    error: u64,
}

/// Error returned when parsing a [`Value`] from text fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseValueError {
    /// The string contained no bits.
    #[error("empty value")]
    Empty,
    /// A character other than `0`, `1`, `x` or `E` was found.
    #[error("invalid bit character '{0}'")]
    InvalidChar(char),
    /// More than 64 bits were given.
    #[error("value has {0} bits, at most 64 are supported")]
    TooWide(usize),
}

impl Value {
    /// The absence of a value; the identity for [`Value::combine`].
    pub const NIL: Value = Value {
        width: BitWidth::UNKNOWN,
        value: 0,
        unknown: 0,
        error: 0,
    };
    /// Single-bit high.
    pub const TRUE: Value = Value::known(BitWidth::ONE, 1);
    /// Single-bit low.
    pub const FALSE: Value = Value::known(BitWidth::ONE, 0);
    /// Single-bit floating.
    pub const UNKNOWN: Value = Value::unknown(BitWidth::ONE);
    /// Single-bit error.
    pub const ERROR: Value = Value::error(BitWidth::ONE);

    /// Creates a fully driven value from the low `width` bits of `bits`.
    pub const fn known(width: BitWidth, bits: u64) -> Self {
        Self {
            width,
            value: bits & width.mask(),
            unknown: 0,
            error: 0,
        }
    }

    /// Creates an all-floating value.
    pub const fn unknown(width: BitWidth) -> Self {
        Self {
            width,
            value: 0,
            unknown: width.mask(),
            error: 0,
        }
    }

    /// Creates an all-error value.
    pub const fn error(width: BitWidth) -> Self {
        Self {
            width,
            value: 0,
            unknown: 0,
            error: width.mask(),
        }
    }

    /// Creates a single-bit value.
    pub fn from_bool(b: bool) -> Self {
        if b {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }

    /// Builds a value from individual bits, least significant first.
    pub fn from_logic(bits: &[Logic]) -> Self {
        let mut ret = Self {
            width: BitWidth::new(bits.len() as u32),
            value: 0,
            unknown: 0,
            error: 0,
        };
        for (i, bit) in bits.iter().take(64).enumerate() {
            ret.put(i as u32, *bit);
        }
        ret
    }

    /// Creates a value with every bit set to `bit`.
    pub fn repeat(bit: Logic, width: BitWidth) -> Self {
        match bit {
            Logic::Zero => Self::known(width, 0),
            Logic::One => Self::known(width, u64::MAX),
            Logic::Unknown => Self::unknown(width),
            Logic::Error => Self::error(width),
        }
    }

    /// Returns the width of this value.
    pub fn width(&self) -> BitWidth {
        self.width
    }

    /// Returns `true` for [`Value::NIL`].
    pub fn is_nil(&self) -> bool {
        !self.width.is_known()
    }

    /// Returns bit `index`; bits outside the width read as unknown.
    pub fn get(&self, index: u32) -> Logic {
        if index >= self.width.bits() {
            return Logic::Unknown;
        }
        let m = 1u64 << index;
        if self.error & m != 0 {
            Logic::Error
        } else if self.unknown & m != 0 {
            Logic::Unknown
        } else if self.value & m != 0 {
            Logic::One
        } else {
            Logic::Zero
        }
    }

    /// Returns a copy with bit `index` replaced; out-of-range indices are ignored.
    pub fn set(mut self, index: u32, bit: Logic) -> Self {
        if index < self.width.bits() {
            self.put(index, bit);
        }
        self
    }

    fn put(&mut self, index: u32, bit: Logic) {
        let m = 1u64 << index;
        self.value &= !m;
        self.unknown &= !m;
        self.error &= !m;
        match bit {
            Logic::Zero => {}
            Logic::One => self.value |= m,
            Logic::Unknown => self.unknown |= m,
            Logic::Error => self.error |= m,
        }
    }

    /// Iterates over the bits, least significant first.
    pub fn bits(&self) -> impl Iterator<Item = Logic> + '_ {
        (0..self.width.bits()).map(move |i| self.get(i))
    }

    /// Returns `true` if every bit is driven to 0 or 1.
    pub fn is_fully_defined(&self) -> bool {
        self.width.is_known() && self.unknown == 0 && self.error == 0
    }

    /// Returns `true` if any bit is an error.
    pub fn is_error(&self) -> bool {
        self.error != 0
    }

    /// Returns `true` if every bit floats.
    pub fn is_unknown(&self) -> bool {
        self.width.is_known() && self.unknown == self.width.mask()
    }

    /// Returns the driven bits as an integer if the value is fully defined.
    pub fn to_u64(&self) -> Option<u64> {
        self.is_fully_defined().then_some(self.value)
    }

    /// Resolves two drivers of the same node.
    ///
    /// [`Value::NIL`] is the identity. Unknown bits defer to the other driver;
    /// disagreeing driven bits and error bits become errors. Drivers of
    /// different widths resolve to an all-error value of the wider width.
    pub fn combine(self, other: Value) -> Value {
        if self.is_nil() {
            return other;
        }
        if other.is_nil() {
            return self;
        }
        if self.width != other.width {
            return Self::error(self.width.max(other.width));
        }
        let disagree = (self.value ^ other.value) & !(self.unknown | other.unknown);
        let error = self.error | other.error | disagree;
        let unknown = self.unknown & other.unknown & !error;
        Self {
            width: self.width,
            value: (self.value | other.value) & !(error | unknown),
            unknown,
            error,
        }
    }

    /// Replaces every unknown bit with `pull`.
    pub fn pull_each_bit_towards(self, pull: Logic) -> Value {
        let floating = self.unknown;
        if floating == 0 {
            return self;
        }
        let mut ret = self;
        match pull {
            Logic::Unknown => {}
            Logic::Zero => ret.unknown &= !floating,
            Logic::One => {
                ret.unknown &= !floating;
                ret.value |= floating;
            }
            Logic::Error => {
                ret.unknown &= !floating;
                ret.error |= floating;
            }
        }
        ret
    }

    /// Widens or truncates to `width`, filling new high bits with `fill`.
    pub fn extend_width(self, width: BitWidth, fill: Logic) -> Value {
        if width == self.width {
            return self;
        }
        let keep = self.width.mask() & width.mask();
        let mut ret = Self {
            width,
            value: self.value & keep,
            unknown: self.unknown & keep,
            error: self.error & keep,
        };
        for i in self.width.bits()..width.bits() {
            ret.put(i, fill);
        }
        ret
    }

    /// Checks an observed value against `self` as an expectation.
    ///
    /// Unknown bits in the expectation match anything; every other bit must
    /// match exactly, including error bits.
    pub fn compatible(&self, actual: &Value) -> bool {
        if self.width != actual.width {
            return false;
        }
        (0..self.width.bits()).all(|i| match self.get(i) {
            Logic::Unknown => true,
            expected => actual.get(i) == expected,
        })
    }

    fn mismatched(self, other: Value) -> Option<Value> {
        (self.width != other.width).then(|| Self::error(self.width.max(other.width)))
    }
}

impl BitAnd for Value {
    type Output = Value;

    fn bitand(self, rhs: Value) -> Value {
        if let Some(err) = self.mismatched(rhs) {
            return err;
        }
        let mask = self.width.mask();
        let zero = (!(self.value | self.unknown | self.error) | !(rhs.value | rhs.unknown | rhs.error)) & mask;
        let error = (self.error | rhs.error) & !zero;
        let unknown = (self.unknown | rhs.unknown) & !zero & !error;
        Value {
            width: self.width,
            value: self.value & rhs.value,
            unknown,
            error,
        }
    }
}

impl BitOr for Value {
    type Output = Value;

    fn bitor(self, rhs: Value) -> Value {
        if let Some(err) = self.mismatched(rhs) {
            return err;
        }
        let one = self.value | rhs.value;
        let error = (self.error | rhs.error) & !one;
        let unknown = (self.unknown | rhs.unknown) & !one & !error;
        Value {
            width: self.width,
            value: one,
            unknown,
            error,
        }
    }
}

impl BitXor for Value {
    type Output = Value;

    fn bitxor(self, rhs: Value) -> Value {
        if let Some(err) = self.mismatched(rhs) {
            return err;
        }
        let error = self.error | rhs.error;
        let unknown = (self.unknown | rhs.unknown) & !error;
        Value {
            width: self.width,
            value: (self.value ^ rhs.value) & !(error | unknown),
            unknown,
            error,
        }
    }
}

impl Not for Value {
    type Output = Value;

    fn not(self) -> Value {
        Value {
            value: !(self.value | self.unknown | self.error) & self.width.mask(),
            ..self
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            return write!(f, "-");
        }
        for i in (0..self.width.bits()).rev() {
            write!(f, "{}", self.get(i))?;
            if i % 4 == 0 && i != 0 {
                write!(f, " ")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({self})")
    }
}

impl FromStr for Value {
    type Err = ParseValueError;

    /// Parses bits written most significant first; spaces and `_` are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bits = Vec::new();
        for c in s.chars().filter(|c| !c.is_whitespace() && *c != '_') {
            bits.push(Logic::from_char(c).ok_or(ParseValueError::InvalidChar(c))?);
        }
        if bits.is_empty() {
            return Err(ParseValueError::Empty);
        }
        if bits.len() > 64 {
            return Err(ParseValueError::TooWide(bits.len()));
        }
        bits.reverse();
        Ok(Value::from_logic(&bits))
    }
}
