//! Single-bit four-state logic with truth-table operators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// The state of one bit on a wire.
///
/// - `Zero` / `One`: a driven level
/// - `Unknown`: nothing drives the bit (floating)
/// - `Error`: drivers disagree, or an error propagated from an input
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[repr(u8)]
pub enum Logic {
    /// Driven low.
    Zero = 0,
    /// Driven high.
    One = 1,
    /// Floating.
    Unknown = 2,
    /// Conflict or propagated error.
    Error = 3,
}

impl Logic {
    /// Converts a character to a [`Logic`] value.
    ///
    /// Accepts '0', '1', 'x'/'X'/'u'/'U' for unknown and 'e'/'E' for error.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Logic::Zero),
            '1' => Some(Logic::One),
            'x' | 'X' | 'u' | 'U' => Some(Logic::Unknown),
            'e' | 'E' => Some(Logic::Error),
            _ => None,
        }
    }

    /// Converts a boolean to a driven level.
    pub fn from_bool(b: bool) -> Self {
        if b {
            Logic::One
        } else {
            Logic::Zero
        }
    }

    /// Returns `true` for `Zero` and `One`.
    pub fn is_defined(self) -> bool {
        matches!(self, Logic::Zero | Logic::One)
    }

    /// Resolves two drivers of the same bit.
    ///
    /// ```text
    ///     0  1  x  E
    /// 0 | 0  E  0  E
    /// 1 | E  1  1  E
    /// x | 0  1  x  E
    /// E | E  E  E  E
    /// ```
    pub fn combine(self, other: Logic) -> Logic {
        use Logic::*;
        match (self, other) {
            (Unknown, b) => b,
            (a, Unknown) => a,
            (a, b) if a == b && a != Error => a,
            _ => Error,
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Logic::Zero => write!(f, "0"),
            Logic::One => write!(f, "1"),
            Logic::Unknown => write!(f, "x"),
            Logic::Error => write!(f, "E"),
        }
    }
}

/// AND truth table:
/// ```text
///     0  1  x  E
/// 0 | 0  0  0  0
/// 1 | 0  1  x  E
/// x | 0  x  x  E
/// E | 0  E  E  E
/// ```
impl BitAnd for Logic {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        use Logic::*;
        match (self, rhs) {
            (Zero, _) | (_, Zero) => Zero,
            (Error, _) | (_, Error) => Error,
            (Unknown, _) | (_, Unknown) => Unknown,
            (One, One) => One,
        }
    }
}

/// OR truth table:
/// ```text
///     0  1  x  E
/// 0 | 0  1  x  E
/// 1 | 1  1  1  1
/// x | x  1  x  E
/// E | E  1  E  E
/// ```
impl BitOr for Logic {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        use Logic::*;
        match (self, rhs) {
            (One, _) | (_, One) => One,
            (Error, _) | (_, Error) => Error,
            (Unknown, _) | (_, Unknown) => Unknown,
            (Zero, Zero) => Zero,
        }
    }
}

/// XOR truth table:
/// ```text
///     0  1  x  E
/// 0 | 0  1  x  E
/// 1 | 1  0  x  E
/// x | x  x  x  E
/// E | E  E  E  E
/// ```
impl BitXor for Logic {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        use Logic::*;
        match (self, rhs) {
            (Error, _) | (_, Error) => Error,
            (Unknown, _) | (_, Unknown) => Unknown,
            (a, b) => Logic::from_bool(a != b),
        }
    }
}

impl Not for Logic {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Logic::Zero => Logic::One,
            Logic::One => Logic::Zero,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Logic::*;

    const ALL: [Logic; 4] = [Zero, One, Unknown, Error];

    #[test]
    fn and_truth_table() {
        assert_eq!(Zero & Error, Zero);
        assert_eq!(One & One, One);
        assert_eq!(One & Unknown, Unknown);
        assert_eq!(Unknown & Error, Error);
        for v in ALL {
            assert_eq!(Zero & v, Zero);
            assert_eq!(v & Zero, Zero);
        }
    }

    #[test]
    fn or_truth_table() {
        assert_eq!(Zero | Zero, Zero);
        assert_eq!(Zero | Unknown, Unknown);
        assert_eq!(Error | Zero, Error);
        for v in ALL {
            assert_eq!(One | v, One);
        }
    }

    #[test]
    fn xor_truth_table() {
        assert_eq!(One ^ One, Zero);
        assert_eq!(One ^ Zero, One);
        assert_eq!(Unknown ^ One, Unknown);
        assert_eq!(Unknown ^ Error, Error);
    }

    #[test]
    fn not_values() {
        assert_eq!(!Zero, One);
        assert_eq!(!One, Zero);
        assert_eq!(!Unknown, Unknown);
        assert_eq!(!Error, Error);
    }

    #[test]
    fn combine_is_commutative() {
        for a in ALL {
            for b in ALL {
                assert_eq!(a.combine(b), b.combine(a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn combine_conflict_is_error() {
        assert_eq!(Zero.combine(One), Error);
        assert_eq!(One.combine(One), One);
        assert_eq!(Unknown.combine(Zero), Zero);
        assert_eq!(Unknown.combine(Unknown), Unknown);
    }

    #[test]
    fn display() {
        let shown: String = ALL.iter().map(|l| l.to_string()).collect();
        assert_eq!(shown, "01xE");
    }

    #[test]
    fn from_char_valid() {
        assert_eq!(Logic::from_char('0'), Some(Zero));
        assert_eq!(Logic::from_char('X'), Some(Unknown));
        assert_eq!(Logic::from_char('E'), Some(Error));
    }

    #[test]
    fn from_char_invalid() {
        assert_eq!(Logic::from_char('2'), None);
        assert_eq!(Logic::from_char('z'), None);
    }
}
