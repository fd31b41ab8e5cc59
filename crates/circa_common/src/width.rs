//! Bit widths of ends, bundles and values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The number of bits carried by an end, bundle or value.
///
/// A width of zero means "not yet known"; bundles whose ends disagree also
/// report [`BitWidth::UNKNOWN`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct BitWidth(u8);

impl BitWidth {
    /// Width not yet determined.
    pub const UNKNOWN: BitWidth = BitWidth(0);
    /// A single bit.
    pub const ONE: BitWidth = BitWidth(1);
    /// The widest supported value.
    pub const MAX: BitWidth = BitWidth(64);

    /// Creates a width, saturating at [`BitWidth::MAX`].
    pub const fn new(bits: u32) -> Self {
        if bits > Self::MAX.0 as u32 {
            Self::MAX
        } else {
            Self(bits as u8)
        }
    }

    /// Returns the number of bits.
    pub const fn bits(self) -> u32 {
        self.0 as u32
    }

    /// Returns `true` unless this is [`BitWidth::UNKNOWN`].
    pub const fn is_known(self) -> bool {
        self.0 != 0
    }

    /// Returns a mask with the low `bits()` bits set.
    pub const fn mask(self) -> u64 {
        if self.0 >= 64 {
            u64::MAX
        } else {
            (1u64 << self.0) - 1
        }
    }
}

impl fmt::Display for BitWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "unknown")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturates_at_max() {
        assert_eq!(BitWidth::new(100), BitWidth::MAX);
        assert_eq!(BitWidth::new(8).bits(), 8);
    }

    #[test]
    fn unknown_is_not_known() {
        assert!(!BitWidth::UNKNOWN.is_known());
        assert!(BitWidth::ONE.is_known());
    }

    #[test]
    fn masks() {
        assert_eq!(BitWidth::UNKNOWN.mask(), 0);
        assert_eq!(BitWidth::new(4).mask(), 0b1111);
        assert_eq!(BitWidth::MAX.mask(), u64::MAX);
    }

    #[test]
    fn display() {
        assert_eq!(BitWidth::new(16).to_string(), "16");
        assert_eq!(BitWidth::UNKNOWN.to_string(), "unknown");
    }
}
