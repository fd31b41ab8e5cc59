//! Shared value types used across the circa logic simulator.
//!
//! This crate provides grid locations, bit widths, four-state logic, packed
//! multi-bit signal values, and the internal error type used to report
//! invariant violations.

#![warn(missing_docs)]

pub mod location;
pub mod logic;
pub mod result;
pub mod value;
pub mod width;

pub use location::Location;
pub use logic::Logic;
pub use result::{CircaResult, InternalError};
pub use value::{ParseValueError, Value};
pub use width::BitWidth;
