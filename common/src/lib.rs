//! Common types shared by the tape-book crates
//!
//! Prices are signed integer ticks, quantities unsigned integer units.
//! The `Price` and `Qty` traits let the book crates stay generic over the
//! tick width (i16/i32/i64) without paying for it at runtime.

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod types;

pub use types::*;
