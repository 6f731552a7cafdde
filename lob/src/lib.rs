//! Price-level order book on a direct-addressed tape
//!
//! Each side of the book keeps the levels near the inside in a fixed-width
//! array indexed by `price - anchor`, with a packed bitset summary for
//! constant-time best-price queries and short scans. Levels that fall
//! outside the tape window overflow into a sorted spill buffer; when a new
//! best price lands outside the window the book recenters the tape around
//! it and drains the spill back in.
//!
//! Single-threaded by design: a worker owns its books (and the optional
//! [`pool::LevelPool`] backing their spill buffers) exclusively.

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod book;
pub mod multi;
pub mod pool;
pub mod spill;
pub mod tape;

pub use book::{Book, Book32, Book64};
pub use multi::{BookOps, BookTier, Handle, MultiBook};
pub use pool::{LevelPool, PoolError};
pub use spill::{NullSink, Sink, SpillBuffer, SpillSide};
pub use tape::{Tape, UpdateResult};
