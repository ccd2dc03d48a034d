//! Integer ranges and interval-keyed lookup.

pub mod arena;
pub mod range;

pub use arena::{IntervalArena, Window};
pub use range::{IntRange, INT_MAX, INT_MIN};
