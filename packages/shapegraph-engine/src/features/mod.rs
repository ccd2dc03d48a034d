//! Feature modules: vertical slices of the engine.
//!
//! `symheap` is the memory-state domain everything else operates on;
//! `compare` and `join` are the two big algorithms; `state` and `program`
//! drive them to a fixpoint over a CFG. `intervals`, `prototype`, and
//! `trace` are their supporting structures.

pub mod compare;
pub mod intervals;
pub mod join;
pub mod program;
pub mod prototype;
pub mod state;
pub mod symheap;
pub mod trace;
