//! Symbolic heap domain: objects, values, segments, and junk collection.

pub mod domain;
pub mod gc;
pub mod segment;
pub mod store;

pub use domain::{CustomValue, Field, ObjKind, Object, TypeRow, UniBlock, UnknownKind, ValueCore};
pub use gc::collect_junk;
pub use segment::{
    peer_or_self, seg_destroy, seg_min_length, seg_next_val, seg_prev_val, seg_set_min_length,
};
pub use store::{HeapStats, SymHeap};
