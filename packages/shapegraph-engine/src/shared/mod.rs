//! Cross-feature building blocks: id vocabulary, work queues, pair stores.

pub mod models;
pub mod pair_store;
pub mod worklist;

pub use models::{BindingOff, FldRef, ObjId, TargetSpec, TraceId, TypeId, ValId, VarId};
pub use pair_store::{PairMap, PairSet};
pub use worklist::{Fifo, Lifo, Queue, WorkList, WorkListFifo};
