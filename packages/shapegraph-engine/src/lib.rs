/*
 * Shapegraph Engine - join and fixpoint core of a shape analysis
 *
 * Feature-first layout:
 * - shared/   : id vocabulary, work queues, pair stores
 * - features/ : vertical slices (symheap -> compare -> join -> state)
 * - config/   : one flat options struct, JSON or name=value overrides
 *
 * The domain is the symbolic memory graph of a list-shape analysis:
 * heaps whose unbounded linked lists collapse into abstract segments.
 * `join_heaps` merges two heaps reconverging at one program location,
 * `are_isomorphic` decides state-set membership, and the state layer
 * accumulates per-block heap unions until a fixpoint.
 */

pub mod config;
pub mod errors;
pub mod features;
pub mod shared;

pub use config::{EngineOptions, ErrorRecovery, MayExistHeuristic, SchedOrder};
pub use errors::{EngineError, Result};
pub use features::compare::{
    are_isomorphic, isomorphism_maps, match_sub_heaps, SubHeapVisitor, ValMap, Visit,
};
pub use features::join::{
    join_data, join_heaps, DataJoin, JoinError, JoinOutcome, JoinStats, JoinStatus,
};
pub use features::program::{BlockId, Cfg};
pub use features::state::{BlockScheduler, StateMap, StateUnion};
pub use features::symheap::{
    seg_min_length, seg_next_val, CustomValue, ObjKind, SymHeap, UnknownKind,
};
pub use features::trace::TraceGraph;
pub use shared::models::{BindingOff, FldRef, ObjId, TargetSpec, TypeId, ValId, VarId};
