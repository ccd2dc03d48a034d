//! Join of two symbolic heaps.
//!
//! `join_heaps` merges two heaps that reconverge at one program location
//! into a single sound generalization, summarizing matching concrete chains
//! into abstract list segments along the way. `join_data` runs the same
//! algorithm self-joined to merge two sub-structures inside one heap.
//!
//! Every call reports how much generalization happened through
//! [`JoinStatus`]; the state layer turns that into keep/replace decisions.

use std::fmt;

use thiserror::Error;

use crate::shared::models::{ObjId, ValId};

mod context;
mod discover;
mod engine;
mod repair;

pub use engine::{join_data, join_heaps, DataJoin, JoinOutcome};

/// How the joined heap relates to the two inputs. Escalation over one call
/// only ever moves forward: `UseAny` below the two `UseSh` states below
/// `ThreeWay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    /// The inputs are interchangeable; either one is the result.
    UseAny,
    /// The result is equivalent to sh1, which covers sh2.
    UseSh1,
    /// The result is equivalent to sh2, which covers sh1.
    UseSh2,
    /// A genuine generalization covering both inputs, equivalent to neither.
    ThreeWay,
}

impl JoinStatus {
    /// Fold another observation into the accumulator, monotonically.
    pub fn escalate(&mut self, other: JoinStatus) {
        *self = match (*self, other) {
            (s, JoinStatus::UseAny) => s,
            (JoinStatus::UseAny, s) => s,
            (s, o) if s == o => s,
            _ => JoinStatus::ThreeWay,
        };
    }

    /// Escalate from coverage facts: `eq1` when the joined piece is still
    /// equivalent to sh1's, `eq2` likewise for sh2.
    pub fn escalate_cover(&mut self, eq1: bool, eq2: bool) {
        match (eq1, eq2) {
            (true, true) => {}
            (true, false) => self.escalate(JoinStatus::UseSh1),
            (false, true) => self.escalate(JoinStatus::UseSh2),
            (false, false) => self.escalate(JoinStatus::ThreeWay),
        }
    }
}

impl fmt::Display for JoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinStatus::UseAny => "use_any",
            JoinStatus::UseSh1 => "use_sh1",
            JoinStatus::UseSh2 => "use_sh2",
            JoinStatus::ThreeWay => "three_way",
        };
        f.write_str(name)
    }
}

/// Why a join call gave up. Expected non-matches, not engine defects; the
/// caller keeps the heaps separate and moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("program variable sets differ")]
    VarMismatch,

    #[error("values {v1} and {v2} cannot be joined")]
    Incompatible { v1: ValId, v2: ValId },

    #[error("objects {o1} and {o2} cannot be joined")]
    ObjMismatch { o1: ObjId, o2: ObjId },

    #[error("nesting levels of {o1} and {o2} do not reconcile")]
    LevelMismatch { o1: ObjId, o2: ObjId },

    #[error("destinations {stale} and {keep} cannot be unified")]
    RepairConflict { stale: ObjId, keep: ObjId },

    #[error("result would be a three-way join, which is disabled")]
    ThreeWayDisabled,
}

/// Counters accumulated over one join call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoinStats {
    /// Value pairs resolved, including cache hits.
    pub pairs_joined: u64,
    /// Pairs answered from the pair cache.
    pub cache_hits: u64,
    /// Destination objects created.
    pub objects_created: u64,
    /// Concrete chains collapsed into fresh segments.
    pub segments_summarized: u64,
    /// Segments cloned one-sidedly at minimum length zero.
    pub segments_inserted: u64,
    /// Concrete objects wrapped as optionals.
    pub may_exist_wraps: u64,
    /// Duplicate destinations unified by the repair pass.
    pub repairs: u64,
}

/// One destination object that ended up as a prototype, with the source
/// object(s) it was joined from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtoPair {
    pub dst: ObjId,
    pub src1: Option<ObjId>,
    pub src2: Option<ObjId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_is_monotone() {
        let mut s = JoinStatus::UseAny;
        s.escalate(JoinStatus::UseAny);
        assert_eq!(s, JoinStatus::UseAny);

        s.escalate(JoinStatus::UseSh2);
        assert_eq!(s, JoinStatus::UseSh2);

        // re-asserting the same side changes nothing
        s.escalate(JoinStatus::UseSh2);
        assert_eq!(s, JoinStatus::UseSh2);

        // the opposite side forces a genuine three-way
        s.escalate(JoinStatus::UseSh1);
        assert_eq!(s, JoinStatus::ThreeWay);

        // and nothing ever downgrades
        s.escalate(JoinStatus::UseAny);
        s.escalate(JoinStatus::UseSh1);
        assert_eq!(s, JoinStatus::ThreeWay);
    }

    #[test]
    fn coverage_maps_onto_the_lattice() {
        let mut s = JoinStatus::UseAny;
        s.escalate_cover(true, true);
        assert_eq!(s, JoinStatus::UseAny);

        s.escalate_cover(true, false);
        assert_eq!(s, JoinStatus::UseSh1);

        let mut t = JoinStatus::UseAny;
        t.escalate_cover(false, false);
        assert_eq!(t, JoinStatus::ThreeWay);
    }
}
