//! Shared identifier and addressing vocabulary of the heap domain.
//!
//! Every store hands out small-integer arena handles instead of pointers;
//! per-call translation tables are plain hash maps over these ids. Cloning a
//! heap preserves ids, so heaps descending from a common snapshot agree on
//! the ids of structure they inherited; the join relies on that to tell
//! "same value" from "merely isomorphic value".

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value ids below this bound are reserved for special constants.
const FIRST_REAL_VAL: u32 = 3;

/// Handle of one value inside a `SymHeap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValId(u32);

impl ValId {
    /// Placeholder for "no value"; also the missing side of one-sided join items.
    pub const INVALID: ValId = ValId(0);
    /// The null pointer / zero constant.
    pub const NULL: ValId = ValId(1);
    /// Boolean truth as produced by proven conditions.
    pub const TRUE: ValId = ValId(2);

    /// Special values are literal: they never enter substitution maps.
    #[inline]
    pub fn is_special(self) -> bool {
        self.0 < FIRST_REAL_VAL
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self == Self::INVALID
    }

    #[inline]
    pub(crate) fn from_index(index: usize) -> ValId {
        ValId(FIRST_REAL_VAL + index as u32)
    }

    /// Arena slot behind a non-special id.
    #[inline]
    pub(crate) fn index(self) -> Option<usize> {
        if self.is_special() {
            None
        } else {
            Some((self.0 - FIRST_REAL_VAL) as usize)
        }
    }
}

impl fmt::Display for ValId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ValId::INVALID => write!(f, "#invalid"),
            ValId::NULL => write!(f, "#null"),
            ValId::TRUE => write!(f, "#true"),
            ValId(raw) => write!(f, "v{raw}"),
        }
    }
}

/// Handle of one object inside a `SymHeap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjId(u32);

impl ObjId {
    #[inline]
    pub(crate) fn from_index(index: usize) -> ObjId {
        ObjId(index as u32)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj{}", self.0)
    }
}

/// Program-variable uid, assigned by the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var{}", self.0)
    }
}

/// Interned static type row inside one heap's type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    pub(crate) fn from_index(index: usize) -> TypeId {
        TypeId(index as u32)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ty{}", self.0)
    }
}

/// Node handle inside the append-only trace graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraceId(u32);

impl TraceId {
    #[inline]
    pub(crate) fn from_index(index: usize) -> TraceId {
        TraceId(index as u32)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tr{}", self.0)
    }
}

/// Stable address of one live field: owning object plus byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FldRef {
    pub obj: ObjId,
    pub off: i64,
}

impl FldRef {
    #[inline]
    pub fn new(obj: ObjId, off: i64) -> FldRef {
        FldRef { obj, off }
    }
}

impl fmt::Display for FldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.obj, self.off)
    }
}

/// Which part of a (possibly abstract) target an address denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetSpec {
    /// A concrete target: region or optional object.
    Region,
    /// The first node summarized by an abstract segment.
    First,
    /// The last node summarized by an abstract segment.
    Last,
    /// An address valid for every node the segment summarizes.
    All,
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetSpec::Region => "region",
            TargetSpec::First => "first",
            TargetSpec::Last => "last",
            TargetSpec::All => "all",
        };
        f.write_str(name)
    }
}

/// Byte offsets tying a linked-structure node shape to its object.
///
/// For singly-linked shapes `prev == next` by convention; a doubly-linked
/// shape carries two distinct link offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingOff {
    /// Offset of the bound head within the node (0 for plain list nodes).
    pub head: i64,
    /// Offset of the next-pointer field.
    pub next: i64,
    /// Offset of the prev-pointer field.
    pub prev: i64,
}

impl BindingOff {
    /// Singly-linked binding: one link field, head at `head`.
    #[inline]
    pub fn sls(head: i64, next: i64) -> BindingOff {
        BindingOff { head, next, prev: next }
    }

    /// Doubly-linked binding with distinct link fields.
    #[inline]
    pub fn dls(head: i64, next: i64, prev: i64) -> BindingOff {
        BindingOff { head, next, prev }
    }

    /// True for bindings that carry a distinct back link.
    #[inline]
    pub fn is_doubly_linked(&self) -> bool {
        self.prev != self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_values_are_classified() {
        assert!(ValId::INVALID.is_special());
        assert!(ValId::NULL.is_special());
        assert!(ValId::TRUE.is_special());
        assert!(ValId::NULL.is_null());
        assert!(!ValId::NULL.is_invalid());

        let real = ValId::from_index(0);
        assert!(!real.is_special());
        assert_eq!(real.index(), Some(0));
        assert_eq!(ValId::NULL.index(), None);
    }

    #[test]
    fn display_is_stable() {
        assert_eq!(ValId::NULL.to_string(), "#null");
        assert_eq!(ValId::from_index(4).to_string(), "v7");
        assert_eq!(ObjId::from_index(2).to_string(), "obj2");
        assert_eq!(FldRef::new(ObjId::from_index(1), 8).to_string(), "obj1@8");
    }

    #[test]
    fn binding_classifies_shapes() {
        assert!(!BindingOff::sls(0, 8).is_doubly_linked());
        assert!(BindingOff::dls(0, 8, 16).is_doubly_linked());
    }
}
