//! Value and object model of the symbolic heap.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::features::intervals::IntRange;
use crate::shared::models::{BindingOff, ObjId, TargetSpec, TypeId, VarId};
use crate::shared::ValId;

/// Classes of values that carry no structure to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnknownKind {
    /// Arbitrary content the analysis cannot track.
    Unknown,
    /// Content explicitly widened away.
    DontCare,
    /// Never written since allocation.
    Uninitialized,
}

/// Payload wrapped by a custom value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomValue {
    Int(i64),
    Range(IntRange),
    Str(String),
    /// Function address by frontend uid.
    Fnc(u32),
}

impl CustomValue {
    /// Numeric view shared by `Int` and `Range` payloads.
    pub fn as_range(&self) -> Option<IntRange> {
        match self {
            CustomValue::Int(n) => Some(IntRange::num(*n)),
            CustomValue::Range(r) => Some(*r),
            _ => None,
        }
    }
}

/// What one (non-special) value denotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueCore {
    /// Address of (or pointer into) an object.
    Target {
        obj: ObjId,
        off: i64,
        spec: TargetSpec,
    },
    /// Pointer with an uncertain byte offset into a known object.
    RangeTarget {
        obj: ObjId,
        off: IntRange,
        spec: TargetSpec,
    },
    Custom(CustomValue),
    Unknown(UnknownKind),
}

/// Abstraction kind of an object, ordered by generality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjKind {
    /// Concrete region: a single allocation, variable, or list node.
    Region,
    /// Optional object, present 0 or 1 times.
    Opt01,
    /// Singly-linked list segment.
    Sls,
    /// Doubly-linked list segment, mirrored by a peer object.
    Dls,
}

impl ObjKind {
    #[inline]
    pub fn is_abstract(self) -> bool {
        !matches!(self, ObjKind::Region)
    }
}

/// One live (written, typed) field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub ty: TypeId,
    pub val: ValId,
}

/// A byte window known to hold one repeated template value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniBlock {
    pub off: i64,
    pub size: i64,
    /// Template value; null for zeroed blocks, an unknown otherwise.
    pub tpl: ValId,
}

impl UniBlock {
    /// Half-open byte window covered by the block.
    #[inline]
    pub fn window(&self) -> (i64, i64) {
        (self.off, self.off + self.size)
    }
}

/// Object record. Field invariants are maintained by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub(crate) valid: bool,
    pub(crate) size: i64,
    pub(crate) ty: Option<TypeId>,
    pub(crate) var: Option<VarId>,
    pub(crate) fields: BTreeMap<i64, Field>,
    pub(crate) uni_blocks: BTreeMap<i64, UniBlock>,
    pub(crate) kind: ObjKind,
    pub(crate) binding: Option<BindingOff>,
    pub(crate) min_len: u32,
    pub(crate) proto_level: u32,
    pub(crate) peer: Option<ObjId>,
    /// True for the first-end object of a DLS pair.
    pub(crate) dls_head: bool,
}

impl Object {
    pub(crate) fn new(size: i64, ty: Option<TypeId>, var: Option<VarId>) -> Object {
        Object {
            valid: true,
            size,
            ty,
            var,
            fields: BTreeMap::new(),
            uni_blocks: BTreeMap::new(),
            kind: ObjKind::Region,
            binding: None,
            min_len: 0,
            proto_level: 0,
            peer: None,
            dls_head: false,
        }
    }
}

/// Interned static-type row: a name plus its byte size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRow {
    pub name: String,
    pub size: i64,
}
