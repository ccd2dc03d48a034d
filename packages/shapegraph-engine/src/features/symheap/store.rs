//! Arena store for symbolic heaps.
//!
//! Objects and values live in index arenas; content-stable values (targets,
//! custom payloads) are interned, so the same target yields the same id
//! within one heap. Unknown-class values are deliberately not interned:
//! every creation is a fresh id. Cloning preserves all ids, which is what
//! lets heaps descending from one snapshot be told apart from merely
//! isomorphic ones.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::features::intervals::IntRange;
use crate::shared::models::{BindingOff, FldRef, ObjId, TargetSpec, TraceId, TypeId, ValId, VarId};
use crate::shared::PairSet;

use super::domain::{CustomValue, Field, Object, ObjKind, TypeRow, UniBlock, UnknownKind, ValueCore};

/// Interning key for content-stable values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Target(ObjId, i64, TargetSpec),
    RangeTarget(ObjId, IntRange, TargetSpec),
    Custom(CustomValue),
}

/// Counters exposed for assertions and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub objects: usize,
    pub live_objects: usize,
    pub values: usize,
    pub neq_pairs: usize,
}

/// One symbolic heap: objects, values, program-variable roots, and the
/// disequality store.
#[derive(Debug, Clone, Default)]
pub struct SymHeap {
    objects: Vec<Object>,
    values: Vec<ValueCore>,
    val_index: FxHashMap<ValueKey, ValId>,
    vars: BTreeMap<VarId, ObjId>,
    ret_obj: Option<ObjId>,
    neq: PairSet<ValId>,
    type_rows: Vec<TypeRow>,
    type_index: FxHashMap<TypeRow, TypeId>,
    trace: Option<TraceId>,
}

impl SymHeap {
    pub fn new() -> SymHeap {
        SymHeap::default()
    }

    // ═══════════════════════════════════════════════════════════════
    // Types
    // ═══════════════════════════════════════════════════════════════

    /// Intern a static-type row; equal rows share one id.
    pub fn type_intern(&mut self, name: &str, size: i64) -> TypeId {
        debug_assert!(size > 0, "type without a size");
        let row = TypeRow {
            name: name.to_string(),
            size,
        };
        if let Some(&id) = self.type_index.get(&row) {
            return id;
        }
        let id = TypeId::from_index(self.type_rows.len());
        self.type_rows.push(row.clone());
        self.type_index.insert(row, id);
        id
    }

    #[inline]
    pub fn type_row(&self, ty: TypeId) -> &TypeRow {
        &self.type_rows[ty.index()]
    }

    // ═══════════════════════════════════════════════════════════════
    // Objects
    // ═══════════════════════════════════════════════════════════════

    #[inline]
    fn obj(&self, id: ObjId) -> &Object {
        &self.objects[id.index()]
    }

    #[inline]
    fn obj_mut(&mut self, id: ObjId) -> &mut Object {
        &mut self.objects[id.index()]
    }

    fn push_obj(&mut self, obj: Object) -> ObjId {
        let id = ObjId::from_index(self.objects.len());
        self.objects.push(obj);
        // the address is part of the object's identity; intern it eagerly so
        // read-only passes can look it up
        self.val_addr(id, 0, TargetSpec::Region);
        id
    }

    /// Anonymous heap allocation of `size` bytes.
    pub fn alloc(&mut self, size: i64, ty: Option<TypeId>) -> ObjId {
        debug_assert!(size > 0, "empty allocation");
        self.push_obj(Object::new(size, ty, None))
    }

    /// Create the object backing a program variable.
    pub fn var_create(&mut self, var: VarId, size: i64, ty: Option<TypeId>) -> ObjId {
        debug_assert!(
            !self.vars.contains_key(&var),
            "duplicate program variable {var}"
        );
        let id = self.push_obj(Object::new(size, ty, Some(var)));
        self.vars.insert(var, id);
        id
    }

    /// Create the return-value placeholder object.
    pub fn ret_create(&mut self, size: i64, ty: Option<TypeId>) -> ObjId {
        debug_assert!(self.ret_obj.is_none(), "return placeholder already exists");
        let id = self.push_obj(Object::new(size, ty, None));
        self.ret_obj = Some(id);
        id
    }

    #[inline]
    pub fn ret_obj(&self) -> Option<ObjId> {
        self.ret_obj
    }

    /// Adopt an existing object as the return-value placeholder.
    pub(crate) fn set_ret_obj(&mut self, obj: ObjId) {
        debug_assert!(self.obj(obj).valid, "return placeholder must be live");
        self.ret_obj = Some(obj);
    }

    #[inline]
    pub fn obj_by_var(&self, var: VarId) -> Option<ObjId> {
        self.vars.get(&var).copied()
    }

    /// Program variables with their objects, in uid order.
    pub fn program_vars(&self) -> impl Iterator<Item = (VarId, ObjId)> + '_ {
        self.vars.iter().map(|(&v, &o)| (v, o))
    }

    /// All valid objects.
    pub fn live_objects(&self) -> impl Iterator<Item = ObjId> + '_ {
        (0..self.objects.len())
            .map(ObjId::from_index)
            .filter(move |o| self.obj(*o).valid)
    }

    #[inline]
    pub fn obj_is_valid(&self, obj: ObjId) -> bool {
        self.obj(obj).valid
    }

    #[inline]
    pub fn obj_size(&self, obj: ObjId) -> i64 {
        self.obj(obj).size
    }

    #[inline]
    pub fn obj_type(&self, obj: ObjId) -> Option<TypeId> {
        self.obj(obj).ty
    }

    #[inline]
    pub fn obj_var(&self, obj: ObjId) -> Option<VarId> {
        self.obj(obj).var
    }

    #[inline]
    pub fn obj_kind(&self, obj: ObjId) -> ObjKind {
        self.obj(obj).kind
    }

    #[inline]
    pub fn obj_binding(&self, obj: ObjId) -> Option<BindingOff> {
        self.obj(obj).binding
    }

    #[inline]
    pub fn obj_min_len(&self, obj: ObjId) -> u32 {
        self.obj(obj).min_len
    }

    #[inline]
    pub fn obj_proto_level(&self, obj: ObjId) -> u32 {
        self.obj(obj).proto_level
    }

    #[inline]
    pub fn obj_peer(&self, obj: ObjId) -> Option<ObjId> {
        self.obj(obj).peer
    }

    #[inline]
    pub fn obj_is_dls_head(&self, obj: ObjId) -> bool {
        self.obj(obj).dls_head
    }

    /// Set the nesting level; DLS peers stay mirrored.
    pub fn set_proto_level(&mut self, obj: ObjId, level: u32) {
        self.obj_mut(obj).proto_level = level;
        if let Some(peer) = self.obj(obj).peer {
            self.obj_mut(peer).proto_level = level;
        }
    }

    /// Set the minimum-length bound; DLS peers stay mirrored.
    pub fn set_min_len(&mut self, obj: ObjId, len: u32) {
        self.obj_mut(obj).min_len = len;
        if let Some(peer) = self.obj(obj).peer {
            self.obj_mut(peer).min_len = len;
        }
    }

    /// Turn a region into a singly-linked segment.
    pub fn make_sls(&mut self, obj: ObjId, binding: BindingOff, min_len: u32) {
        debug_assert!(!binding.is_doubly_linked(), "SLS with a back link");
        let o = self.obj_mut(obj);
        o.kind = ObjKind::Sls;
        o.binding = Some(binding);
        o.min_len = min_len;
    }

    /// Turn two regions into the two ends of a doubly-linked segment.
    /// Both ends share the binding and the level, per the peer invariant.
    pub fn make_dls(&mut self, first: ObjId, last: ObjId, binding: BindingOff, min_len: u32) {
        debug_assert!(binding.is_doubly_linked(), "DLS without a back link");
        debug_assert!(first != last, "DLS ends must be distinct objects");
        let level = self.obj(first).proto_level;
        {
            let o = self.obj_mut(first);
            o.kind = ObjKind::Dls;
            o.binding = Some(binding);
            o.min_len = min_len;
            o.peer = Some(last);
            o.dls_head = true;
        }
        {
            let o = self.obj_mut(last);
            o.kind = ObjKind::Dls;
            o.binding = Some(binding);
            o.min_len = min_len;
            o.peer = Some(first);
            o.dls_head = false;
            o.proto_level = level;
        }
    }

    /// Turn a region into an optional (0..1) object.
    pub fn make_opt(&mut self, obj: ObjId, binding: Option<BindingOff>) {
        let o = self.obj_mut(obj);
        o.kind = ObjKind::Opt01;
        o.binding = binding;
        o.min_len = 0;
    }

    /// Invalidate an object: fields and annotations vanish, the slot stays
    /// so dangling addresses remain expressible.
    pub fn destroy_obj(&mut self, obj: ObjId) {
        if let Some(var) = self.obj(obj).var {
            self.vars.remove(&var);
        }
        if self.ret_obj == Some(obj) {
            self.ret_obj = None;
        }
        if let Some(peer) = self.obj(obj).peer {
            self.obj_mut(peer).peer = None;
        }
        let o = self.obj_mut(obj);
        o.valid = false;
        o.var = None;
        o.peer = None;
        o.fields.clear();
        o.uni_blocks.clear();
    }

    // ═══════════════════════════════════════════════════════════════
    // Fields and uniform blocks
    // ═══════════════════════════════════════════════════════════════

    /// Write a typed field; overwrites any previous field at `off`.
    pub fn set_field(&mut self, obj: ObjId, off: i64, ty: TypeId, val: ValId) -> FldRef {
        debug_assert!(self.obj(obj).valid, "field write into invalid {obj}");
        let fld_size = self.type_row(ty).size;
        debug_assert!(
            off >= 0 && off + fld_size <= self.obj(obj).size,
            "field outside {obj}"
        );
        self.obj_mut(obj).fields.insert(off, Field { ty, val });
        FldRef::new(obj, off)
    }

    /// Overwrite the value behind an existing field handle.
    pub fn set_field_value(&mut self, fld: FldRef, val: ValId) {
        match self.obj_mut(fld.obj).fields.get_mut(&fld.off) {
            Some(f) => f.val = val,
            None => unreachable!("write through stale field handle {fld}"),
        }
    }

    #[inline]
    pub fn field_at(&self, obj: ObjId, off: i64) -> Option<Field> {
        self.obj(obj).fields.get(&off).copied()
    }

    /// Value behind a field handle; the field must be live.
    pub fn field_value(&self, fld: FldRef) -> ValId {
        match self.obj(fld.obj).fields.get(&fld.off) {
            Some(f) => f.val,
            None => unreachable!("read through stale field handle {fld}"),
        }
    }

    pub fn remove_field(&mut self, obj: ObjId, off: i64) -> Option<Field> {
        self.obj_mut(obj).fields.remove(&off)
    }

    /// Live fields in offset order.
    pub fn live_fields(&self, obj: ObjId) -> impl Iterator<Item = (i64, Field)> + '_ {
        self.obj(obj).fields.iter().map(|(&off, &f)| (off, f))
    }

    /// Live fields holding a pointer, with their targets.
    pub fn live_ptr_fields(&self, obj: ObjId) -> impl Iterator<Item = (i64, ValId, ObjId)> + '_ {
        self.obj(obj).fields.iter().filter_map(move |(&off, f)| {
            self.val_any_target(f.val).map(|target| (off, f.val, target))
        })
    }

    /// Every live field anywhere in the heap whose value points at `target`.
    pub fn refs_to(&self, target: ObjId) -> Vec<(FldRef, ValId)> {
        let mut refs = Vec::new();
        for obj in self.live_objects() {
            for (off, fld) in self.live_fields(obj) {
                if self.val_any_target(fld.val) == Some(target) {
                    refs.push((FldRef::new(obj, off), fld.val));
                }
            }
        }
        refs
    }

    /// Annotate a byte window as holding one repeated template value.
    pub fn write_uni_block(&mut self, obj: ObjId, block: UniBlock) {
        debug_assert!(block.size > 0, "empty uniform block");
        debug_assert!(
            block.off >= 0 && block.off + block.size <= self.obj(obj).size,
            "uniform block outside {obj}"
        );
        self.obj_mut(obj).uni_blocks.insert(block.off, block);
    }

    #[inline]
    pub fn uni_blocks(&self, obj: ObjId) -> &BTreeMap<i64, UniBlock> {
        &self.obj(obj).uni_blocks
    }

    // ═══════════════════════════════════════════════════════════════
    // Values
    // ═══════════════════════════════════════════════════════════════

    fn intern(&mut self, key: ValueKey, core: ValueCore) -> ValId {
        if let Some(&v) = self.val_index.get(&key) {
            return v;
        }
        let v = ValId::from_index(self.values.len());
        self.values.push(core);
        self.val_index.insert(key, v);
        v
    }

    /// Address of `obj` at byte `off` with the given end specifier.
    pub fn val_addr(&mut self, obj: ObjId, off: i64, spec: TargetSpec) -> ValId {
        self.intern(
            ValueKey::Target(obj, off, spec),
            ValueCore::Target { obj, off, spec },
        )
    }

    /// End specifier an address of `obj` gets by default.
    pub fn default_spec(&self, obj: ObjId) -> TargetSpec {
        match self.obj(obj).kind {
            ObjKind::Region | ObjKind::Opt01 => TargetSpec::Region,
            ObjKind::Sls => TargetSpec::First,
            ObjKind::Dls => {
                if self.obj(obj).dls_head {
                    TargetSpec::First
                } else {
                    TargetSpec::Last
                }
            }
        }
    }

    /// Address of the object's origin with its default end specifier.
    pub fn addr_of(&mut self, obj: ObjId) -> ValId {
        let spec = self.default_spec(obj);
        self.val_addr(obj, 0, spec)
    }

    /// Read-only address lookup; present iff that address was ever minted.
    pub fn try_val_addr(&self, obj: ObjId, off: i64, spec: TargetSpec) -> Option<ValId> {
        self.val_index.get(&ValueKey::Target(obj, off, spec)).copied()
    }

    /// Pointer with an uncertain offset; a singular range folds to an
    /// ordinary address.
    pub fn val_range_addr(&mut self, obj: ObjId, off: IntRange, spec: TargetSpec) -> ValId {
        if off.is_singular() {
            return self.val_addr(obj, off.lo, spec);
        }
        self.intern(
            ValueKey::RangeTarget(obj, off, spec),
            ValueCore::RangeTarget { obj, off, spec },
        )
    }

    pub fn val_custom(&mut self, payload: CustomValue) -> ValId {
        self.intern(
            ValueKey::Custom(payload.clone()),
            ValueCore::Custom(payload),
        )
    }

    /// Fresh unknown-class value; never interned, every call a new id.
    pub fn val_unknown(&mut self, kind: UnknownKind) -> ValId {
        let v = ValId::from_index(self.values.len());
        self.values.push(ValueCore::Unknown(kind));
        v
    }

    #[inline]
    pub fn val_core(&self, v: ValId) -> Option<&ValueCore> {
        v.index().map(|i| &self.values[i])
    }

    /// Exact-offset target of a pointer value.
    pub fn val_target(&self, v: ValId) -> Option<(ObjId, i64, TargetSpec)> {
        match self.val_core(v) {
            Some(&ValueCore::Target { obj, off, spec }) => Some((obj, off, spec)),
            _ => None,
        }
    }

    /// Range-offset target of a pointer value.
    pub fn val_range_target(&self, v: ValId) -> Option<(ObjId, IntRange, TargetSpec)> {
        match self.val_core(v) {
            Some(&ValueCore::RangeTarget { obj, off, spec }) => Some((obj, off, spec)),
            _ => None,
        }
    }

    /// Target object of either pointer flavor.
    pub fn val_any_target(&self, v: ValId) -> Option<ObjId> {
        match self.val_core(v) {
            Some(&ValueCore::Target { obj, .. }) | Some(&ValueCore::RangeTarget { obj, .. }) => {
                Some(obj)
            }
            _ => None,
        }
    }

    pub fn val_unknown_kind(&self, v: ValId) -> Option<UnknownKind> {
        match self.val_core(v) {
            Some(&ValueCore::Unknown(kind)) => Some(kind),
            _ => None,
        }
    }

    pub fn val_custom_ref(&self, v: ValId) -> Option<&CustomValue> {
        match self.val_core(v) {
            Some(ValueCore::Custom(payload)) => Some(payload),
            _ => None,
        }
    }

    #[inline]
    pub fn val_count(&self) -> usize {
        self.values.len()
    }

    // ═══════════════════════════════════════════════════════════════
    // Disequalities
    // ═══════════════════════════════════════════════════════════════

    /// Record `a != b`. Returns true iff the pair is new.
    pub fn add_neq(&mut self, a: ValId, b: ValId) -> bool {
        debug_assert!(!a.is_invalid() && !b.is_invalid(), "neq over invalid value");
        debug_assert!(a != b, "contradictory disequality {a} != {a}");
        self.neq.add(a, b)
    }

    pub fn del_neq(&mut self, a: ValId, b: ValId) -> bool {
        self.neq.remove(a, b)
    }

    #[inline]
    pub fn has_explicit_neq(&self, a: ValId, b: ValId) -> bool {
        self.neq.contains(a, b)
    }

    pub fn neq_pairs(&self) -> impl Iterator<Item = (ValId, ValId)> + '_ {
        self.neq.iter()
    }

    /// True for objects that are guaranteed to contribute at least one
    /// concrete node.
    fn guaranteed_node(&self, obj: ObjId) -> bool {
        let o = self.obj(obj);
        o.valid && (o.kind == ObjKind::Region || o.min_len >= 1)
    }

    /// Outward continuation value of a segment: what follows the last
    /// summarized node.
    pub(crate) fn seg_out_next_val(&self, seg: ObjId) -> Option<ValId> {
        let binding = self.obj(seg).binding?;
        let carrier = match self.obj(seg).kind {
            ObjKind::Dls if self.obj(seg).dls_head => self.obj(seg).peer?,
            _ => seg,
        };
        self.field_at(carrier, binding.next).map(|f| f.val)
    }

    /// Decide `a != b` from the explicit store plus structural facts:
    /// null vs. any address, null vs. a nonzero numeric payload, distinct
    /// offsets in one object, distinct guaranteed-live objects (with the
    /// DLS first/last exception below length 2), and a non-empty segment's
    /// head against its own continuation.
    pub fn prove_neq(&self, a: ValId, b: ValId) -> bool {
        if a == b {
            return false;
        }
        if self.neq.contains(a, b) {
            return true;
        }

        // null vs. addresses and nonzero numerics
        let null_vs = |other: ValId| -> bool {
            if self.val_any_target(other).is_some() {
                return true;
            }
            if let Some(rng) = self.val_custom_ref(other).and_then(CustomValue::as_range) {
                return !(rng.lo <= 0 && 0 <= rng.hi);
            }
            false
        };
        if a.is_null() {
            return null_vs(b);
        }
        if b.is_null() {
            return null_vs(a);
        }

        if let (Some((o1, off1, sp1)), Some((o2, off2, sp2))) =
            (self.val_target(a), self.val_target(b))
        {
            if o1 == o2 && sp1 == sp2 && off1 != off2 {
                return true;
            }
            if o1 != o2 && self.guaranteed_node(o1) && self.guaranteed_node(o2) {
                // first and last of one DLS coincide until length 2
                let peers = self.obj(o1).peer == Some(o2);
                if !peers || self.obj(o1).min_len >= 2 {
                    return true;
                }
            }
        }

        // non-empty segment: its head address differs from its continuation
        let head_vs_next = |head: ValId, next: ValId| -> bool {
            if let Some((obj, off, _)) = self.val_target(head) {
                let o = self.obj(obj);
                if o.kind.is_abstract() && o.min_len >= 1 {
                    if let Some(binding) = o.binding {
                        if off == binding.head && self.seg_out_next_val(obj) == Some(next) {
                            return true;
                        }
                    }
                }
            }
            false
        };
        head_vs_next(a, b) || head_vs_next(b, a)
    }

    // ═══════════════════════════════════════════════════════════════
    // Repair support
    // ═══════════════════════════════════════════════════════════════

    /// Retarget every pointer at `from` to point at `to` instead.
    ///
    /// Where the retargeted content collides with an already-interned value,
    /// the ids merge; the returned map records stale id -> canonical id, and
    /// all fields, uniform blocks, and disequalities are rewritten with it.
    pub fn redirect_target(&mut self, from: ObjId, to: ObjId) -> FxHashMap<ValId, ValId> {
        debug_assert!(from != to, "redirect onto itself");
        let mut merged: FxHashMap<ValId, ValId> = FxHashMap::default();

        for idx in 0..self.values.len() {
            let vid = ValId::from_index(idx);
            let (old_key, new_key, new_core) = match self.values[idx] {
                ValueCore::Target { obj, off, spec } if obj == from => (
                    ValueKey::Target(from, off, spec),
                    ValueKey::Target(to, off, spec),
                    ValueCore::Target { obj: to, off, spec },
                ),
                ValueCore::RangeTarget { obj, off, spec } if obj == from => (
                    ValueKey::RangeTarget(from, off, spec),
                    ValueKey::RangeTarget(to, off, spec),
                    ValueCore::RangeTarget { obj: to, off, spec },
                ),
                _ => continue,
            };

            self.val_index.remove(&old_key);
            self.values[idx] = new_core;
            if let Some(&canonical) = self.val_index.get(&new_key) {
                merged.insert(vid, canonical);
            } else {
                self.val_index.insert(new_key, vid);
            }
        }

        if !merged.is_empty() {
            for obj in &mut self.objects {
                for fld in obj.fields.values_mut() {
                    if let Some(&canonical) = merged.get(&fld.val) {
                        fld.val = canonical;
                    }
                }
                for block in obj.uni_blocks.values_mut() {
                    if let Some(&canonical) = merged.get(&block.tpl) {
                        block.tpl = canonical;
                    }
                }
            }

            let pairs: Vec<(ValId, ValId)> = self.neq.iter().collect();
            for (x, y) in pairs {
                let nx = merged.get(&x).copied().unwrap_or(x);
                let ny = merged.get(&y).copied().unwrap_or(y);
                if nx != x || ny != y {
                    self.neq.remove(x, y);
                    debug_assert!(nx != ny, "redirect folded a disequality onto itself");
                    if nx != ny {
                        self.neq.add(nx, ny);
                    }
                }
            }
        }
        merged
    }

    // ═══════════════════════════════════════════════════════════════
    // Trace + stats
    // ═══════════════════════════════════════════════════════════════

    #[inline]
    pub fn trace_node(&self) -> Option<TraceId> {
        self.trace
    }

    #[inline]
    pub fn set_trace_node(&mut self, node: TraceId) {
        self.trace = Some(node);
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            objects: self.objects.len(),
            live_objects: self.live_objects().count(),
            values: self.values.len(),
            neq_pairs: self.neq.len(),
        }
    }
}
