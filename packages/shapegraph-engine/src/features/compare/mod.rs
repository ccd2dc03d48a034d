//! Structural equality between symbolic heaps.
//!
//! Two heaps are isomorphic when a bidirectional value substitution maps one
//! onto the other: same program variables, same object shapes, same segment
//! metadata, and every disequality of either side provable in the other.
//! The sub-heap variant runs the same walk from caller-supplied seed pairs
//! under a visitor that can prune or cancel; the joiner uses it as its
//! lookahead probe.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::features::symheap::SymHeap;
use crate::shared::models::{ObjId, TargetSpec, TypeId, ValId};
use crate::shared::WorkList;

/// Bidirectional value substitution built during a comparison.
#[derive(Debug, Clone, Default)]
pub struct ValMap {
    fwd: FxHashMap<ValId, ValId>,
    bwd: FxHashMap<ValId, ValId>,
}

impl ValMap {
    /// Record `a <-> b`. `Some(true)` on a new entry, `Some(false)` when the
    /// pair was already present, `None` when either side is taken.
    pub fn insert(&mut self, a: ValId, b: ValId) -> Option<bool> {
        debug_assert!(!a.is_special() && !b.is_special(), "special in val map");
        match (self.fwd.get(&a), self.bwd.get(&b)) {
            (Some(&x), Some(&y)) if x == b && y == a => Some(false),
            (None, None) => {
                self.fwd.insert(a, b);
                self.bwd.insert(b, a);
                Some(true)
            }
            _ => None,
        }
    }

    #[inline]
    pub fn fwd(&self, a: ValId) -> Option<ValId> {
        self.fwd.get(&a).copied()
    }

    #[inline]
    pub fn bwd(&self, b: ValId) -> Option<ValId> {
        self.bwd.get(&b).copied()
    }

    /// Left-to-right translation; specials map to themselves.
    pub fn translate_fwd(&self, a: ValId) -> Option<ValId> {
        if a.is_special() {
            Some(a)
        } else {
            self.fwd(a)
        }
    }

    /// Right-to-left translation; specials map to themselves.
    pub fn translate_bwd(&self, b: ValId) -> Option<ValId> {
        if b.is_special() {
            Some(b)
        } else {
            self.bwd(b)
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fwd.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fwd.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValId, ValId)> + '_ {
        self.fwd.iter().map(|(&a, &b)| (a, b))
    }
}

/// Visitor verdict for one scheduled value pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Follow the pair into its pointees.
    Expand,
    /// Accept the pair as matched without looking further.
    Skip,
}

/// Caller hook for the sub-heap walk. `cancelled` is polled before every
/// schedule, so a probe can abort without finishing the traversal.
pub trait SubHeapVisitor {
    fn enter_pair(&mut self, _sh1: &SymHeap, _sh2: &SymHeap, _v1: ValId, _v2: ValId) -> Visit {
        Visit::Expand
    }

    fn cancelled(&self) -> bool {
        false
    }
}

/// Visitor that follows everything and never cancels.
#[derive(Debug, Default)]
pub struct ExpandAll;

impl SubHeapVisitor for ExpandAll {}

/// Static types compatible: absent on either side, or equal row sizes.
pub fn types_match(sh1: &SymHeap, t1: Option<TypeId>, sh2: &SymHeap, t2: Option<TypeId>) -> bool {
    match (t1, t2) {
        (Some(a), Some(b)) => sh1.type_row(a).size == sh2.type_row(b).size,
        _ => true,
    }
}

/// Static types exactly equal: both absent, or same name and size.
pub fn types_exact(sh1: &SymHeap, t1: Option<TypeId>, sh2: &SymHeap, t2: Option<TypeId>) -> bool {
    match (t1, t2) {
        (None, None) => true,
        (Some(a), Some(b)) => sh1.type_row(a) == sh2.type_row(b),
        _ => false,
    }
}

fn addr_seed(sh: &SymHeap, obj: ObjId) -> ValId {
    match sh.try_val_addr(obj, 0, TargetSpec::Region) {
        Some(v) => v,
        None => unreachable!("object {obj} lost its address"),
    }
}

/// Whole-heap isomorphism check.
pub fn are_isomorphic(sh1: &SymHeap, sh2: &SymHeap) -> bool {
    isomorphism_maps(sh1, sh2).is_some()
}

/// Whole-heap isomorphism; on success, the substitution that witnesses it.
pub fn isomorphism_maps(sh1: &SymHeap, sh2: &SymHeap) -> Option<ValMap> {
    let vars1: Vec<_> = sh1.program_vars().collect();
    let vars2: Vec<_> = sh2.program_vars().collect();
    if vars1.len() != vars2.len() {
        return None;
    }

    let mut wl: WorkList<(ValId, ValId)> = WorkList::default();
    for (&(var1, obj1), &(var2, obj2)) in vars1.iter().zip(vars2.iter()) {
        if var1 != var2 {
            trace!(%var1, %var2, "program variable sets differ");
            return None;
        }
        wl.schedule((addr_seed(sh1, obj1), addr_seed(sh2, obj2)));
    }
    match (sh1.ret_obj(), sh2.ret_obj()) {
        (Some(r1), Some(r2)) => {
            wl.schedule((addr_seed(sh1, r1), addr_seed(sh2, r2)));
        }
        (None, None) => {}
        _ => return None,
    }

    let mut map = ValMap::default();
    if !drain(sh1, sh2, &mut wl, &mut map, &mut ExpandAll) {
        return None;
    }
    if !neq_entailed(sh1, sh2, &map) {
        return None;
    }
    Some(map)
}

/// Match two sub-heaps from the given seed pairs under a caller visitor.
/// First mismatch or cancellation aborts with no partial result.
pub fn match_sub_heaps(
    sh1: &SymHeap,
    sh2: &SymHeap,
    seeds: &[(ValId, ValId)],
    visitor: &mut dyn SubHeapVisitor,
) -> Option<ValMap> {
    let mut wl: WorkList<(ValId, ValId)> = WorkList::default();
    for &pair in seeds {
        if visitor.cancelled() {
            return None;
        }
        wl.schedule(pair);
    }
    let mut map = ValMap::default();
    if drain(sh1, sh2, &mut wl, &mut map, visitor) {
        Some(map)
    } else {
        None
    }
}

fn drain(
    sh1: &SymHeap,
    sh2: &SymHeap,
    wl: &mut WorkList<(ValId, ValId)>,
    map: &mut ValMap,
    visitor: &mut dyn SubHeapVisitor,
) -> bool {
    while let Some((v1, v2)) = wl.next() {
        if visitor.cancelled() {
            return false;
        }
        if !match_value_pair(sh1, sh2, wl, map, visitor, v1, v2) {
            trace!(%v1, %v2, "value pair mismatch");
            return false;
        }
    }
    true
}

fn match_value_pair(
    sh1: &SymHeap,
    sh2: &SymHeap,
    wl: &mut WorkList<(ValId, ValId)>,
    map: &mut ValMap,
    visitor: &mut dyn SubHeapVisitor,
    v1: ValId,
    v2: ValId,
) -> bool {
    // specials never substitute
    if v1.is_special() || v2.is_special() {
        return v1 == v2;
    }
    match map.insert(v1, v2) {
        None => return false,
        Some(false) => return true,
        Some(true) => {}
    }
    if let Visit::Skip = visitor.enter_pair(sh1, sh2, v1, v2) {
        return true;
    }

    // unknown-class values match by kind alone and are not followed
    match (sh1.val_unknown_kind(v1), sh2.val_unknown_kind(v2)) {
        (Some(k1), Some(k2)) => return k1 == k2,
        (Some(_), None) | (None, Some(_)) => return false,
        (None, None) => {}
    }

    // custom payloads must be identical
    match (sh1.val_custom_ref(v1), sh2.val_custom_ref(v2)) {
        (Some(c1), Some(c2)) => return c1 == c2,
        (Some(_), None) | (None, Some(_)) => return false,
        (None, None) => {}
    }

    // exact-offset pointers
    if let (Some((o1, off1, sp1)), Some((o2, off2, sp2))) =
        (sh1.val_target(v1), sh2.val_target(v2))
    {
        if off1 != off2 || sp1 != sp2 {
            return false;
        }
        return match_objects(sh1, sh2, wl, map, visitor, o1, o2);
    }

    // range-offset pointers
    if let (Some((o1, off1, sp1)), Some((o2, off2, sp2))) =
        (sh1.val_range_target(v1), sh2.val_range_target(v2))
    {
        if off1 != off2 || sp1 != sp2 {
            return false;
        }
        return match_objects(sh1, sh2, wl, map, visitor, o1, o2);
    }

    false
}

fn match_objects(
    sh1: &SymHeap,
    sh2: &SymHeap,
    wl: &mut WorkList<(ValId, ValId)>,
    map: &mut ValMap,
    visitor: &mut dyn SubHeapVisitor,
    o1: ObjId,
    o2: ObjId,
) -> bool {
    if sh1.obj_is_valid(o1) != sh2.obj_is_valid(o2) {
        return false;
    }
    if !sh1.obj_is_valid(o1) {
        return true; // both dangling, nothing to follow
    }
    if sh1.obj_size(o1) != sh2.obj_size(o2)
        || sh1.obj_var(o1) != sh2.obj_var(o2)
        || !types_match(sh1, sh1.obj_type(o1), sh2, sh2.obj_type(o2))
    {
        return false;
    }
    if sh1.obj_kind(o1) != sh2.obj_kind(o2)
        || sh1.obj_binding(o1) != sh2.obj_binding(o2)
        || sh1.obj_proto_level(o1) != sh2.obj_proto_level(o2)
        || sh1.obj_is_dls_head(o1) != sh2.obj_is_dls_head(o2)
    {
        return false;
    }
    if sh1.obj_kind(o1).is_abstract() && sh1.obj_min_len(o1) != sh2.obj_min_len(o2) {
        return false;
    }

    // fields co-walked by offset; this also discovers the scalar leaves
    let fields1: Vec<_> = sh1.live_fields(o1).collect();
    let fields2: Vec<_> = sh2.live_fields(o2).collect();
    if fields1.len() != fields2.len() {
        return false;
    }
    for (&(off1, fld1), &(off2, fld2)) in fields1.iter().zip(fields2.iter()) {
        if off1 != off2 || !types_match(sh1, Some(fld1.ty), sh2, Some(fld2.ty)) {
            return false;
        }
        if visitor.cancelled() {
            return false;
        }
        wl.schedule((fld1.val, fld2.val));
    }

    let blocks1 = sh1.uni_blocks(o1);
    let blocks2 = sh2.uni_blocks(o2);
    if blocks1.len() != blocks2.len() {
        return false;
    }
    for ((off1, b1), (off2, b2)) in blocks1.iter().zip(blocks2.iter()) {
        if off1 != off2 || b1.size != b2.size {
            return false;
        }
        if visitor.cancelled() {
            return false;
        }
        wl.schedule((b1.tpl, b2.tpl));
    }
    true
}

/// Every disequality of either heap, pushed through the substitution, must
/// be provable on the other side. Pairs over unvisited values are vacuous.
fn neq_entailed(sh1: &SymHeap, sh2: &SymHeap, map: &ValMap) -> bool {
    for (a, b) in sh1.neq_pairs() {
        if let (Some(x), Some(y)) = (map.translate_fwd(a), map.translate_fwd(b)) {
            if !sh2.prove_neq(x, y) {
                trace!(%a, %b, "disequality lost left to right");
                return false;
            }
        }
    }
    for (a, b) in sh2.neq_pairs() {
        if let (Some(x), Some(y)) = (map.translate_bwd(a), map.translate_bwd(b)) {
            if !sh1.prove_neq(x, y) {
                trace!(%a, %b, "disequality lost right to left");
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::symheap::UnknownKind;
    use crate::shared::models::{BindingOff, VarId};

    /// `list` variable pointing at a two-node list ending in null; the
    /// second payload left unknown.
    fn two_node_list(reversed_alloc: bool) -> SymHeap {
        let mut sh = SymHeap::new();
        let ptr = sh.type_intern("ptr", 8);
        let node = sh.type_intern("node", 16);

        let var = sh.var_create(VarId(1), 8, Some(ptr));
        let (a, b) = if reversed_alloc {
            let b = sh.alloc(16, Some(node));
            let a = sh.alloc(16, Some(node));
            (a, b)
        } else {
            let a = sh.alloc(16, Some(node));
            let b = sh.alloc(16, Some(node));
            (a, b)
        };

        let addr_a = sh.val_addr(a, 0, TargetSpec::Region);
        let addr_b = sh.val_addr(b, 0, TargetSpec::Region);
        let payload = sh.val_unknown(UnknownKind::Unknown);
        sh.set_field(var, 0, ptr, addr_a);
        sh.set_field(a, 0, ptr, addr_b);
        sh.set_field(a, 8, ptr, ValId::NULL);
        sh.set_field(b, 0, ptr, ValId::NULL);
        sh.set_field(b, 8, ptr, payload);
        sh
    }

    #[test]
    fn heap_matches_its_clone() {
        let sh = two_node_list(false);
        let copy = sh.clone();
        assert!(are_isomorphic(&sh, &copy));
    }

    #[test]
    fn allocation_order_does_not_matter() {
        let sh1 = two_node_list(false);
        let sh2 = two_node_list(true);
        let map = isomorphism_maps(&sh1, &sh2).unwrap();
        assert!(!map.is_empty());
        // the substitution is a bijection
        for (a, b) in map.iter() {
            assert_eq!(map.bwd(b), Some(a));
        }
    }

    #[test]
    fn structural_differences_are_detected() {
        let sh1 = two_node_list(false);

        // same shape but the tail pointer cycles back instead of null
        let mut sh2 = two_node_list(false);
        let var_obj = sh2.obj_by_var(VarId(1)).unwrap();
        let head = sh2.field_at(var_obj, 0).unwrap().val;
        let head_obj = sh2.val_any_target(head).unwrap();
        let tail_obj = sh2
            .val_any_target(sh2.field_at(head_obj, 0).unwrap().val)
            .unwrap();
        let back = sh2.val_addr(head_obj, 0, TargetSpec::Region);
        let ptr = sh2.type_intern("ptr", 8);
        sh2.set_field(tail_obj, 0, ptr, back);

        assert!(!are_isomorphic(&sh1, &sh2));
    }

    #[test]
    fn segment_metadata_must_agree() {
        let build = |min_len: u32| {
            let mut sh = SymHeap::new();
            let ptr = sh.type_intern("ptr", 8);
            let node = sh.type_intern("node", 16);
            let var = sh.var_create(VarId(1), 8, Some(ptr));
            let seg = sh.alloc(16, Some(node));
            sh.make_sls(seg, BindingOff::sls(0, 0), min_len);
            let head = sh.val_addr(seg, 0, TargetSpec::First);
            sh.set_field(var, 0, ptr, head);
            sh.set_field(seg, 0, ptr, ValId::NULL);
            sh
        };
        assert!(are_isomorphic(&build(2), &build(2)));
        assert!(!are_isomorphic(&build(2), &build(3)));
    }

    #[test]
    fn lost_disequalities_fail_the_match() {
        let mut sh1 = two_node_list(false);
        let sh2 = two_node_list(false);

        // pin the unknown payload of sh1 away from null
        let var_obj = sh1.obj_by_var(VarId(1)).unwrap();
        let head = sh1.field_at(var_obj, 0).unwrap().val;
        let head_obj = sh1.val_any_target(head).unwrap();
        let tail_obj = sh1
            .val_any_target(sh1.field_at(head_obj, 0).unwrap().val)
            .unwrap();
        let payload = sh1.field_at(tail_obj, 8).unwrap().val;
        sh1.add_neq(payload, ValId::NULL);

        assert!(!are_isomorphic(&sh1, &sh2));
        assert!(!are_isomorphic(&sh2, &sh1));
    }

    #[test]
    fn sub_heap_probe_honors_skip_and_cancel() {
        struct SkipAll;
        impl SubHeapVisitor for SkipAll {
            fn enter_pair(&mut self, _: &SymHeap, _: &SymHeap, _: ValId, _: ValId) -> Visit {
                Visit::Skip
            }
        }

        struct CancelNow;
        impl SubHeapVisitor for CancelNow {
            fn cancelled(&self) -> bool {
                true
            }
        }

        let sh1 = two_node_list(false);
        let sh2 = two_node_list(true);
        let o1 = sh1.obj_by_var(VarId(1)).unwrap();
        let o2 = sh2.obj_by_var(VarId(1)).unwrap();
        let seeds = [(
            sh1.try_val_addr(o1, 0, TargetSpec::Region).unwrap(),
            sh2.try_val_addr(o2, 0, TargetSpec::Region).unwrap(),
        )];

        let map = match_sub_heaps(&sh1, &sh2, &seeds, &mut SkipAll).unwrap();
        assert_eq!(map.len(), 1, "skip keeps the walk at the seed");

        assert!(match_sub_heaps(&sh1, &sh2, &seeds, &mut CancelNow).is_none());
    }

    #[test]
    fn mismatched_variable_sets_never_match() {
        let sh1 = two_node_list(false);
        let mut sh2 = two_node_list(false);
        let ptr = sh2.type_intern("ptr", 8);
        sh2.var_create(VarId(9), 8, Some(ptr));
        assert!(!are_isomorphic(&sh1, &sh2));
    }
}
