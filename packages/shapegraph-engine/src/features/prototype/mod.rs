//! Nesting levels of objects privately owned by abstract segments.
//!
//! A segment's prototypes live one level deeper than the segment itself;
//! nested ownership stacks further levels. The level of anything reachable
//! from a concrete context never exceeds its owner's level.

use rustc_hash::FxHashSet;
use tracing::warn;

use crate::features::symheap::{ObjKind, SymHeap};
use crate::shared::models::ObjId;
use crate::shared::WorkList;

/// Objects privately owned by `root`: reachable through live pointers at a
/// level strictly deeper than the root's, without crossing shared structure.
/// With `skip_dls_peers`, each DLS pair is reported once, by its head end.
pub fn collect_prototypes_of(sh: &SymHeap, root: ObjId, skip_dls_peers: bool) -> Vec<ObjId> {
    let root_level = sh.obj_proto_level(root);
    let mut wl: WorkList<ObjId> = WorkList::default();
    wl.schedule(root);

    let mut protos = Vec::new();
    let mut seen: FxHashSet<ObjId> = FxHashSet::default();
    while let Some(obj) = wl.next() {
        if obj != root {
            if sh.obj_proto_level(obj) <= root_level {
                continue; // shared boundary, not owned by the root
            }
            if seen.insert(obj) {
                let mirrored_end =
                    sh.obj_kind(obj) == ObjKind::Dls && !sh.obj_is_dls_head(obj);
                if !(skip_dls_peers && mirrored_end) {
                    protos.push(obj);
                }
            }
        }
        if let Some(peer) = sh.obj_peer(obj) {
            wl.schedule(peer);
        }
        for (_, _, target) in sh.live_ptr_fields(obj) {
            wl.schedule(target);
        }
    }
    protos
}

/// Push one object (and its DLS peer) one level deeper.
pub fn obj_increment_proto_level(sh: &mut SymHeap, obj: ObjId) {
    let level = sh.obj_proto_level(obj);
    sh.set_proto_level(obj, level + 1);
}

/// Pull one object (and its DLS peer) one level up.
pub fn obj_decrement_proto_level(sh: &mut SymHeap, obj: ObjId) {
    let level = sh.obj_proto_level(obj);
    debug_assert!(level > 0, "level underflow on {obj}");
    sh.set_proto_level(obj, level.saturating_sub(1));
}

/// Promote every current prototype of `at` one level up; used when the
/// owner is concretized and its children become directly reachable.
pub fn decrement_proto_level_below(sh: &mut SymHeap, at: ObjId) {
    for proto in collect_prototypes_of(sh, at, true) {
        obj_decrement_proto_level(sh, proto);
    }
}

/// Full-heap scan of the level invariant; non-fatal self-check.
pub fn proto_check_consistency(sh: &SymHeap) -> bool {
    let mut ok = true;
    for obj in sh.live_objects() {
        if let Some(peer) = sh.obj_peer(obj) {
            if sh.obj_proto_level(peer) != sh.obj_proto_level(obj) {
                warn!(%obj, %peer, "DLS peers disagree on prototype level");
                ok = false;
            }
        }
        if sh.obj_kind(obj).is_abstract() {
            continue; // abstract owners legitimately point one level down
        }
        let level = sh.obj_proto_level(obj);
        for (_, _, target) in sh.live_ptr_fields(obj) {
            if sh.obj_proto_level(target) > level {
                warn!(%obj, %target, level, "concrete context reaches a deeper prototype");
                ok = false;
            }
        }
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{BindingOff, TargetSpec, ValId};

    /// SLS at level 0 owning a region at level 1, which owns one at level 2;
    /// plus a shared level-0 object hanging off the segment.
    fn nested_heap() -> (SymHeap, ObjId, ObjId, ObjId, ObjId) {
        let mut sh = SymHeap::new();
        let ptr = sh.type_intern("ptr", 8);
        let node = sh.type_intern("node", 24);

        let seg = sh.alloc(24, Some(node));
        sh.make_sls(seg, BindingOff::sls(0, 0), 2);
        let proto = sh.alloc(24, Some(node));
        sh.set_proto_level(proto, 1);
        let inner = sh.alloc(24, Some(node));
        sh.set_proto_level(inner, 2);
        let shared = sh.alloc(24, Some(node));

        let proto_addr = sh.val_addr(proto, 0, TargetSpec::Region);
        let inner_addr = sh.val_addr(inner, 0, TargetSpec::Region);
        let shared_addr = sh.val_addr(shared, 0, TargetSpec::Region);
        sh.set_field(seg, 0, ptr, ValId::NULL);
        sh.set_field(seg, 8, ptr, proto_addr);
        sh.set_field(seg, 16, ptr, shared_addr);
        sh.set_field(proto, 0, ptr, inner_addr);

        (sh, seg, proto, inner, shared)
    }

    #[test]
    fn collects_owned_objects_only() {
        let (sh, seg, proto, inner, shared) = nested_heap();
        let protos = collect_prototypes_of(&sh, seg, true);
        assert!(protos.contains(&proto));
        assert!(protos.contains(&inner));
        assert!(!protos.contains(&shared));
        assert!(!protos.contains(&seg));
    }

    #[test]
    fn dls_pairs_report_once_when_asked() {
        let mut sh = SymHeap::new();
        let ptr = sh.type_intern("ptr", 8);
        let node = sh.type_intern("node", 24);

        let owner = sh.alloc(24, Some(node));
        sh.make_sls(owner, BindingOff::sls(0, 0), 1);
        let first = sh.alloc(24, Some(node));
        let last = sh.alloc(24, Some(node));
        sh.make_dls(first, last, BindingOff::dls(0, 0, 8), 2);
        sh.set_proto_level(first, 1);

        let first_addr = sh.val_addr(first, 0, TargetSpec::First);
        sh.set_field(owner, 8, ptr, first_addr);

        let once = collect_prototypes_of(&sh, owner, true);
        assert_eq!(once, vec![first]);
        let both = collect_prototypes_of(&sh, owner, false);
        assert_eq!(both.len(), 2);
        assert!(both.contains(&first) && both.contains(&last));
    }

    #[test]
    fn peer_levels_move_together() {
        let mut sh = SymHeap::new();
        let node = sh.type_intern("node", 24);
        let first = sh.alloc(24, Some(node));
        let last = sh.alloc(24, Some(node));
        sh.make_dls(first, last, BindingOff::dls(0, 0, 8), 2);

        obj_increment_proto_level(&mut sh, first);
        obj_increment_proto_level(&mut sh, last);
        assert_eq!(sh.obj_proto_level(first), 2);
        assert_eq!(sh.obj_proto_level(last), 2);

        obj_decrement_proto_level(&mut sh, first);
        assert_eq!(sh.obj_proto_level(first), sh.obj_proto_level(last));
    }

    #[test]
    fn decrement_below_promotes_children() {
        let (mut sh, seg, proto, inner, _) = nested_heap();
        decrement_proto_level_below(&mut sh, seg);
        assert_eq!(sh.obj_proto_level(proto), 0);
        assert_eq!(sh.obj_proto_level(inner), 1);
    }

    #[test]
    fn consistency_flags_concrete_into_deeper() {
        let (mut sh, _, proto, _, shared) = nested_heap();
        assert!(proto_check_consistency(&sh));

        // a plain region pointing into a level-1 prototype breaks the rule
        let ptr = sh.type_intern("ptr", 8);
        let proto_addr = sh.val_addr(proto, 0, TargetSpec::Region);
        sh.set_field(shared, 0, ptr, proto_addr);
        assert!(!proto_check_consistency(&sh));
    }
}
