//! End-to-end join scenarios exercised through the public crate surface.
//!
//! Each test builds two concrete heaps the way a symbolic executor would
//! after different loop iterations, joins them, and checks both the
//! reported precision verdict and the shape of the joined heap.

use pretty_assertions::assert_eq;

use shapegraph_engine::{
    are_isomorphic, join_heaps, seg_min_length, seg_next_val, EngineOptions, JoinError, JoinStatus,
    ObjId, ObjKind, SymHeap, TargetSpec, TraceGraph, ValId, VarId,
};

/// One variable pointing at `len` singly linked nodes ending in null.
/// `scratch` pre-interns throwaway values so two builds of the same list
/// carry different value ids.
fn list_heap(len: usize, scratch: usize) -> SymHeap {
    let mut sh = SymHeap::new();
    for _ in 0..scratch {
        sh.val_unknown(shapegraph_engine::UnknownKind::DontCare);
    }
    let ptr = sh.type_intern("ptr", 8);
    let node = sh.type_intern("node", 8);
    let var = sh.var_create(VarId(1), 8, Some(ptr));

    let nodes: Vec<ObjId> = (0..len).map(|_| sh.alloc(8, Some(node))).collect();
    for (i, &n) in nodes.iter().enumerate() {
        let next = match nodes.get(i + 1) {
            Some(&m) => sh.val_addr(m, 0, TargetSpec::Region),
            None => ValId::NULL,
        };
        sh.set_field(n, 0, ptr, next);
    }
    let head = match nodes.first() {
        Some(&n) => sh.val_addr(n, 0, TargetSpec::Region),
        None => ValId::NULL,
    };
    sh.set_field(var, 0, ptr, head);
    sh
}

/// Two variables aliasing one node whose next field is null.
fn aliased_heap(scratch: usize) -> SymHeap {
    let mut sh = SymHeap::new();
    for _ in 0..scratch {
        sh.val_unknown(shapegraph_engine::UnknownKind::DontCare);
    }
    let ptr = sh.type_intern("ptr", 8);
    let node = sh.type_intern("node", 8);
    let x = sh.var_create(VarId(1), 8, Some(ptr));
    let y = sh.var_create(VarId(2), 8, Some(ptr));
    let n = sh.alloc(8, Some(node));
    sh.set_field(n, 0, ptr, ValId::NULL);
    let addr = sh.val_addr(n, 0, TargetSpec::Region);
    sh.set_field(x, 0, ptr, addr);
    sh.set_field(y, 0, ptr, addr);
    sh
}

#[test]
fn separately_built_lists_collapse_into_a_segment() {
    let h1 = list_heap(3, 0);
    let h2 = list_heap(3, 1);

    let out = join_heaps(&h1, &h2, None, &EngineOptions::default()).unwrap();

    assert_eq!(out.status, JoinStatus::ThreeWay);
    assert!(out.stats.segments_summarized >= 1);

    let var = out.heap.obj_by_var(VarId(1)).unwrap();
    let head = out.heap.field_at(var, 0).unwrap();
    let (seg, off, spec) = out.heap.val_target(head.val).unwrap();
    assert_eq!(off, 0);
    assert_eq!(spec, TargetSpec::First);
    assert_eq!(out.heap.obj_kind(seg), ObjKind::Sls);
    assert_eq!(seg_min_length(&out.heap, seg), 3);
    assert_eq!(seg_next_val(&out.heap, seg), Some(ValId::NULL));

    // a genuine generalization, equivalent to neither input
    assert!(!are_isomorphic(&out.heap, &h1));
    assert!(!are_isomorphic(&out.heap, &h2));
}

#[test]
fn a_heap_and_its_clone_join_without_widening() {
    let h = list_heap(3, 0);

    let out = join_heaps(&h, &h.clone(), None, &EngineOptions::default()).unwrap();

    assert_eq!(out.status, JoinStatus::UseAny);
    assert_eq!(out.stats.segments_summarized, 0);
    assert!(are_isomorphic(&out.heap, &h));
}

#[test]
fn aliased_variables_stay_aliased() {
    let h1 = aliased_heap(0);
    let h2 = aliased_heap(2);

    let out = join_heaps(&h1, &h2, None, &EngineOptions::default()).unwrap();

    let x = out.heap.obj_by_var(VarId(1)).unwrap();
    let y = out.heap.obj_by_var(VarId(2)).unwrap();
    let fx = out.heap.field_at(x, 0).unwrap();
    let fy = out.heap.field_at(y, 0).unwrap();

    // the second variable resolves the same pointer pair through the cache
    assert_eq!(fx.val, fy.val);
    assert!(out.stats.cache_hits >= 1);
    assert_eq!(out.status, JoinStatus::UseAny);
}

#[test]
fn widening_can_be_refused_outright() {
    let mut opts = EngineOptions::default();
    opts.allow_three_way_join = false;

    let err = join_heaps(&list_heap(3, 0), &list_heap(3, 1), None, &opts).err();

    assert_eq!(err, Some(JoinError::ThreeWayDisabled));
}

#[test]
fn summarized_minimum_length_respects_the_cap() {
    let mut opts = EngineOptions::default();
    opts.max_seg_min_len = 2;

    let out = join_heaps(&list_heap(3, 0), &list_heap(3, 1), None, &opts).unwrap();

    assert_eq!(out.status, JoinStatus::ThreeWay);
    let var = out.heap.obj_by_var(VarId(1)).unwrap();
    let head = out.heap.field_at(var, 0).unwrap();
    let (seg, _, _) = out.heap.val_target(head.val).unwrap();
    assert_eq!(seg_min_length(&out.heap, seg), 2);
}

#[test]
fn joined_heaps_carry_a_trace_node() {
    let mut tg = TraceGraph::new();

    let out = join_heaps(&list_heap(2, 0), &list_heap(2, 1), Some(&mut tg), &EngineOptions::default())
        .unwrap();

    assert!(out.heap.trace_node().is_some());
    assert!(!tg.is_empty());
}
