//! Fixpoint plumbing: per-block state unions, the worklist, and the
//! policy switch that restricts join insertion to loop-closing edges.

use pretty_assertions::assert_eq;

use shapegraph_engine::{
    seg_min_length, BlockScheduler, Cfg, EngineOptions, ObjKind, SchedOrder, StateMap, StateUnion,
    SymHeap, TargetSpec, ValId, VarId,
};

/// One variable pointing at `len` singly linked nodes ending in null.
fn list_heap(len: usize, scratch: usize) -> SymHeap {
    let mut sh = SymHeap::new();
    for _ in 0..scratch {
        sh.val_unknown(shapegraph_engine::UnknownKind::DontCare);
    }
    let ptr = sh.type_intern("ptr", 8);
    let node = sh.type_intern("node", 8);
    let var = sh.var_create(VarId(1), 8, Some(ptr));
    let mut next = ValId::NULL;
    for _ in 0..len {
        let n = sh.alloc(8, Some(node));
        sh.set_field(n, 0, ptr, next);
        next = sh.val_addr(n, 0, TargetSpec::Region);
    }
    sh.set_field(var, 0, ptr, next);
    sh
}

/// Two variables, each pointing at its own node. `flipped` swaps the
/// build order so the two variants disagree on every id.
fn two_var_heap(flipped: bool) -> SymHeap {
    let mut sh = SymHeap::new();
    let ptr = sh.type_intern("ptr", 8);
    let node = sh.type_intern("node", 8);
    let ids = if flipped { [VarId(2), VarId(1)] } else { [VarId(1), VarId(2)] };
    for id in ids {
        let var = sh.var_create(id, 8, Some(ptr));
        let n = sh.alloc(8, Some(node));
        sh.set_field(n, 0, ptr, ValId::NULL);
        let addr = sh.val_addr(n, 0, TargetSpec::Region);
        sh.set_field(var, 0, ptr, addr);
    }
    sh
}

// ============================================================================
// State unions
// ============================================================================

#[test]
fn isomorphic_states_deduplicate_without_joining() {
    let mut union = StateUnion::new();

    assert!(union.insert_plain(two_var_heap(false)));
    assert!(!union.insert_plain(two_var_heap(true)));

    assert_eq!(union.len(), 1);
}

/// One variable pointing at a node whose payload is either a known
/// integer or explicitly unknown.
fn flag_heap(flag: Option<i64>) -> SymHeap {
    let mut sh = SymHeap::new();
    let ptr = sh.type_intern("ptr", 8);
    let int = sh.type_intern("int", 8);
    let node = sh.type_intern("node", 8);
    let var = sh.var_create(VarId(1), 8, Some(ptr));
    let n = sh.alloc(8, Some(node));
    let payload = match flag {
        Some(i) => sh.val_custom(shapegraph_engine::CustomValue::Int(i)),
        None => sh.val_unknown(shapegraph_engine::UnknownKind::Unknown),
    };
    sh.set_field(n, 0, int, payload);
    let addr = sh.val_addr(n, 0, TargetSpec::Region);
    sh.set_field(var, 0, ptr, addr);
    sh
}

#[test]
fn covered_states_are_absorbed_on_join() {
    let opts = EngineOptions::default();
    let mut union = StateUnion::new();

    // an unknown payload already covers every concrete payload
    assert!(union.insert_joined(flag_heap(None), None, &opts));
    assert!(!union.insert_joined(flag_heap(Some(7)), None, &opts));

    assert_eq!(union.len(), 1);
}

#[test]
fn join_insertion_generalizes_different_iterations() {
    let opts = EngineOptions::default();
    let mut union = StateUnion::new();

    assert!(union.insert_joined(list_heap(2, 0), None, &opts));
    assert!(union.insert_joined(list_heap(3, 1), None, &opts));

    assert_eq!(union.len(), 1);
    let sh = union.get(0).unwrap();
    let var = sh.obj_by_var(VarId(1)).unwrap();
    let head = sh.field_at(var, 0).unwrap();
    let (seg, _, _) = sh.val_target(head.val).unwrap();
    assert_eq!(sh.obj_kind(seg), ObjKind::Sls);
    assert_eq!(seg_min_length(sh, seg), 2);
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn scheduling_is_idempotent_until_drained() {
    let mut cfg = Cfg::new();
    let a = cfg.add_block("entry");
    let b = cfg.add_block("loop");
    cfg.add_edge(a, b);

    let mut sched = BlockScheduler::new(SchedOrder::Dfs);
    assert!(sched.schedule(b));
    assert!(!sched.schedule(b));
    assert_eq!(sched.pending_count(), 1);

    assert_eq!(sched.get_next(), Some(b));
    assert_eq!(sched.get_next(), None);
    assert!(sched.is_done());

    // once drained, the block may be scheduled again
    assert!(sched.schedule(b));
    assert_eq!(sched.visit_count(b), 1);
}

#[test]
fn dfs_and_bfs_drain_in_opposite_orders() {
    let mut cfg = Cfg::new();
    let a = cfg.add_block("a");
    let b = cfg.add_block("b");
    let c = cfg.add_block("c");
    cfg.add_edge(a, b);
    cfg.add_edge(b, c);

    let mut dfs = BlockScheduler::new(SchedOrder::Dfs);
    let mut bfs = BlockScheduler::new(SchedOrder::Bfs);
    for block in [a, b, c] {
        dfs.schedule(block);
        bfs.schedule(block);
    }

    assert_eq!(dfs.get_next(), Some(c));
    assert_eq!(dfs.get_next(), Some(b));
    assert_eq!(dfs.get_next(), Some(a));

    assert_eq!(bfs.get_next(), Some(a));
    assert_eq!(bfs.get_next(), Some(b));
    assert_eq!(bfs.get_next(), Some(c));
}

// ============================================================================
// Delivery policy
// ============================================================================

#[test]
fn default_policy_joins_on_every_edge() {
    let mut cfg = Cfg::new();
    let entry = cfg.add_block("entry");
    let body = cfg.add_block("body");
    cfg.add_edge(entry, body);

    let opts = EngineOptions::default();
    let mut states = StateMap::new();

    assert!(states.insert(&cfg, Some(entry), body, list_heap(1, 0), None, &opts));
    assert!(states.insert(&cfg, Some(entry), body, list_heap(2, 1), None, &opts));

    // the straight edge still joined, so both iterations share one entry
    assert_eq!(states.union(body).map(StateUnion::len), Some(1));
    assert_eq!(states.last_origin(body), Some(entry));
}

#[test]
fn restricted_policy_keeps_straight_edges_exact() {
    let mut cfg = Cfg::new();
    let entry = cfg.add_block("entry");
    let body = cfg.add_block("body");
    cfg.add_edge(entry, body);

    let mut opts = EngineOptions::default();
    opts.join_on_loop_edges_only = true;
    let mut states = StateMap::new();

    assert!(states.insert(&cfg, Some(entry), body, list_heap(1, 0), None, &opts));
    assert!(states.insert(&cfg, Some(entry), body, list_heap(2, 1), None, &opts));

    assert_eq!(states.union(body).map(StateUnion::len), Some(2));
}
