//! Lookahead discovery of uniform concrete chains worth summarizing.
//!
//! A chain is a run of same-shape regions linked at one offset, where no
//! outside pointer reaches an interior node and consecutive nodes carry
//! isomorphic data. Discovery is read-only; the joiner decides afterwards
//! whether both sides agree on a binding and clear the length threshold.

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::config::EngineOptions;
use crate::features::compare::{match_sub_heaps, types_match, SubHeapVisitor, Visit};
use crate::features::symheap::{ObjKind, SymHeap};
use crate::shared::models::{BindingOff, ObjId, TargetSpec, ValId};
use crate::shared::PairMap;

/// Pairs a lookahead probe may expand before cancelling itself.
const PROBE_BUDGET: usize = 4096;

/// Sub-heap probe that gives up once its pair budget runs out.
pub(crate) struct BudgetProbe {
    left: usize,
}

impl BudgetProbe {
    pub fn new() -> BudgetProbe {
        BudgetProbe { left: PROBE_BUDGET }
    }
}

impl SubHeapVisitor for BudgetProbe {
    fn enter_pair(&mut self, _: &SymHeap, _: &SymHeap, _: ValId, _: ValId) -> Visit {
        self.left = self.left.saturating_sub(1);
        Visit::Expand
    }

    fn cancelled(&self) -> bool {
        self.left == 0
    }
}

/// A uniform chain found behind one entry object.
#[derive(Debug, Clone)]
pub(crate) struct ChainInfo {
    pub binding: BindingOff,
    pub nodes: Vec<ObjId>,
    pub dls: bool,
}

/// Nodes share a shape: size, structural type, field layout, block layout.
fn same_shape(sh: &SymHeap, a: ObjId, b: ObjId) -> bool {
    if sh.obj_size(a) != sh.obj_size(b)
        || !types_match(sh, sh.obj_type(a), sh, sh.obj_type(b))
    {
        return false;
    }
    let fields_a: Vec<_> = sh.live_fields(a).collect();
    let fields_b: Vec<_> = sh.live_fields(b).collect();
    if fields_a.len() != fields_b.len() {
        return false;
    }
    for (&(off_a, fld_a), &(off_b, fld_b)) in fields_a.iter().zip(fields_b.iter()) {
        if off_a != off_b || !types_match(sh, Some(fld_a.ty), sh, Some(fld_b.ty)) {
            return false;
        }
    }
    let blocks_a = sh.uni_blocks(a);
    let blocks_b = sh.uni_blocks(b);
    blocks_a.len() == blocks_b.len()
        && blocks_a
            .iter()
            .zip(blocks_b.iter())
            .all(|((off_a, ba), (off_b, bb))| off_a == off_b && ba.size == bb.size)
}

/// Non-binding data of two neighbouring nodes must be isomorphic.
fn data_isomorphic(
    sh: &SymHeap,
    a: ObjId,
    b: ObjId,
    binding: BindingOff,
    cache: &mut PairMap<ObjId, bool>,
) -> bool {
    if let Some(&ok) = cache.get(a, b) {
        return ok;
    }
    let mut seeds = Vec::new();
    for (off, fld) in sh.live_fields(a) {
        if off == binding.next || off == binding.prev {
            continue;
        }
        match sh.field_at(b, off) {
            Some(other) => seeds.push((fld.val, other.val)),
            None => {
                cache.insert(a, b, false);
                return false;
            }
        }
    }
    let ok = match_sub_heaps(sh, sh, &seeds, &mut BudgetProbe::new()).is_some();
    cache.insert(a, b, ok);
    ok
}

/// True for objects a chain may run through.
fn chain_node(sh: &SymHeap, obj: ObjId) -> bool {
    sh.obj_is_valid(obj) && sh.obj_kind(obj) == ObjKind::Region && sh.obj_var(obj).is_none()
}

/// Walk a fixed binding from `entry`, collecting the uniform run.
fn walk(
    sh: &SymHeap,
    entry: ObjId,
    head_off: i64,
    binding: BindingOff,
    dls: bool,
    cache: &mut PairMap<ObjId, bool>,
) -> Vec<ObjId> {
    let mut nodes = vec![entry];
    let mut seen: FxHashSet<ObjId> = FxHashSet::default();
    seen.insert(entry);
    let level = sh.obj_proto_level(entry);

    let mut cur = entry;
    loop {
        let Some(fld) = sh.field_at(cur, binding.next) else {
            break;
        };
        let Some((next, off, spec)) = sh.val_target(fld.val) else {
            break;
        };
        if off != head_off || spec != TargetSpec::Region {
            break;
        }
        if !chain_node(sh, next)
            || sh.obj_proto_level(next) != level
            || seen.contains(&next)
            || !same_shape(sh, entry, next)
        {
            break;
        }
        if dls {
            // the back link must point at the node we came from
            match sh.field_at(next, binding.prev).and_then(|f| sh.val_target(f.val)) {
                Some((back, boff, bspec))
                    if back == cur && boff == head_off && bspec == TargetSpec::Region => {}
                _ => break,
            }
        }
        if !data_isomorphic(sh, cur, next, binding, cache) {
            break;
        }
        seen.insert(next);
        nodes.push(next);
        cur = next;
    }

    // outside pointers may reach the head (and, for a doubly-linked run,
    // the open end); interior nodes must be private to the chain
    let mut usable = nodes.len();
    for i in 1..nodes.len() {
        if dls && i + 1 == nodes.len() {
            break;
        }
        let prev = nodes[i - 1];
        let succ = nodes.get(i + 1).copied();
        let local = sh.refs_to(nodes[i]).iter().all(|(fld, _)| {
            fld.obj == prev || (dls && Some(fld.obj) == succ)
        });
        if !local {
            usable = i;
            break;
        }
    }
    nodes.truncate(usable);
    nodes
}

/// Re-walk `entry` under a binding found on the other side.
pub(crate) fn chain_with_binding(
    sh: &SymHeap,
    entry: ObjId,
    head_off: i64,
    binding: BindingOff,
    dls: bool,
) -> Vec<ObjId> {
    if !chain_node(sh, entry) {
        return Vec::new();
    }
    let mut cache = PairMap::new();
    walk(sh, entry, head_off, binding, dls, &mut cache)
}

/// Search all candidate bindings behind `entry` and keep the best chain:
/// longest first, doubly-linked preferred on ties.
pub(crate) fn discover_chain(
    sh: &SymHeap,
    entry: ObjId,
    head_off: i64,
    options: &EngineOptions,
) -> Option<ChainInfo> {
    if !chain_node(sh, entry) {
        return None;
    }
    let mut cache = PairMap::new();
    let mut best: Option<ChainInfo> = None;

    let ptr_fields: Vec<(i64, ValId, ObjId)> = sh.live_ptr_fields(entry).collect();
    for &(next_off, _, target) in &ptr_fields {
        if target == entry {
            continue;
        }

        let mut candidates: Vec<BindingOff> = Vec::new();
        if !options.disable_sls {
            candidates.push(BindingOff::sls(head_off, next_off));
        }
        if !options.disable_dls && chain_node(sh, target) {
            // a back link is any field of the successor aimed at the entry
            for (prev_off, back, back_target) in sh.live_ptr_fields(target) {
                if prev_off == next_off || back_target != entry {
                    continue;
                }
                if sh.val_target(back) == Some((entry, head_off, TargetSpec::Region)) {
                    candidates.push(BindingOff::dls(head_off, next_off, prev_off));
                }
            }
        }

        for binding in candidates {
            let dls = binding.is_doubly_linked();
            let nodes = walk(sh, entry, head_off, binding, dls, &mut cache);
            let better = match &best {
                None => nodes.len() > 1,
                Some(b) => {
                    nodes.len() > b.nodes.len()
                        || (nodes.len() == b.nodes.len() && dls && !b.dls)
                }
            };
            if better {
                trace!(%entry, len = nodes.len(), dls, "chain candidate");
                best = Some(ChainInfo { binding, nodes, dls });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::symheap::CustomValue;
    use crate::shared::models::VarId;

    /// `len` uniform nodes linked at offset 0, payload at offset 8, ending
    /// in null. Returns the heap and the nodes.
    fn sls_chain(len: usize) -> (SymHeap, Vec<ObjId>) {
        let mut sh = SymHeap::new();
        let ptr = sh.type_intern("ptr", 8);
        let node = sh.type_intern("node", 16);
        let var = sh.var_create(VarId(1), 8, Some(ptr));

        let nodes: Vec<ObjId> = (0..len).map(|_| sh.alloc(16, Some(node))).collect();
        for (i, &n) in nodes.iter().enumerate() {
            let next = match nodes.get(i + 1) {
                Some(&m) => sh.val_addr(m, 0, TargetSpec::Region),
                None => ValId::NULL,
            };
            sh.set_field(n, 0, ptr, next);
            sh.set_field(n, 8, ptr, ValId::NULL);
        }
        let head = sh.val_addr(nodes[0], 0, TargetSpec::Region);
        sh.set_field(var, 0, ptr, head);
        (sh, nodes)
    }

    #[test]
    fn finds_a_full_singly_linked_run() {
        let (sh, nodes) = sls_chain(3);
        let chain = discover_chain(&sh, nodes[0], 0, &EngineOptions::default()).unwrap();
        assert_eq!(chain.nodes, nodes);
        assert!(!chain.dls);
        assert_eq!(chain.binding, BindingOff::sls(0, 0));
    }

    #[test]
    fn outside_pointer_cuts_the_chain() {
        let (mut sh, nodes) = sls_chain(4);
        let ptr = sh.type_intern("ptr", 8);
        let alias = sh.var_create(VarId(2), 8, Some(ptr));
        let into_middle = sh.val_addr(nodes[2], 0, TargetSpec::Region);
        sh.set_field(alias, 0, ptr, into_middle);

        let chain = discover_chain(&sh, nodes[0], 0, &EngineOptions::default()).unwrap();
        assert_eq!(chain.nodes, nodes[..2].to_vec());
    }

    #[test]
    fn diverging_payload_cuts_the_chain() {
        let (mut sh, nodes) = sls_chain(3);
        let ptr = sh.type_intern("ptr", 8);
        let odd = sh.val_custom(CustomValue::Int(5));
        sh.set_field(nodes[2], 8, ptr, odd);

        let chain = discover_chain(&sh, nodes[0], 0, &EngineOptions::default()).unwrap();
        assert_eq!(chain.nodes, nodes[..2].to_vec());
    }

    #[test]
    fn back_links_upgrade_to_doubly_linked() {
        let mut sh = SymHeap::new();
        let ptr = sh.type_intern("ptr", 8);
        let node = sh.type_intern("node", 16);
        let var = sh.var_create(VarId(1), 8, Some(ptr));

        let nodes: Vec<ObjId> = (0..3).map(|_| sh.alloc(16, Some(node))).collect();
        for (i, &n) in nodes.iter().enumerate() {
            let next = match nodes.get(i + 1) {
                Some(&m) => sh.val_addr(m, 0, TargetSpec::Region),
                None => ValId::NULL,
            };
            let prev = match i.checked_sub(1) {
                Some(j) => sh.val_addr(nodes[j], 0, TargetSpec::Region),
                None => ValId::NULL,
            };
            sh.set_field(n, 0, ptr, next);
            sh.set_field(n, 8, ptr, prev);
        }
        let head = sh.val_addr(nodes[0], 0, TargetSpec::Region);
        sh.set_field(var, 0, ptr, head);

        let chain = discover_chain(&sh, nodes[0], 0, &EngineOptions::default()).unwrap();
        assert!(chain.dls);
        assert_eq!(chain.binding, BindingOff::dls(0, 0, 8));
        assert_eq!(chain.nodes, nodes);

        // without back-link summaries the prev fields count as data, and
        // data diverges between consecutive nodes
        let mut opts = EngineOptions::default();
        opts.apply_str("disable_dls=1").unwrap();
        assert!(discover_chain(&sh, nodes[0], 0, &opts).is_none());
    }

    #[test]
    fn rewalking_the_other_side_uses_the_given_binding() {
        let (sh, nodes) = sls_chain(3);
        let run = chain_with_binding(&sh, nodes[0], 0, BindingOff::sls(0, 0), false);
        assert_eq!(run, nodes);

        // a binding that follows the payload field goes nowhere
        let run = chain_with_binding(&sh, nodes[0], 0, BindingOff::sls(0, 8), false);
        assert_eq!(run, vec![nodes[0]]);
    }
}
