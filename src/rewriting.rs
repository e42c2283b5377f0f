//! The rewriting engine (C5): splits one SqPO rewrite into a restrictive
//! phase (clone/delete) and an expansive phase (add/merge), repairing the
//! typings immediately adjacent to the rewritten graph between the two.
//!
//! Ancestor/descendant repair past those immediate neighbours is
//! [`crate::propagation`]'s job; this module only handles Stage 0, 1, 3 of
//! §4.3 and calls into `propagation` for Stage 2 and Stage 4.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{instrument, trace};

use crate::error::{Error, RewritingError};
use crate::graph::{AttributedGraph, Graph};
use crate::hierarchy::Hierarchy;
use crate::ids::{GraphId, NodeId};
use crate::mapping::{self, Mapping};
use crate::propagation;
use crate::rule::Rule;

/// `ancestor -> A-node -> set of P-node ids` the caller designates as the
/// intended preimages for a clone reaching that ancestor.
pub type PTyping = BTreeMap<GraphId, BTreeMap<NodeId, BTreeSet<NodeId>>>;
/// `descendant -> R-node -> set of D-node ids` the caller designates as the
/// routing target for an added/merged node reaching that descendant.
pub type RhsTyping = BTreeMap<GraphId, BTreeMap<NodeId, BTreeSet<NodeId>>>;

#[instrument(skip(h, rule, instance, p_typing, rhs_typing))]
pub fn rewrite(
    h: &mut Hierarchy,
    graph_id: &str,
    rule: &Rule,
    instance: Option<Mapping>,
    p_typing: PTyping,
    rhs_typing: RhsTyping,
    strict: bool,
) -> Result<Mapping, Error> {
    let instance = instance.unwrap_or_else(|| mapping::identity(&rule.lhs.node_set()));

    check_rule_instance_typing(h, graph_id, rule, &instance, &p_typing, &rhs_typing, strict)?;

    let snapshot = h.clone();
    match rewrite_unchecked(h, graph_id, rule, &instance, &p_typing, &rhs_typing) {
        Ok(rhs_g_prime) => Ok(rhs_g_prime),
        Err(e) => {
            *h = snapshot;
            Err(e)
        }
    }
}

fn rewrite_unchecked(
    h: &mut Hierarchy,
    graph_id: &str,
    rule: &Rule,
    instance: &Mapping,
    p_typing: &PTyping,
    rhs_typing: &RhsTyping,
) -> Result<Mapping, Error> {
    let (p_g_minus, g_minus_g) = {
        let graph = h.graph_mut_for_rewrite(graph_id)?;
        restrictive_rewrite(graph, rule, instance)
    };
    trace!(graph_id, p_nodes = p_g_minus.len(), "stage 1: restrictive rewrite applied");
    repair_successors(h, graph_id, &g_minus_g)?;

    propagation::propagate_backward(h, graph_id, rule, instance, p_typing, &p_g_minus)?;

    let (rhs_g_prime, g_minus_g_prime) = {
        let graph = h.graph_mut_for_rewrite(graph_id)?;
        expansive_rewrite(graph, rule, &p_g_minus)
    };
    trace!(graph_id, r_nodes = rhs_g_prime.len(), "stage 3: expansive rewrite applied");
    repair_predecessors(h, graph_id, &g_minus_g_prime)?;

    propagation::propagate_forward(h, graph_id, rule, &rhs_g_prime, &g_minus_g_prime, rhs_typing)?;

    Ok(rhs_g_prime)
}

fn first_duplicate(map: &Mapping) -> Option<NodeId> {
    let mut seen = BTreeSet::new();
    for v in map.values() {
        if !seen.insert(v.clone()) {
            return Some(v.clone());
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn check_rule_instance_typing(
    h: &Hierarchy,
    graph_id: &str,
    rule: &Rule,
    instance: &Mapping,
    p_typing: &PTyping,
    rhs_typing: &RhsTyping,
    strict: bool,
) -> Result<(), Error> {
    let graph = h.get_graph(graph_id)?;
    mapping::check_homomorphism(&"LHS".to_string(), &graph_id.to_string(), &rule.lhs, graph, instance, true)?;
    if let Some(dup) = first_duplicate(instance) {
        return Err(RewritingError::InstanceNotMono(dup).into());
    }

    for (a, node_map) in p_typing {
        let t = h.get_typing(a, graph_id)?;
        for (k, vs) in node_map {
            let expected: BTreeSet<NodeId> = vs
                .iter()
                .filter_map(|v| rule.p_lhs.get(v))
                .filter_map(|l| instance.get(l))
                .cloned()
                .collect();
            if let Some(exp) = expected.iter().next() {
                if t.get(k) != Some(exp) {
                    return Err(RewritingError::PTypingRetypes(k.clone(), a.clone()).into());
                }
            }
        }
        for pred in h.predecessors(a)? {
            if p_typing.contains_key(&pred) {
                continue;
            }
            for l in rule.cloned_nodes().into_iter().map(|(l, _)| l) {
                let g_img = match instance.get(&l) {
                    Some(g) => g,
                    None => continue,
                };
                for (k, vs) in node_map {
                    if t.get(k) != Some(g_img) {
                        continue;
                    }
                    let all_preimages: BTreeSet<_> = mapping::preimage(&rule.p_lhs, &l).into_iter().collect();
                    if vs != &all_preimages {
                        return Err(RewritingError::PTypingNotComposable(a.clone(), pred.clone()).into());
                    }
                }
            }
        }
    }

    for (d, node_map) in rhs_typing {
        let t = h.get_typing(d, graph_id).ok();
        for (r, targets) in node_map {
            if let Some(t) = t {
                for target in targets {
                    if let Some(p) = mapping::preimage(&rule.p_rhs, r).into_iter().next() {
                        if let Some(l) = rule.p_lhs.get(&p) {
                            if let Some(existing) = t.get(l) {
                                if existing != target {
                                    return Err(RewritingError::RhsTypingIncompatible(d.clone()).into());
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    if strict {
        // rhs_typing is keyed by ancestor, not descendant: an added node in
        // `graph_id` is only visible to graphs typed into it (directly or
        // transitively), same direction `propagate_forward` walks.
        let ancestors: Vec<GraphId> = h.get_ancestors(graph_id)?.into_keys().collect();
        for r in rule.added_nodes() {
            for a in &ancestors {
                let targets = rhs_typing.get(a).and_then(|m| m.get(&r));
                match targets {
                    Some(t) if t.len() == 1 => {}
                    Some(_) => return Err(RewritingError::StrictRhsTypingNotSingleton(r.clone(), a.clone()).into()),
                    None => return Err(RewritingError::StrictRhsTypingMissing(r.clone(), a.clone()).into()),
                }
            }
        }
    }

    Ok(())
}

/// Apply the clone/delete half of `rule` through `instance` directly to
/// `graph`. Returns `(p_g_minus: P -> G-, g_minus_g: G- -> G)`.
fn restrictive_rewrite(graph: &mut Graph, rule: &Rule, instance: &Mapping) -> (Mapping, Mapping) {
    let mut p_g_minus = Mapping::new();
    let mut g_minus_g: Mapping = graph.node_set().into_iter().map(|n| (n.clone(), n)).collect();

    let per_l = rule.p_groups_by_lhs();

    for (l, ps) in &per_l {
        let g_node = match instance.get(l) {
            Some(g) => g.clone(),
            None => continue,
        };
        p_g_minus.insert(ps[0].clone(), g_node.clone());
        for p in &ps[1..] {
            let fresh = graph.generate_node_id(&g_node);
            graph.clone_node(&g_node, fresh.clone());
            g_minus_g.insert(fresh.clone(), g_node.clone());
            p_g_minus.insert(p.clone(), fresh);
        }
    }

    for l in rule.removed_nodes() {
        if let Some(g_node) = instance.get(&l) {
            graph.remove_node(g_node);
            g_minus_g.remove(g_node);
        }
    }
    for (ls, lt) in rule.removed_edges() {
        if let (Some(gs), Some(gt)) = (instance.get(&ls), instance.get(&lt)) {
            graph.remove_edge(gs, gt);
        }
    }
    for (l, attrs) in rule.removed_node_attrs() {
        if let Some(g_node) = instance.get(&l) {
            graph.remove_node_attrs(g_node, &attrs);
        }
    }

    (p_g_minus, g_minus_g)
}

fn fresh_merge_id(graph: &Graph, prefix: &str, group: &[NodeId]) -> NodeId {
    let collides = |c: &str| graph.has_node(c) && !group.iter().any(|g| g == c);
    if !collides(prefix) {
        return prefix.to_string();
    }
    let mut i = 0u64;
    loop {
        let candidate = format!("{}{}", prefix, i);
        if !collides(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

/// Apply the merge/add half of `rule` to `graph`, given `p_g_minus` from the
/// restrictive phase. Returns `(rhs_g_prime: R -> G', g_minus_g_prime: G- -> G')`.
fn expansive_rewrite(graph: &mut Graph, rule: &Rule, p_g_minus: &Mapping) -> (Mapping, Mapping) {
    let mut rhs_g_prime = Mapping::new();
    let mut g_minus_g_prime: Mapping = graph.node_set().into_iter().map(|n| (n.clone(), n)).collect();

    let per_r = rule.p_groups_by_rhs();

    for (r, ps) in &per_r {
        let mut g_nodes: Vec<NodeId> = ps.iter().filter_map(|p| p_g_minus.get(p)).cloned().collect();
        g_nodes.sort();
        g_nodes.dedup();
        if g_nodes.is_empty() {
            continue;
        }
        if g_nodes.len() == 1 {
            rhs_g_prime.insert(r.clone(), g_nodes[0].clone());
        } else {
            let merged_id = fresh_merge_id(graph, &g_nodes[0], &g_nodes);
            graph.merge_nodes(&g_nodes, merged_id.clone());
            for g in &g_nodes {
                g_minus_g_prime.insert(g.clone(), merged_id.clone());
            }
            rhs_g_prime.insert(r.clone(), merged_id);
        }
    }

    for r in rule.added_nodes() {
        let attrs = rule.rhs.node_attrs(&r).cloned().unwrap_or_default();
        let fresh = graph.generate_node_id(&r);
        graph.add_node(fresh.clone(), attrs);
        rhs_g_prime.insert(r.clone(), fresh);
    }
    for (rs, rt) in rule.added_edges() {
        if let (Some(gs), Some(gt)) = (rhs_g_prime.get(&rs), rhs_g_prime.get(&rt)) {
            let attrs = rule.rhs.edge_attrs(&rs, &rt).cloned().unwrap_or_default();
            graph.add_edge(gs.clone(), gt.clone(), attrs);
        }
    }
    for (r, attrs) in rule.added_node_attrs() {
        if let Some(g) = rhs_g_prime.get(&r) {
            graph.add_node_attrs(g, attrs);
        }
    }

    (rhs_g_prime, g_minus_g_prime)
}

fn repair_successors(h: &mut Hierarchy, graph_id: &str, g_minus_g: &Mapping) -> Result<(), Error> {
    let succs: Vec<GraphId> = h.successors(graph_id)?.into_iter().collect();
    let current_nodes = h.get_graph(graph_id)?.node_set();
    for s in succs {
        let old_typing = h.get_typing(graph_id, &s)?.clone();
        let mut new_typing = Mapping::new();
        for n in &current_nodes {
            if let Some(orig) = g_minus_g.get(n) {
                if let Some(img) = old_typing.get(orig) {
                    new_typing.insert(n.clone(), img.clone());
                }
            }
        }
        h.set_typing(graph_id, &s, new_typing)?;
    }
    Ok(())
}

fn repair_predecessors(h: &mut Hierarchy, graph_id: &str, g_minus_g_prime: &Mapping) -> Result<(), Error> {
    let preds: Vec<GraphId> = h.predecessors(graph_id)?.into_iter().collect();
    for p in preds {
        let old_typing = h.get_typing(&p, graph_id)?.clone();
        let new_typing: Mapping = old_typing
            .into_iter()
            .filter_map(|(k, v)| g_minus_g_prime.get(&v).map(|nv| (k, nv.clone())))
            .collect();
        h.set_typing(&p, graph_id, new_typing)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_node_graph(id: &str) -> Graph {
        let mut g = Graph::new();
        g.add_node(id.to_string(), Default::default());
        g
    }

    #[test]
    fn identity_rule_is_a_no_op() {
        let mut h = Hierarchy::new();
        h.add_graph("G".into(), one_node_graph("a"), Default::default()).unwrap();
        let rule = Rule::identity(one_node_graph("a"));
        let instance = mapping::identity(&rule.lhs.node_set());
        let result = rewrite(&mut h, "G", &rule, Some(instance), PTyping::new(), RhsTyping::new(), false).unwrap();
        assert_eq!(result.get("a"), Some(&"a".to_string()));
        assert!(h.get_graph("G").unwrap().has_node("a"));
    }

    #[test]
    fn deleting_a_node_removes_it_from_the_graph() {
        let mut h = Hierarchy::new();
        h.add_graph("G".into(), one_node_graph("a"), Default::default()).unwrap();
        let lhs = one_node_graph("a");
        let rule = Rule {
            lhs,
            p: Graph::new(),
            rhs: Graph::new(),
            p_lhs: Mapping::new(),
            p_rhs: Mapping::new(),
        };
        let instance = {
            let mut m = Mapping::new();
            m.insert("a".to_string(), "a".to_string());
            m
        };
        rewrite(&mut h, "G", &rule, Some(instance), PTyping::new(), RhsTyping::new(), false).unwrap();
        assert!(!h.get_graph("G").unwrap().has_node("a"));
    }
}
