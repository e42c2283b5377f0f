//! The propagation engine (C6): after a rewrite touches one graph, walk its
//! ancestors backward and descendants forward so every typing in the DAG
//! commutes again, then do one repair pass per direction using the kernel's
//! universal-map constructors.
//!
//! Both directions process their BFS layer in nearest-first order and
//! thread a `survivors` map (old node id -> what it became) from each
//! already-processed graph to the next, so a graph with no *direct* typing
//! edge to the rewritten origin -- two or more hops away -- still gets its
//! own local mutations and its direct edge to the nearer graph repaired.
//! This is what makes (S3)-style deletion propagation through an
//! intermediate graph work.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use crate::error::Error;
use crate::graph::AttributedGraph;
use crate::hierarchy::Hierarchy;
use crate::ids::{GraphId, NodeId};
use crate::kernel;
use crate::mapping::Mapping;
use crate::rewriting::{PTyping, RhsTyping};
use crate::rule::Rule;

/// Clone/delete propagation to every ancestor of `origin`, then one repair
/// pass re-establishing commutativity across the whole ancestor subgraph.
#[instrument(skip(h, rule, instance, p_typing, p_g_minus))]
pub fn propagate_backward(
    h: &mut Hierarchy,
    origin: &str,
    rule: &Rule,
    instance: &Mapping,
    p_typing: &PTyping,
    p_g_minus: &Mapping,
) -> Result<(), Error> {
    let ancestors = h.bfs_tree(origin, true)?;
    let removed: BTreeSet<NodeId> = rule.removed_nodes();
    let removed_edges = rule.removed_edges();
    let removed_attrs = rule.removed_node_attrs();
    let cloned = rule.cloned_nodes();

    // survivors[g][old_id] = the node id(s) `old_id` (a node of an
    // already-processed graph `g`, origin or a nearer ancestor) now maps to
    // in `g`'s own post-propagation node set; empty means removed.
    let mut survivors: std::collections::BTreeMap<GraphId, std::collections::BTreeMap<NodeId, Vec<NodeId>>> =
        std::collections::BTreeMap::new();

    let mut origin_survivors: std::collections::BTreeMap<NodeId, Vec<NodeId>> = h
        .get_graph(origin)?
        .node_set()
        .into_iter()
        .map(|n| (n.clone(), vec![n]))
        .collect();
    for (l, ps) in &cloned {
        if let Some(g) = instance.get(l) {
            let ids: Vec<NodeId> = ps.iter().filter_map(|p| p_g_minus.get(p)).cloned().collect();
            if !ids.is_empty() {
                origin_survivors.insert(g.clone(), ids);
            }
        }
    }
    for l in &removed {
        if let Some(g) = instance.get(l) {
            origin_survivors.insert(g.clone(), Vec::new());
        }
    }
    survivors.insert(origin.to_string(), origin_survivors);

    for a in &ancestors {
        let targets: Vec<GraphId> = h.successors(a)?.into_iter().filter(|s| survivors.contains_key(s)).collect();
        let mut my_survivors: std::collections::BTreeMap<NodeId, Vec<NodeId>> =
            h.get_graph(a)?.node_set().into_iter().map(|n| (n.clone(), vec![n])).collect();

        for s in &targets {
            let is_origin = s.as_str() == origin;
            let t_old = h.get_typing(a, s)?.clone();
            let s_survivors = survivors[s].clone();
            let mut new_typing = Mapping::new();

            for (a_node, target_node) in &t_old {
                let new_ids = s_survivors.get(target_node).cloned().unwrap_or_else(|| vec![target_node.clone()]);
                if new_ids.is_empty() {
                    h.graph_mut_for_rewrite(a)?.remove_node(a_node);
                    // Present-but-empty, not absent: a farther ancestor's
                    // lookup of this id must see "removed", not fall
                    // through to the unchanged-id default below.
                    my_survivors.insert(a_node.clone(), Vec::new());
                    continue;
                }
                if new_ids.len() == 1 {
                    new_typing.insert(a_node.clone(), new_ids[0].clone());
                    continue;
                }
                // `target_node` fanned out into several ids (a clone at `s`).
                // Only the direct predecessor of `origin` gets a precise
                // per-P-node selection via `p_typing`; farther ancestors
                // fall back to one copy per surviving target (documented in
                // DESIGN.md).
                let selected = if is_origin {
                    select_clone_targets(a, a_node, target_node, &cloned, instance, p_typing, p_g_minus)
                        .unwrap_or_else(|| new_ids.clone())
                } else {
                    new_ids.clone()
                };
                my_survivors.remove(a_node);
                let mut fates = Vec::new();
                for (i, tgt) in selected.iter().enumerate() {
                    if i == 0 {
                        new_typing.insert(a_node.clone(), tgt.clone());
                        fates.push(a_node.clone());
                    } else {
                        let fresh = h.get_graph(a)?.generate_node_id(a_node);
                        h.graph_mut_for_rewrite(a)?.clone_node(a_node, fresh.clone());
                        new_typing.insert(fresh.clone(), tgt.clone());
                        fates.push(fresh);
                    }
                }
                my_survivors.insert(a_node.clone(), fates);
            }

            if is_origin {
                for (ls, lt) in &removed_edges {
                    if let (Some(gs), Some(gt)) = (instance.get(ls), instance.get(lt)) {
                        let doomed: Vec<(NodeId, NodeId)> = h
                            .get_graph(a)?
                            .edges()
                            .filter(|&(s1, t1)| t_old.get(s1) == Some(gs) && t_old.get(t1) == Some(gt))
                            .map(|(s1, t1)| (s1.clone(), t1.clone()))
                            .collect();
                        for (s1, t1) in doomed {
                            h.graph_mut_for_rewrite(a)?.remove_edge(&s1, &t1);
                        }
                    }
                }
                for (l, attrs) in &removed_attrs {
                    if let Some(g_img) = instance.get(l) {
                        let affected: Vec<NodeId> = t_old.iter().filter(|(_, v)| *v == g_img).map(|(k, _)| k.clone()).collect();
                        for a_node in affected {
                            h.graph_mut_for_rewrite(a)?.remove_node_attrs(&a_node, attrs);
                        }
                    }
                }
            }

            h.set_typing(a, s, new_typing)?;
        }

        survivors.insert(a.clone(), my_survivors);
        debug!(ancestor = a.as_str(), "backward propagation applied");
    }

    // Repair pass: every typing edge p -> a between two ancestors (or an
    // ancestor and a further predecessor) with a direct edge to `origin` on
    // both sides is recomputed as the unique mediating map to the pullback
    // of `a`'s and `p`'s typings into `origin`. Chains not reaching `origin`
    // directly were already cascaded above.
    for a in &ancestors {
        let a_to_origin = match h.get_typing(a, origin) {
            Ok(m) => m.clone(),
            Err(_) => continue,
        };
        for p in h.predecessors(a)?.into_iter().collect::<Vec<_>>() {
            let p_to_origin = match h.get_typing(&p, origin) {
                Ok(m) => m.clone(),
                Err(_) => continue,
            };
            let p_to_a_old = h.get_typing(&p, a)?.clone();
            let a_nodes = h.get_graph(a)?.node_set();
            let (pb, pb_to_a, pb_to_p) = kernel::pullback(h.get_graph(a)?, h.get_graph(&p)?, &a_to_origin, &p_to_origin);
            let pb_nodes = pb.node_set();
            let mediator = kernel::unique_map_to_pullback(&pb_nodes, &pb_to_a, &pb_to_p, &identity_map(&a_nodes), &p_to_a_old);
            let repaired: Mapping = mediator
                .into_iter()
                .filter_map(|(a_node, pb_node)| pb_to_p.get(&pb_node).map(|p_node| (a_node, p_node.clone())))
                .collect();
            h.set_typing(&p, a, repaired)?;
        }
    }

    Ok(())
}

fn select_clone_targets(
    a: &str,
    a_node: &str,
    target_node: &str,
    cloned: &[(NodeId, Vec<NodeId>)],
    instance: &Mapping,
    p_typing: &PTyping,
    p_g_minus: &Mapping,
) -> Option<Vec<NodeId>> {
    let (_, ps) = cloned
        .iter()
        .find(|(l, _)| instance.get(l).map(|g| g == target_node).unwrap_or(false))?;
    let want = p_typing.get(a).and_then(|m| m.get(a_node));
    let chosen: Vec<NodeId> = match want {
        Some(w) => ps.iter().filter(|p| w.contains(*p)).filter_map(|p| p_g_minus.get(p)).cloned().collect(),
        None => ps.iter().filter_map(|p| p_g_minus.get(p)).cloned().collect(),
    };
    if chosen.is_empty() {
        None
    } else {
        Some(chosen)
    }
}

/// Merge/add propagation to every ancestor of `origin` -- the graphs typed
/// (transitively) into it, the same direction restrictive changes cascade
/// through -- then one repair pass re-establishing commutativity with the
/// kernel's pullback mediator.
///
/// A rewrite only ever grows `origin` itself; nothing downstream of it in
/// the DAG (its own successors, i.e. its types) needs to hear about a merge
/// or an added node, since those are shared meta-graphs that many other
/// graphs are typed into. What needs to hear about it is exactly the set of
/// graphs that type into `origin`, directly or through a chain -- its
/// ancestors, same `bfs_tree(origin, true)` traversal `propagate_backward`
/// uses.
#[instrument(skip(h, rule, rhs_g_prime, g_minus_g_prime, rhs_typing))]
pub fn propagate_forward(
    h: &mut Hierarchy,
    origin: &str,
    rule: &Rule,
    rhs_g_prime: &Mapping,
    g_minus_g_prime: &Mapping,
    rhs_typing: &RhsTyping,
) -> Result<(), Error> {
    let ancestors = h.bfs_tree(origin, true)?;
    let added_nodes = rule.added_nodes();
    let added_edges = rule.added_edges();
    let added_attrs = rule.added_node_attrs();

    // survivors[g]: g's own old node id -> new node id, after this
    // rewrite's consequences have propagated through g. Always total:
    // forward changes never delete a node an ancestor already points at.
    let mut survivors: std::collections::BTreeMap<GraphId, Mapping> = std::collections::BTreeMap::new();
    survivors.insert(origin.to_string(), g_minus_g_prime.clone());

    // added_in[g]: rule RHS node id -> the node id standing for it in `g`'s
    // own (already-propagated) node set. `origin`'s own copy is
    // `rhs_g_prime` itself; an ancestor two or more hops away is wired into
    // its nearer neighbor's representative here, not `origin`'s node id
    // directly, so `rhs_typing` designations reach it the same way a direct
    // ancestor's do, no matter how many hops away it sits -- the same
    // nearest-first cascade `survivors` already runs for deletions.
    let mut added_in: std::collections::BTreeMap<GraphId, Mapping> = std::collections::BTreeMap::new();
    added_in.insert(origin.to_string(), rhs_g_prime.clone());

    for a in &ancestors {
        let targets: Vec<GraphId> = h.successors(a)?.into_iter().filter(|s| survivors.contains_key(s)).collect();
        let mut my_survivors: Mapping = h.get_graph(a)?.node_set().into_iter().map(|n| (n.clone(), n)).collect();
        // r -> the node `a` materialized for it, reused across every target
        // `s` instead of creating a fresh copy per edge.
        let mut my_added: Mapping = Mapping::new();

        for s in &targets {
            let t_old = h.get_typing(a, s)?.clone();
            let s_survivors = survivors[s].clone();
            let mut new_typing: Mapping = t_old
                .iter()
                .filter_map(|(k, v)| s_survivors.get(v).map(|nv| (k.clone(), nv.clone())))
                .collect();

            // Two a-nodes can now share an image if `s`'s merge collapsed
            // their respective targets; merge them in `a` too.
            let mut by_image: std::collections::BTreeMap<NodeId, Vec<NodeId>> = std::collections::BTreeMap::new();
            for (k, v) in &new_typing {
                by_image.entry(v.clone()).or_default().push(k.clone());
            }
            for (image, ks) in by_image.into_iter().filter(|(_, ks)| ks.len() > 1) {
                let merged_id = h.get_graph(a)?.generate_node_id(&ks[0]);
                h.graph_mut_for_rewrite(a)?.merge_nodes(&ks, merged_id.clone());
                for k in &ks {
                    new_typing.remove(k);
                }
                new_typing.insert(merged_id.clone(), image);
                for k in &ks {
                    my_survivors.insert(k.clone(), merged_id.clone());
                }
            }

            let s_added = added_in.get(s).cloned().unwrap_or_default();

            for r in &added_nodes {
                let a_node = match my_added.get(r) {
                    Some(existing) => Some(existing.clone()),
                    None => {
                        let attrs = rule.rhs.node_attrs(r).cloned().unwrap_or_default();
                        let targets_a = rhs_typing.get(a).and_then(|m| m.get(r));
                        let created = match targets_a {
                            Some(ts) if !ts.is_empty() => {
                                let mut first = None;
                                for target in ts {
                                    if h.get_graph(a)?.has_node(target) {
                                        h.graph_mut_for_rewrite(a)?.add_node_attrs(target, attrs.clone());
                                    } else {
                                        h.graph_mut_for_rewrite(a)?.add_node(target.clone(), attrs.clone());
                                    }
                                    first.get_or_insert_with(|| target.clone());
                                }
                                first
                            }
                            _ => {
                                let fresh = h.get_graph(a)?.generate_node_id(r);
                                h.graph_mut_for_rewrite(a)?.add_node(fresh.clone(), attrs);
                                Some(fresh)
                            }
                        };
                        if let Some(c) = &created {
                            my_added.insert(r.clone(), c.clone());
                        }
                        created
                    }
                };
                if let (Some(a_node), Some(s_node)) = (a_node, s_added.get(r)) {
                    new_typing.insert(a_node, s_node.clone());
                }
            }

            for (rs, rt) in &added_edges {
                let as_ = nodes_typed_as(&new_typing, &s_added, rs);
                let at = nodes_typed_as(&new_typing, &s_added, rt);
                let attrs = rule.rhs.edge_attrs(rs, rt).cloned().unwrap_or_default();
                for s1 in &as_ {
                    for t2 in &at {
                        h.graph_mut_for_rewrite(a)?.add_edge(s1.clone(), t2.clone(), attrs.clone());
                    }
                }
            }

            for (r, attrs) in &added_attrs {
                for an in nodes_typed_as(&new_typing, &s_added, r) {
                    h.graph_mut_for_rewrite(a)?.add_node_attrs(&an, attrs.clone());
                }
            }

            h.set_typing(a, s, new_typing)?;
        }

        // Close `my_added` over the whole RHS (not just the nodes it added
        // itself) so a farther ancestor can resolve a preserved RHS node's
        // identity in `a` too: reuse whatever the fresh per-target typing
        // above already settled on, the same way `survivors` closes over
        // merges.
        for r in rule.rhs.nodes() {
            if my_added.contains_key(r) {
                continue;
            }
            for s in &targets {
                let s_added = added_in.get(s).cloned().unwrap_or_default();
                let t = h.get_typing(a, s)?;
                if let Some(found) = nodes_typed_as(t, &s_added, r).into_iter().next() {
                    my_added.insert(r.clone(), found);
                    break;
                }
            }
        }

        survivors.insert(a.clone(), my_survivors);
        added_in.insert(a.clone(), my_added);
        debug!(ancestor = a.as_str(), "forward propagation applied");
    }

    // Repair pass: every typing edge p -> a between two ancestors with a
    // direct edge to `origin` on both sides is recomputed as the unique
    // mediating map to the pullback of `a`'s and `p`'s typings into
    // `origin`, exactly as in the backward case -- commutativity of an
    // existing homomorphism triangle is a pullback question regardless of
    // whether the change at `origin` was restrictive or expansive.
    for a in &ancestors {
        let a_to_origin = match h.get_typing(a, origin) {
            Ok(m) => m.clone(),
            Err(_) => continue,
        };
        for p in h.predecessors(a)?.into_iter().collect::<Vec<_>>() {
            let p_to_origin = match h.get_typing(&p, origin) {
                Ok(m) => m.clone(),
                Err(_) => continue,
            };
            let p_to_a_old = h.get_typing(&p, a)?.clone();
            let a_nodes = h.get_graph(a)?.node_set();
            let (pb, pb_to_a, pb_to_p) = kernel::pullback(h.get_graph(a)?, h.get_graph(&p)?, &a_to_origin, &p_to_origin);
            let pb_nodes = pb.node_set();
            let mediator = kernel::unique_map_to_pullback(&pb_nodes, &pb_to_a, &pb_to_p, &identity_map(&a_nodes), &p_to_a_old);
            let repaired: Mapping = mediator
                .into_iter()
                .filter_map(|(a_node, pb_node)| pb_to_p.get(&pb_node).map(|p_node| (a_node, p_node.clone())))
                .collect();
            h.set_typing(&p, a, repaired)?;
        }
    }

    Ok(())
}

fn nodes_typed_as(typing: &Mapping, rhs_g_prime: &Mapping, r: &str) -> Vec<NodeId> {
    let g_img = match rhs_g_prime.get(r) {
        Some(g) => g,
        None => return Vec::new(),
    };
    typing.iter().filter(|(_, v)| *v == g_img).map(|(k, _)| k.clone()).collect()
}

fn identity_map(nodes: &BTreeSet<NodeId>) -> Mapping {
    nodes.iter().map(|n| (n.clone(), n.clone())).collect()
}
