//! The rule-hierarchy builder (C7): computes, without mutating anything,
//! the lifted/projected rules and inter-rule homomorphisms a rewrite of one
//! graph would induce across the whole DAG.

use std::collections::BTreeMap;

use tracing::instrument;

use crate::error::Error;
use crate::graph::{AttributedGraph, Graph};
use crate::hierarchy::Hierarchy;
use crate::ids::{GraphId, NodeId};
use crate::kernel;
use crate::mapping::Mapping;
use crate::rewriting::{PTyping, RhsTyping};
use crate::rule::Rule;

/// `(l-map, p-map, r-map)` between the rules at a typing edge's source and
/// target in the rule hierarchy.
pub type RuleHomomorphism = (Mapping, Mapping, Mapping);

#[derive(Clone, Debug, Default)]
pub struct RulePropagations {
    pub rules: BTreeMap<GraphId, Rule>,
    pub rule_homomorphisms: BTreeMap<(GraphId, GraphId), RuleHomomorphism>,
    pub instances: BTreeMap<GraphId, Mapping>,
}

#[instrument(skip(h, rule, instance, p_typing, rhs_typing))]
pub fn get_rule_propagations(
    h: &Hierarchy,
    origin: &str,
    rule: &Rule,
    instance: &Mapping,
    p_typing: &PTyping,
    rhs_typing: &RhsTyping,
) -> Result<RulePropagations, Error> {
    let mut out = RulePropagations::default();
    out.rules.insert(origin.to_string(), rule.clone());
    out.instances.insert(origin.to_string(), instance.clone());

    for (a, t) in h.get_ancestors(origin)? {
        let (lifted_l, l_to_lhs, l_to_a) = kernel::pullback(&rule.lhs, h.get_graph(&a)?, instance, &t);

        let (mut p_a, p_a_to_p, mut p_a_to_la) = kernel::pullback(&rule.p, &lifted_l, &rule.p_lhs, &l_to_lhs);
        if let Some(restriction) = p_typing.get(&a) {
            let allowed: std::collections::BTreeSet<NodeId> = restriction.values().flatten().cloned().collect();
            let keep: Vec<NodeId> = p_a
                .nodes()
                .filter(|n| p_a_to_p.get(*n).map(|p| allowed.contains(p)).unwrap_or(true))
                .cloned()
                .collect();
            let mut restricted = Graph::new();
            for n in &keep {
                restricted.add_node(n.clone(), p_a.node_attrs(n).cloned().unwrap_or_default());
            }
            for n1 in &keep {
                for n2 in &keep {
                    if p_a.has_edge(n1, n2) {
                        restricted.add_edge(n1.clone(), n2.clone(), p_a.edge_attrs(n1, n2).cloned().unwrap_or_default());
                    }
                }
            }
            p_a_to_la.retain(|n, _| keep.contains(n));
            p_a = restricted;
        }

        let lifted_rule = Rule {
            lhs: lifted_l,
            p: p_a,
            rhs: Graph::new(),
            p_lhs: p_a_to_la,
            p_rhs: Mapping::new(),
        };
        out.rule_homomorphisms.insert(
            (a.clone(), origin.to_string()),
            (l_to_lhs.clone(), p_a_to_p.clone(), Mapping::new()),
        );
        out.instances.insert(a.clone(), l_to_a);
        out.rules.insert(a, lifted_rule);
    }

    for (d, t) in h.get_descendants(origin)? {
        let l_to_d = crate::mapping::compose(instance, &t);
        let (l_d, lhs_to_ld, ld_to_d) = kernel::image_factorization(&rule.lhs, h.get_graph(&d)?, &l_to_d);
        let (mut r_d, _ld_to_rd, rhs_to_rd) = kernel::pushout(&rule.p, &l_d, &rule.rhs, &compose_p_to_ld(rule, &lhs_to_ld), &rule.p_rhs);

        if let Some(extra) = rhs_typing.get(&d) {
            for targets in extra.values() {
                for target in targets {
                    if !r_d.has_node(target) {
                        r_d.add_node(target.clone(), h.get_graph(&d)?.node_attrs(target).cloned().unwrap_or_default());
                    }
                }
            }
        }

        let p_to_rd = crate::mapping::compose(&rule.p_rhs, &rhs_to_rd);
        let projected_rule = Rule {
            lhs: l_d,
            p: rule.p.clone(),
            rhs: r_d,
            p_lhs: compose_p_to_ld(rule, &lhs_to_ld),
            p_rhs: p_to_rd,
        };
        let p_identity = identity_map(rule.p.node_set());
        out.rule_homomorphisms.insert(
            (origin.to_string(), d.clone()),
            (lhs_to_ld, p_identity, rhs_to_rd),
        );
        out.instances.insert(d.clone(), ld_to_d);
        out.rules.insert(d, projected_rule);
    }

    Ok(out)
}

fn compose_p_to_ld(rule: &Rule, lhs_to_ld: &Mapping) -> Mapping {
    rule.p_lhs
        .iter()
        .filter_map(|(p, l)| lhs_to_ld.get(l).map(|ld| (p.clone(), ld.clone())))
        .collect()
}

fn identity_map(nodes: std::collections::BTreeSet<NodeId>) -> Mapping {
    nodes.into_iter().map(|n| (n.clone(), n)).collect()
}

/// Shortest path from `s` to `t` through the graph of edges that already
/// have a `rule_homomorphisms` entry -- not `h`'s own typing edges, which
/// are one hop by definition whenever `(s, t)` is itself a direct edge and
/// would make every direct edge look "already at its shortest path",
/// masking the genuine multi-hop chains this is meant to find.
fn shortest_known_homomorphism_path(
    rule_homomorphisms: &BTreeMap<(GraphId, GraphId), RuleHomomorphism>,
    s: &str,
    t: &str,
) -> Option<Vec<GraphId>> {
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (src, tgt) in rule_homomorphisms.keys() {
        adjacency.entry(src.as_str()).or_default().push(tgt.as_str());
    }

    let mut visited: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
    let mut queue = std::collections::VecDeque::new();
    let mut parent: BTreeMap<&str, &str> = BTreeMap::new();
    visited.insert(s);
    queue.push_back(s);
    while let Some(cur) = queue.pop_front() {
        if cur == t {
            let mut path = vec![cur];
            let mut node = cur;
            while let Some(p) = parent.get(node) {
                path.push(p);
                node = p;
            }
            path.reverse();
            return Some(path.into_iter().map(str::to_string).collect());
        }
        for next in adjacency.get(cur).into_iter().flatten() {
            if visited.insert(next) {
                parent.insert(next, cur);
                queue.push_back(next);
            }
        }
    }
    None
}

/// For every graph in `touched` (a rule already induced by the rewrite
/// itself, not one of `refine_rule_hierarchy`'s own identity fill-ins), add
/// one fresh LHS (and P, via the identity) node per node whose image is
/// already pinned down by a `touched` predecessor's own instance reaching
/// across the connecting typing but missing from this graph's own instance
/// -- closes the pattern over every node a neighboring rule already commits
/// to, so the homomorphism between the two rules can be total. Predecessors
/// outside `touched` are skipped: an identity-filled neighbor's instance
/// covers its entire graph by construction and would otherwise force every
/// rule it borders to grow to cover that whole graph, not just the part the
/// rewrite actually constrains.
fn extend_lhs_to_constrained_nodes(
    h: &Hierarchy,
    touched: &std::collections::BTreeSet<GraphId>,
    propagations: &mut RulePropagations,
) -> Result<(), Error> {
    for g in touched.iter().cloned().collect::<Vec<_>>() {
        let covered: std::collections::BTreeSet<NodeId> =
            propagations.instances.get(&g).cloned().unwrap_or_default().into_values().collect();

        let mut constrained: std::collections::BTreeSet<NodeId> = std::collections::BTreeSet::new();
        for p in h.predecessors(&g)? {
            if !touched.contains(&p) {
                continue;
            }
            let t = h.get_typing(&p, &g)?;
            for img in propagations.instances.get(&p).cloned().unwrap_or_default().values() {
                if let Some(target) = t.get(img) {
                    if !covered.contains(target) {
                        constrained.insert(target.clone());
                    }
                }
            }
        }
        if constrained.is_empty() {
            continue;
        }

        let g_graph = h.get_graph(&g)?.clone();
        let rule = propagations.rules.get_mut(&g).expect("graph has a rule");
        let instance = propagations.instances.entry(g).or_default();
        for g_node in constrained {
            let fresh = rule.lhs.generate_node_id(&g_node);
            let attrs = g_graph.node_attrs(&g_node).cloned().unwrap_or_default();
            rule.lhs.add_node(fresh.clone(), attrs.clone());
            rule.p.add_node(fresh.clone(), attrs.clone());
            rule.rhs.add_node(fresh.clone(), attrs);
            rule.p_lhs.insert(fresh.clone(), fresh.clone());
            rule.p_rhs.insert(fresh.clone(), fresh.clone());
            instance.insert(fresh, g_node);
        }
    }
    Ok(())
}

/// Extend a partial rule hierarchy to cover every graph in `h`: every
/// already-touched rule's LHS first grows to cover nodes a touched
/// predecessor's instance already constrains, untouched graphs then get
/// the identity rule (and an identity instance, so they fully witness
/// their own graph), and finally homomorphisms along an edge of `h`
/// missing from `rule_homomorphisms` are filled in -- directly from the
/// typing when both ends are identity-filled graphs (the typing map
/// already is the homomorphism between two identity rules), otherwise by
/// composing along a path of already-known homomorphisms when one
/// connects the two rules.
#[instrument(skip(h, propagations))]
pub fn refine_rule_hierarchy(h: &Hierarchy, _origin: &str, propagations: &mut RulePropagations) -> Result<(), Error> {
    let touched: std::collections::BTreeSet<GraphId> = propagations.rules.keys().cloned().collect();
    extend_lhs_to_constrained_nodes(h, &touched, propagations)?;

    let mut identity_graphs: std::collections::BTreeSet<GraphId> = std::collections::BTreeSet::new();
    for g in h.graphs().cloned().collect::<Vec<_>>() {
        if !propagations.rules.contains_key(&g) {
            let graph = h.get_graph(&g)?.clone();
            propagations.instances.insert(g.clone(), identity_map(graph.node_set()));
            propagations.rules.insert(g.clone(), Rule::identity(graph));
            identity_graphs.insert(g.clone());
        } else {
            propagations.instances.entry(g).or_default();
        }
    }

    for (s, t) in h.typings() {
        if propagations.rule_homomorphisms.contains_key(&(s.clone(), t.clone())) {
            continue;
        }

        if identity_graphs.contains(&s) && identity_graphs.contains(&t) {
            let typing = h.get_typing(&s, &t)?.clone();
            propagations.rule_homomorphisms.insert((s, t), (typing.clone(), typing.clone(), typing));
            continue;
        }

        if let Some(path) = shortest_known_homomorphism_path(&propagations.rule_homomorphisms, &s, &t) {
            let (mut l_acc, mut p_acc, mut r_acc) = propagations.rule_homomorphisms[&(path[0].clone(), path[1].clone())].clone();
            for pair in path.windows(2).skip(1) {
                let (l, p, r) = &propagations.rule_homomorphisms[&(pair[0].clone(), pair[1].clone())];
                l_acc = crate::mapping::compose(&l_acc, l);
                p_acc = crate::mapping::compose(&p_acc, p);
                r_acc = crate::mapping::compose(&r_acc, r);
            }
            propagations.rule_homomorphisms.insert((s, t), (l_acc, p_acc, r_acc));
        }
    }

    Ok(())
}
