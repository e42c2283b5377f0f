//! The category kernel (C3): pullback, pushout, image factorization,
//! relation-to-span, and the two universal-property mediating-map
//! constructors the propagation engine uses to repair broken typings.
//!
//! The reference hierarchy this crate is modelled on does not ship these
//! primitives in its in-memory/graph-DB split at all -- they are pure
//! category theory and are implemented here from the kernel semantics laid
//! out in the spec, using the same `BTreeMap` map type and tie-break rule
//! (§4.1: "use the source id prefixed if unique, else append the smallest
//! non-negative integer making it unique") as the rest of the crate.

use std::collections::BTreeSet;

use tracing::trace;

use crate::attributes::{self, Attributes};
use crate::graph::{AttributedGraph, Graph};
use crate::ids::NodeId;
use crate::mapping::{self, Mapping};

fn fresh_id(g: &Graph, prefix: &str) -> NodeId {
    g.generate_node_id(prefix)
}

/// Pullback of the cospan `a --f--> c <--g-- b`.
///
/// Returns `(p, pi_a, pi_b)` where `p`'s nodes are pairs `(a, b)` with
/// `f(a) == g(b)`, node/edge attributes are intersections, and `pi_a`/`pi_b`
/// project back onto `a`/`b`.
pub fn pullback(a: &dyn AttributedGraph, b: &dyn AttributedGraph, f: &Mapping, g: &Mapping) -> (Graph, Mapping, Mapping) {
    let mut p = Graph::new();
    let mut pi_a = Mapping::new();
    let mut pi_b = Mapping::new();
    // id -> (a_node, b_node) carried alongside the graph to build edges below.
    let mut pair_of: Vec<(NodeId, NodeId, NodeId)> = Vec::new();

    for (a_node, a_img) in f {
        for (b_node, b_img) in g {
            if a_img != b_img {
                continue;
            }
            let id = fresh_id(&p, &format!("{}_{}", a_node, b_node));
            let attrs = attributes::intersection(
                &a.node_attrs(a_node).cloned().unwrap_or_default(),
                &b.node_attrs(b_node).cloned().unwrap_or_default(),
            );
            p.add_node(id.clone(), attrs);
            pi_a.insert(id.clone(), a_node.clone());
            pi_b.insert(id.clone(), b_node.clone());
            pair_of.push((id, a_node.clone(), b_node.clone()));
        }
    }

    for (id1, a1, b1) in &pair_of {
        for (id2, a2, b2) in &pair_of {
            if a.has_edge(a1, a2) && b.has_edge(b1, b2) {
                let attrs = attributes::intersection(
                    &a.edge_attrs(a1, a2).cloned().unwrap_or_default(),
                    &b.edge_attrs(b1, b2).cloned().unwrap_or_default(),
                );
                p.add_edge(id1.clone(), id2.clone(), attrs);
            }
        }
    }

    trace!(nodes = p.len_nodes(), "computed pullback");
    (p, pi_a, pi_b)
}

/// Pushout of the span `b <--f-- a --g--> c`, gluing `b` and `c` along `a`.
///
/// Returns `(q, iota_b, iota_c)`. Every `a`-node is identified with its two
/// images; unmatched `b`/`c` nodes are carried through unchanged (using
/// their own id, tie-broken against collisions with the glued classes).
pub fn pushout(a: &dyn AttributedGraph, b: &dyn AttributedGraph, c: &dyn AttributedGraph, f: &Mapping, g: &Mapping) -> (Graph, Mapping, Mapping) {
    let mut q = Graph::new();
    let mut iota_b = Mapping::new();
    let mut iota_c = Mapping::new();

    // Union-find over (b_node | c_node) driven by a's span: b(a) ~ c(a).
    let mut class_of_b: std::collections::BTreeMap<NodeId, NodeId> = std::collections::BTreeMap::new();
    let mut class_of_c: std::collections::BTreeMap<NodeId, NodeId> = std::collections::BTreeMap::new();

    for a_node in a.nodes() {
        let b_img = f.get(a_node);
        let c_img = g.get(a_node);
        if let (Some(b_img), Some(c_img)) = (b_img, c_img) {
            let id = fresh_id(&q, b_img);
            class_of_b.entry(b_img.clone()).or_insert_with(|| id.clone());
            class_of_c.insert(c_img.clone(), class_of_b[b_img].clone());
        }
    }
    for n in b.nodes() {
        class_of_b.entry(n.clone()).or_insert_with(|| fresh_id(&q, n));
    }
    for n in c.nodes() {
        class_of_c.entry(n.clone()).or_insert_with(|| fresh_id(&q, n));
    }

    for n in b.nodes() {
        let id = &class_of_b[n];
        let attrs = attributes::union(&q.node_attrs(id).cloned().unwrap_or_default(), &b.node_attrs(n).cloned().unwrap_or_default());
        if q.has_node(id) {
            q.add_node_attrs(id, attrs);
        } else {
            q.add_node(id.clone(), attrs);
        }
        iota_b.insert(n.clone(), id.clone());
    }
    for n in c.nodes() {
        let id = &class_of_c[n];
        let attrs = attributes::union(&q.node_attrs(id).cloned().unwrap_or_default(), &c.node_attrs(n).cloned().unwrap_or_default());
        if q.has_node(id) {
            q.add_node_attrs(id, attrs);
        } else {
            q.add_node(id.clone(), attrs);
        }
        iota_c.insert(n.clone(), id.clone());
    }

    for (s, t) in b.edges() {
        let (qs, qt) = (class_of_b[s].clone(), class_of_b[t].clone());
        let attrs = b.edge_attrs(s, t).cloned().unwrap_or_default();
        if q.has_edge(&qs, &qt) {
            q.add_edge_attrs(&qs, &qt, attrs);
        } else {
            q.add_edge(qs, qt, attrs);
        }
    }
    for (s, t) in c.edges() {
        let (qs, qt) = (class_of_c[s].clone(), class_of_c[t].clone());
        let attrs = c.edge_attrs(s, t).cloned().unwrap_or_default();
        if q.has_edge(&qs, &qt) {
            q.add_edge_attrs(&qs, &qt, attrs);
        } else {
            q.add_edge(qs, qt, attrs);
        }
    }

    trace!(nodes = q.len_nodes(), "computed pushout");
    (q, iota_b, iota_c)
}

/// Factor `h: a -> b` through its image: `(i, e, m)` with `e: a -> i`
/// surjective, `m: i -> b` injective, `m . e == h`.
pub fn image_factorization(a: &dyn AttributedGraph, b: &dyn AttributedGraph, h: &Mapping) -> (Graph, Mapping, Mapping) {
    let mut i = Graph::new();
    let mut e = Mapping::new();
    let mut m = Mapping::new();

    let image_nodes: BTreeSet<NodeId> = h.values().cloned().collect();
    for img in &image_nodes {
        i.add_node(img.clone(), b.node_attrs(img).cloned().unwrap_or_default());
        m.insert(img.clone(), img.clone());
    }
    for (n, img) in h {
        e.insert(n.clone(), img.clone());
    }
    for s in &image_nodes {
        for t in &image_nodes {
            if b.has_edge(s, t) {
                i.add_edge(s.clone(), t.clone(), b.edge_attrs(s, t).cloned().unwrap_or_default());
            }
        }
    }

    trace!(nodes = i.len_nodes(), "computed image factorization");
    (i, e, m)
}

/// Build the span `a <--pi_a-- c --pi_b--> b` for a relation `rel: a -> P(b)`.
///
/// `C`'s nodes are the pairs `(a, b) in rel`. When `edge_closure` is set, an
/// edge `(a1,b1) -> (a2,b2)` is added to `C` whenever both `a`-edge and
/// `b`-edge exist; when `attr_closure` is set, node/edge attributes on `C`
/// are the intersection of the two endpoints' attributes (mirroring
/// pullback's attribute policy, since a relation behaves like an
/// externally-supplied span rather than a computed one).
pub fn relation_to_span(
    a: &dyn AttributedGraph,
    b: &dyn AttributedGraph,
    rel: &std::collections::BTreeMap<NodeId, BTreeSet<NodeId>>,
    edge_closure: bool,
    attr_closure: bool,
) -> (Graph, Mapping, Mapping) {
    let mut c = Graph::new();
    let mut pi_a = Mapping::new();
    let mut pi_b = Mapping::new();
    let mut pair_of: Vec<(NodeId, NodeId, NodeId)> = Vec::new();

    for (a_node, b_nodes) in rel {
        for b_node in b_nodes {
            let id = fresh_id(&c, &format!("{}_{}", a_node, b_node));
            let attrs = if attr_closure {
                attributes::intersection(
                    &a.node_attrs(a_node).cloned().unwrap_or_default(),
                    &b.node_attrs(b_node).cloned().unwrap_or_default(),
                )
            } else {
                Attributes::new()
            };
            c.add_node(id.clone(), attrs);
            pi_a.insert(id.clone(), a_node.clone());
            pi_b.insert(id.clone(), b_node.clone());
            pair_of.push((id, a_node.clone(), b_node.clone()));
        }
    }

    if edge_closure {
        for (id1, a1, b1) in &pair_of {
            for (id2, a2, b2) in &pair_of {
                if a.has_edge(a1, a2) && b.has_edge(b1, b2) {
                    let attrs = if attr_closure {
                        attributes::intersection(
                            &a.edge_attrs(a1, a2).cloned().unwrap_or_default(),
                            &b.edge_attrs(b1, b2).cloned().unwrap_or_default(),
                        )
                    } else {
                        Attributes::new()
                    };
                    c.add_edge(id1.clone(), id2.clone(), attrs);
                }
            }
        }
    }

    (c, pi_a, pi_b)
}

/// The unique mediating map `z -> p` for a cocone `(z, z_to_a, z_to_b)` onto
/// the pullback `(p_nodes, p_to_a, p_to_b)` (universal property of §4.1,
/// tested directly by property 6 of §8).
pub fn unique_map_to_pullback(
    p_nodes: &BTreeSet<NodeId>,
    p_to_a: &Mapping,
    p_to_b: &Mapping,
    z_to_a: &Mapping,
    z_to_b: &Mapping,
) -> Mapping {
    let mut out = Mapping::new();
    for (z, a_img) in z_to_a {
        let b_img = match z_to_b.get(z) {
            Some(b) => b,
            None => continue,
        };
        if let Some(p) = p_nodes
            .iter()
            .find(|p| p_to_a.get(*p) == Some(a_img) && p_to_b.get(*p) == Some(b_img))
        {
            out.insert(z.clone(), p.clone());
        }
    }
    out
}

/// The unique mediating map `q -> x` out of the pushout `(q_nodes, b_to_q,
/// c_to_q)` for a cocone `(x, b_to_x, c_to_x)`.
///
/// When a `q`-node has a preimage on both legs, the `c` leg is preferred:
/// in forward propagation (propagation.rs) the `c` leg routes through the
/// freshly-rewritten origin graph and is always current, while the `b` leg
/// may carry pre-rewrite ids that a local merge has already retired.
pub fn unique_map_from_pushout(
    q_nodes: &BTreeSet<NodeId>,
    b_to_q: &Mapping,
    c_to_q: &Mapping,
    b_to_x: &Mapping,
    c_to_x: &Mapping,
) -> Mapping {
    let mut out = Mapping::new();
    for q in q_nodes {
        if let Some(c) = c_to_q.iter().find(|(_, v)| *v == q).map(|(k, _)| k) {
            if let Some(x) = c_to_x.get(c) {
                out.insert(q.clone(), x.clone());
                continue;
            }
        }
        if let Some(b) = b_to_q.iter().find(|(_, v)| *v == q).map(|(k, _)| k) {
            if let Some(x) = b_to_x.get(b) {
                out.insert(q.clone(), x.clone());
            }
        }
    }
    out
}

pub use mapping::{compose, is_mono};

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::{btreemap, btreeset};

    fn graph_with(nodes: &[&str]) -> Graph {
        let mut g = Graph::new();
        for n in nodes {
            g.add_node((*n).into(), Default::default());
        }
        g
    }

    #[test]
    fn pullback_pairs_nodes_with_equal_images() {
        let a = graph_with(&["a1", "a2"]);
        let b = graph_with(&["b1", "b2"]);
        let f = btreemap! {"a1".to_string() => "c".to_string(), "a2".to_string() => "c".to_string()};
        let g = btreemap! {"b1".to_string() => "c".to_string()};
        let (p, pi_a, pi_b) = pullback(&a, &b, &f, &g);
        assert_eq!(p.len_nodes(), 2);
        for n in p.nodes() {
            assert!(pi_a.contains_key(n));
            assert!(pi_b.contains_key(n));
        }
    }

    #[test]
    fn pushout_glues_along_common_domain() {
        let a = graph_with(&["a1"]);
        let b = graph_with(&["b1", "b2"]);
        let c = graph_with(&["c1"]);
        let f = btreemap! {"a1".to_string() => "b1".to_string()};
        let g = btreemap! {"a1".to_string() => "c1".to_string()};
        let (q, iota_b, iota_c) = pushout(&a, &b, &c, &f, &g);
        assert_eq!(iota_b["b1"], iota_c["c1"]);
        assert_eq!(q.len_nodes(), 2); // {b1~c1, b2}
        assert_ne!(iota_b["b1"], iota_b["b2"]);
    }

    #[test]
    fn unique_map_to_pullback_is_unique_mediator() {
        let a = graph_with(&["a1", "a2"]);
        let b = graph_with(&["b1"]);
        let f = btreemap! {"a1".to_string() => "c".to_string(), "a2".to_string() => "c".to_string()};
        let g = btreemap! {"b1".to_string() => "c".to_string()};
        let (p, pi_a, pi_b) = pullback(&a, &b, &f, &g);
        let p_nodes: BTreeSet<_> = p.nodes().cloned().collect();

        let z_to_a = btreemap! {"z1".to_string() => "a1".to_string()};
        let z_to_b = btreemap! {"z1".to_string() => "b1".to_string()};
        let mediator = unique_map_to_pullback(&p_nodes, &pi_a, &pi_b, &z_to_a, &z_to_b);
        let target = mediator["z1"].clone();
        assert_eq!(pi_a[&target], "a1");
        assert_eq!(pi_b[&target], "b1");
    }

    #[test]
    fn image_factorization_collapses_non_injective_map() {
        let a = graph_with(&["a1", "a2"]);
        let b = graph_with(&["b1", "b2"]);
        let h = btreemap! {"a1".to_string() => "b1".to_string(), "a2".to_string() => "b1".to_string()};
        let (i, e, m) = image_factorization(&a, &b, &h);
        assert_eq!(i.len_nodes(), 1);
        assert_eq!(e["a1"], e["a2"]);
        assert_eq!(m[&e["a1"]], "b1");
    }

    #[test]
    fn relation_to_span_builds_pair_nodes() {
        let a = graph_with(&["a1"]);
        let b = graph_with(&["b1", "b2"]);
        let rel = btreemap! {"a1".to_string() => btreeset!["b1".to_string(), "b2".to_string()]};
        let (c, pi_a, pi_b) = relation_to_span(&a, &b, &rel, false, false);
        assert_eq!(c.len_nodes(), 2);
        assert!(pi_a.values().all(|v| v == "a1"));
        assert_eq!(pi_b.values().cloned().collect::<BTreeSet<_>>(), btreeset!["b1".to_string(), "b2".to_string()]);
    }
}
