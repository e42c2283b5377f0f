//! Partial maps between node sets (C3's raw material) and the homomorphism
//! checks the rest of the crate builds on.

use std::collections::{BTreeMap, BTreeSet};

use crate::attributes;
use crate::error::InvalidHomomorphism;
use crate::graph::AttributedGraph;
use crate::ids::{GraphId, NodeId};

/// A finite partial map `f: A -> B` between node sets, keyed by source id.
pub type Mapping = BTreeMap<NodeId, NodeId>;

/// True iff every node in `domain` has an entry in `map`.
pub fn is_total(map: &Mapping, domain: &BTreeSet<NodeId>) -> bool {
    domain.iter().all(|n| map.contains_key(n))
}

/// True iff `map` is injective (no two sources share an image).
pub fn is_mono(map: &Mapping) -> bool {
    let mut seen = BTreeSet::new();
    map.values().all(|v| seen.insert(v.clone()))
}

/// Sequential composition: `(g . f)(x) = g(f(x))`, restricted to the
/// domain of `f` (entries whose image is missing from `g` are dropped).
pub fn compose(f: &Mapping, g: &Mapping) -> Mapping {
    f.iter()
        .filter_map(|(x, y)| g.get(y).map(|z| (x.clone(), z.clone())))
        .collect()
}

/// Identity map on `nodes`.
pub fn identity(nodes: &BTreeSet<NodeId>) -> Mapping {
    nodes.iter().map(|n| (n.clone(), n.clone())).collect()
}

/// All sources of `map` whose image is `val` (the preimage of a singleton).
pub fn preimage(map: &Mapping, val: &str) -> Vec<NodeId> {
    map.iter()
        .filter(|(_, v)| v.as_str() == val)
        .map(|(k, _)| k.clone())
        .collect()
}

/// Check that `map: source -> target` is a total homomorphism, i.e. it
/// preserves edges and attribute-`subseteq` on both nodes and edges.
/// When `total` is false, the domain may be a strict subset of `source`'s
/// nodes (used while validating partial control relations).
pub fn check_homomorphism(
    source_id: &GraphId,
    target_id: &GraphId,
    source: &dyn AttributedGraph,
    target: &dyn AttributedGraph,
    map: &Mapping,
    total: bool,
) -> Result<(), InvalidHomomorphism> {
    if total {
        for n in source.nodes() {
            if !map.contains_key(n) {
                return Err(InvalidHomomorphism::NotTotal(
                    source_id.clone(),
                    target_id.clone(),
                    n.clone(),
                ));
            }
        }
    }

    for (s, t) in source.edges() {
        let (s_img, t_img) = match (map.get(s), map.get(t)) {
            (Some(a), Some(b)) => (a, b),
            _ => continue, // partial map: edge outside the checked domain.
        };
        if !target.has_edge(s_img, t_img) {
            return Err(InvalidHomomorphism::EdgeNotPreserved(
                source_id.clone(),
                target_id.clone(),
                s.clone(),
                t.clone(),
            ));
        }
        let s_attrs = source.edge_attrs(s, t).cloned().unwrap_or_default();
        let t_attrs = target.edge_attrs(s_img, t_img).cloned().unwrap_or_default();
        if !attributes::is_subset(&s_attrs, &t_attrs) {
            return Err(InvalidHomomorphism::EdgeAttrsNotPreserved(
                source_id.clone(),
                target_id.clone(),
                s.clone(),
                t.clone(),
            ));
        }
    }

    for (n, img) in map {
        let n_attrs = source.node_attrs(n).cloned().unwrap_or_default();
        let img_attrs = target.node_attrs(img).cloned().unwrap_or_default();
        if !attributes::is_subset(&n_attrs, &img_attrs) {
            return Err(InvalidHomomorphism::NodeAttrsNotPreserved(
                source_id.clone(),
                target_id.clone(),
                n.clone(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use maplit::btreemap;

    #[test]
    fn compose_drops_entries_missing_from_g() {
        let f = btreemap! {"a".to_string() => "b".to_string()};
        let g = btreemap! {"x".to_string() => "y".to_string()};
        assert!(compose(&f, &g).is_empty());

        let g2 = btreemap! {"b".to_string() => "c".to_string()};
        assert_eq!(compose(&f, &g2), btreemap! {"a".to_string() => "c".to_string()});
    }

    #[test]
    fn is_mono_detects_collision() {
        let m = btreemap! {"a".to_string() => "x".to_string(), "b".to_string() => "x".to_string()};
        assert!(!is_mono(&m));
    }

    #[test]
    fn check_homomorphism_rejects_missing_edge_image() {
        let mut a = Graph::new();
        a.add_node("a".into(), Default::default());
        a.add_node("b".into(), Default::default());
        a.add_edge("a".into(), "b".into(), Default::default());

        let mut t = Graph::new();
        t.add_node("x".into(), Default::default());
        t.add_node("y".into(), Default::default());

        let map = btreemap! {"a".to_string() => "x".to_string(), "b".to_string() => "y".to_string()};
        let err = check_homomorphism(&"A".to_string(), &"T".to_string(), &a, &t, &map, true).unwrap_err();
        assert!(matches!(err, InvalidHomomorphism::EdgeNotPreserved(..)));
    }
}
