//! The rewrite rule (C2): a span `L <- P -> R` plus the classifications
//! derived from its two legs.

use std::collections::BTreeSet;

use crate::graph::{AttributedGraph, Graph};
use crate::ids::NodeId;
use crate::mapping::{self, Mapping};

/// A span `L <- P -> R` encoding one SqPO rewrite.
#[derive(Clone, Debug, Default)]
pub struct Rule {
    pub lhs: Graph,
    pub p: Graph,
    pub rhs: Graph,
    /// `p_lhs: P -> L`
    pub p_lhs: Mapping,
    /// `p_rhs: P -> R`
    pub p_rhs: Mapping,
}

impl Rule {
    /// The identity rule on a graph: `L = P = R = g`, both legs the identity.
    pub fn identity(g: Graph) -> Self {
        let nodes = g.node_set();
        let id = mapping::identity(&nodes);
        Rule {
            lhs: g.clone(),
            p: g.clone(),
            rhs: g,
            p_lhs: id.clone(),
            p_rhs: id,
        }
    }

    /// L-nodes with >= 2 preimages under `p_lhs`.
    pub fn cloned_nodes(&self) -> Vec<(NodeId, Vec<NodeId>)> {
        self.lhs
            .nodes()
            .filter_map(|l| {
                let preimage = mapping::preimage(&self.p_lhs, l);
                if preimage.len() >= 2 {
                    Some((l.clone(), preimage))
                } else {
                    None
                }
            })
            .collect()
    }

    /// L-nodes with no preimage under `p_lhs`.
    pub fn removed_nodes(&self) -> BTreeSet<NodeId> {
        let covered: BTreeSet<_> = self.p_lhs.values().cloned().collect();
        self.lhs.nodes().filter(|n| !covered.contains(*n)).cloned().collect()
    }

    /// L-edges with no preimage under `p_lhs` (source and target both
    /// covered by P but the edge itself isn't reached through it).
    pub fn removed_edges(&self) -> Vec<(NodeId, NodeId)> {
        let removed = self.removed_nodes();
        self.lhs
            .edges()
            .filter(|&(s, t)| {
                if removed.contains(s) || removed.contains(t) {
                    return false; // already covered by node removal.
                }
                !self.p.edges().any(|(ps, pt)| {
                    self.p_lhs.get(ps).map(String::as_str) == Some(s.as_str())
                        && self.p_lhs.get(pt).map(String::as_str) == Some(t.as_str())
                })
            })
            .map(|(s, t)| (s.clone(), t.clone()))
            .collect()
    }

    /// R-nodes with >= 2 preimages under `p_rhs`.
    pub fn merged_nodes(&self) -> Vec<(NodeId, Vec<NodeId>)> {
        self.rhs
            .nodes()
            .filter_map(|r| {
                let preimage = mapping::preimage(&self.p_rhs, r);
                if preimage.len() >= 2 {
                    Some((r.clone(), preimage))
                } else {
                    None
                }
            })
            .collect()
    }

    /// R-nodes with no preimage under `p_rhs`.
    pub fn added_nodes(&self) -> BTreeSet<NodeId> {
        let covered: BTreeSet<_> = self.p_rhs.values().cloned().collect();
        self.rhs.nodes().filter(|n| !covered.contains(*n)).cloned().collect()
    }

    /// R-edges with no preimage under `p_rhs`.
    pub fn added_edges(&self) -> Vec<(NodeId, NodeId)> {
        self.rhs
            .edges()
            .filter(|&(s, t)| {
                !self.p.edges().any(|(ps, pt)| {
                    self.p_rhs.get(ps).map(String::as_str) == Some(s.as_str())
                        && self.p_rhs.get(pt).map(String::as_str) == Some(t.as_str())
                })
            })
            .map(|(s, t)| (s.clone(), t.clone()))
            .collect()
    }

    /// For each P-node, attribute values present on its L-image but dropped
    /// from the P-node itself (i.e. attrs the rule strips on application).
    pub fn removed_node_attrs(&self) -> Vec<(NodeId, crate::attributes::Attributes)> {
        self.p
            .nodes()
            .filter_map(|p| {
                let l = self.p_lhs.get(p)?;
                let l_attrs = self.lhs.node_attrs(l).cloned().unwrap_or_default();
                let p_attrs = self.p.node_attrs(p).cloned().unwrap_or_default();
                let mut removed = l_attrs;
                crate::attributes::remove(&mut removed, &p_attrs);
                if removed.is_empty() {
                    None
                } else {
                    Some((l.clone(), removed))
                }
            })
            .collect()
    }

    /// For each P-node, attribute values present on its R-image but absent
    /// from the P-node (attrs the rule adds on application).
    pub fn added_node_attrs(&self) -> Vec<(NodeId, crate::attributes::Attributes)> {
        self.p
            .nodes()
            .filter_map(|p| {
                let r = self.p_rhs.get(p)?;
                let r_attrs = self.rhs.node_attrs(r).cloned().unwrap_or_default();
                let p_attrs = self.p.node_attrs(p).cloned().unwrap_or_default();
                let mut added = r_attrs;
                crate::attributes::remove(&mut added, &p_attrs);
                if added.is_empty() {
                    None
                } else {
                    Some((r.clone(), added))
                }
            })
            .collect()
    }

    pub fn is_restrictive(&self) -> bool {
        !self.cloned_nodes().is_empty() || !self.removed_nodes().is_empty() || !self.removed_edges().is_empty()
    }

    pub fn is_relaxing(&self) -> bool {
        !self.merged_nodes().is_empty() || !self.added_nodes().is_empty() || !self.added_edges().is_empty()
    }

    /// True iff the rule changes nothing (L = P = R under the identity span).
    pub fn is_empty(&self) -> bool {
        !self.is_restrictive() && !self.is_relaxing()
    }

    /// P-nodes grouped by their L-image, in P-node order. A group of size
    /// >= 2 is a clone, size 1 a pass-through, size 0 (absent) a removal.
    pub fn p_groups_by_lhs(&self) -> std::collections::BTreeMap<NodeId, Vec<NodeId>> {
        let mut groups: std::collections::BTreeMap<NodeId, Vec<NodeId>> = std::collections::BTreeMap::new();
        for p in self.p.nodes() {
            if let Some(l) = self.p_lhs.get(p) {
                groups.entry(l.clone()).or_default().push(p.clone());
            }
        }
        groups
    }

    /// P-nodes grouped by their R-image. A group of size >= 2 is a merge.
    pub fn p_groups_by_rhs(&self) -> std::collections::BTreeMap<NodeId, Vec<NodeId>> {
        let mut groups: std::collections::BTreeMap<NodeId, Vec<NodeId>> = std::collections::BTreeMap::new();
        for p in self.p.nodes() {
            if let Some(r) = self.p_rhs.get(p) {
                groups.entry(r.clone()).or_default().push(p.clone());
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn n(id: &str) -> (NodeId, crate::attributes::Attributes) {
        (id.to_string(), Default::default())
    }

    #[test]
    fn identity_rule_is_empty() {
        let mut g = Graph::new();
        g.add_node(n("a").0, Default::default());
        let rule = Rule::identity(g);
        assert!(rule.is_empty());
    }

    #[test]
    fn clone_classification() {
        let mut lhs = Graph::new();
        lhs.add_node("a".into(), Default::default());
        let mut p = Graph::new();
        p.add_node("p1".into(), Default::default());
        p.add_node("p2".into(), Default::default());
        let rhs = lhs.clone();
        let rule = Rule {
            lhs,
            p,
            rhs,
            p_lhs: btreemap! {"p1".to_string() => "a".to_string(), "p2".to_string() => "a".to_string()},
            p_rhs: btreemap! {"p1".to_string() => "a".to_string(), "p2".to_string() => "a".to_string()},
        };
        assert_eq!(rule.cloned_nodes(), vec![("a".to_string(), vec!["p1".to_string(), "p2".to_string()])]);
        assert!(rule.is_restrictive());
        assert!(!rule.is_relaxing());
    }

    #[test]
    fn merge_classification() {
        let mut rhs = Graph::new();
        rhs.add_node("c".into(), Default::default());
        let mut p = Graph::new();
        p.add_node("p1".into(), Default::default());
        p.add_node("p2".into(), Default::default());
        let lhs = rhs.clone();
        let rule = Rule {
            lhs,
            p,
            rhs,
            p_lhs: btreemap! {"p1".to_string() => "c".to_string(), "p2".to_string() => "c".to_string()},
            p_rhs: btreemap! {"p1".to_string() => "c".to_string(), "p2".to_string() => "c".to_string()},
        };
        assert_eq!(rule.merged_nodes(), vec![("c".to_string(), vec!["p1".to_string(), "p2".to_string()])]);
        assert!(rule.is_relaxing());
    }
}
