//! The attributed directed graph (C1) and the `AttributedGraph` capability
//! trait the rest of the crate is written against.
//!
//! Per design note §9 ("Polymorphic storage backends"), the DAG bookkeeping,
//! kernel and propagation code talk to graphs only through `AttributedGraph`.
//! `Graph` is the one in-memory implementation this crate ships, stored as
//! an id-keyed arena (`BTreeMap`) with adjacency indices so clone/merge stay
//! O(degree) rather than rescanning the whole edge set.

use std::collections::{BTreeMap, BTreeSet};

use crate::attributes::{self, Attributes};
use crate::ids::NodeId;

/// The capability set a hierarchy needs from its graph backend.
///
/// Mirrors design note §9: "find_matching, add/remove node, add/remove
/// edge, clone, merge, attribute ops".
pub trait AttributedGraph {
    fn nodes(&self) -> Box<dyn Iterator<Item = &NodeId> + '_>;
    fn edges(&self) -> Box<dyn Iterator<Item = (&NodeId, &NodeId)> + '_>;
    fn has_node(&self, n: &str) -> bool;
    fn has_edge(&self, s: &str, t: &str) -> bool;
    fn node_attrs(&self, n: &str) -> Option<&Attributes>;
    fn edge_attrs(&self, s: &str, t: &str) -> Option<&Attributes>;
    fn successors(&self, n: &str) -> BTreeSet<NodeId>;
    fn predecessors(&self, n: &str) -> BTreeSet<NodeId>;

    fn add_node(&mut self, id: NodeId, attrs: Attributes);
    fn remove_node(&mut self, id: &str);
    fn add_edge(&mut self, s: NodeId, t: NodeId, attrs: Attributes);
    fn remove_edge(&mut self, s: &str, t: &str);
    fn add_node_attrs(&mut self, id: &str, attrs: Attributes);
    fn remove_node_attrs(&mut self, id: &str, attrs: &Attributes);
    fn add_edge_attrs(&mut self, s: &str, t: &str, attrs: Attributes);
    fn remove_edge_attrs(&mut self, s: &str, t: &str, attrs: &Attributes);

    /// Produce a fresh node carrying the same attributes and edges as `id`.
    fn clone_node(&mut self, id: &str, new_id: NodeId);
    /// Union a non-empty set of nodes into a single node named `new_id`.
    fn merge_nodes(&mut self, ids: &[NodeId], new_id: NodeId);
    /// A fresh, currently-unused node id derived from `prefix`.
    fn generate_node_id(&self, prefix: &str) -> NodeId;

    /// Every node matching `pattern` under the trivial identity-name match;
    /// exposed for `Hierarchy::find_matching`.
    fn find_matching(&self, pattern: &dyn Fn(&NodeId, &Attributes) -> bool) -> BTreeSet<NodeId>;
}

/// The one in-memory `AttributedGraph` implementation this crate ships.
///
/// Not `#[derive(Serialize)]`: a `(NodeId, NodeId)`-keyed edge map has no
/// direct JSON object representation, so `json.rs` converts `Graph` to and
/// from its own explicit wire shape instead of deriving through serde.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Attributes>,
    edges: BTreeMap<(NodeId, NodeId), Attributes>,
    successors: BTreeMap<NodeId, BTreeSet<NodeId>>,
    predecessors: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn from_data<N, E>(nodes: N, edges: E) -> Self
    where
        N: IntoIterator<Item = (NodeId, Attributes)>,
        E: IntoIterator<Item = (NodeId, NodeId, Attributes)>,
    {
        let mut g = Graph::new();
        for (id, attrs) in nodes {
            g.add_node(id, attrs);
        }
        for (s, t, attrs) in edges {
            g.add_edge(s, t, attrs);
        }
        g
    }

    pub fn node_set(&self) -> BTreeSet<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn len_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Re-derive the adjacency indices from `edges`. Needed after
    /// deserialization, since the indices are not stored on the wire.
    pub fn reindex(&mut self) {
        self.successors.clear();
        self.predecessors.clear();
        for (s, t) in self.edges.keys() {
            self.successors.entry(s.clone()).or_default().insert(t.clone());
            self.predecessors.entry(t.clone()).or_default().insert(s.clone());
        }
        for n in self.nodes.keys() {
            self.successors.entry(n.clone()).or_default();
            self.predecessors.entry(n.clone()).or_default();
        }
    }
}

impl AttributedGraph for Graph {
    fn nodes(&self) -> Box<dyn Iterator<Item = &NodeId> + '_> {
        Box::new(self.nodes.keys())
    }

    fn edges(&self) -> Box<dyn Iterator<Item = (&NodeId, &NodeId)> + '_> {
        Box::new(self.edges.keys().map(|(s, t)| (s, t)))
    }

    fn has_node(&self, n: &str) -> bool {
        self.nodes.contains_key(n)
    }

    fn has_edge(&self, s: &str, t: &str) -> bool {
        self.edges.contains_key(&(s.to_string(), t.to_string()))
    }

    fn node_attrs(&self, n: &str) -> Option<&Attributes> {
        self.nodes.get(n)
    }

    fn edge_attrs(&self, s: &str, t: &str) -> Option<&Attributes> {
        self.edges.get(&(s.to_string(), t.to_string()))
    }

    fn successors(&self, n: &str) -> BTreeSet<NodeId> {
        self.successors.get(n).cloned().unwrap_or_default()
    }

    fn predecessors(&self, n: &str) -> BTreeSet<NodeId> {
        self.predecessors.get(n).cloned().unwrap_or_default()
    }

    fn add_node(&mut self, id: NodeId, attrs: Attributes) {
        self.successors.entry(id.clone()).or_default();
        self.predecessors.entry(id.clone()).or_default();
        self.nodes.insert(id, attrs);
    }

    fn remove_node(&mut self, id: &str) {
        self.nodes.remove(id);
        let succs = self.successors.remove(id).unwrap_or_default();
        let preds = self.predecessors.remove(id).unwrap_or_default();
        for t in &succs {
            self.edges.remove(&(id.to_string(), t.clone()));
            if let Some(p) = self.predecessors.get_mut(t) {
                p.remove(id);
            }
        }
        for s in &preds {
            self.edges.remove(&(s.clone(), id.to_string()));
            if let Some(s_succ) = self.successors.get_mut(s) {
                s_succ.remove(id);
            }
        }
    }

    fn add_edge(&mut self, s: NodeId, t: NodeId, attrs: Attributes) {
        self.successors.entry(s.clone()).or_default().insert(t.clone());
        self.predecessors.entry(t.clone()).or_default().insert(s.clone());
        self.edges.insert((s, t), attrs);
    }

    fn remove_edge(&mut self, s: &str, t: &str) {
        self.edges.remove(&(s.to_string(), t.to_string()));
        if let Some(succ) = self.successors.get_mut(s) {
            succ.remove(t);
        }
        if let Some(pred) = self.predecessors.get_mut(t) {
            pred.remove(s);
        }
    }

    fn add_node_attrs(&mut self, id: &str, attrs: Attributes) {
        if let Some(existing) = self.nodes.get_mut(id) {
            *existing = attributes::union(existing, &attrs);
        }
    }

    fn remove_node_attrs(&mut self, id: &str, attrs: &Attributes) {
        if let Some(existing) = self.nodes.get_mut(id) {
            attributes::remove(existing, attrs);
        }
    }

    fn add_edge_attrs(&mut self, s: &str, t: &str, attrs: Attributes) {
        if let Some(existing) = self.edges.get_mut(&(s.to_string(), t.to_string())) {
            *existing = attributes::union(existing, &attrs);
        }
    }

    fn remove_edge_attrs(&mut self, s: &str, t: &str, attrs: &Attributes) {
        if let Some(existing) = self.edges.get_mut(&(s.to_string(), t.to_string())) {
            attributes::remove(existing, attrs);
        }
    }

    fn clone_node(&mut self, id: &str, new_id: NodeId) {
        let attrs = self.nodes.get(id).cloned().unwrap_or_default();
        let out_edges: Vec<_> = self
            .successors(id)
            .into_iter()
            .map(|t| (t.clone(), self.edge_attrs(id, &t).cloned().unwrap_or_default()))
            .collect();
        let in_edges: Vec<_> = self
            .predecessors(id)
            .into_iter()
            .map(|s| (s.clone(), self.edge_attrs(&s, id).cloned().unwrap_or_default()))
            .collect();
        self.add_node(new_id.clone(), attrs);
        for (t, a) in out_edges {
            self.add_edge(new_id.clone(), t, a);
        }
        for (s, a) in in_edges {
            self.add_edge(s, new_id.clone(), a);
        }
    }

    fn merge_nodes(&mut self, ids: &[NodeId], new_id: NodeId) {
        assert!(!ids.is_empty(), "merge_nodes requires a non-empty node set");
        let mut merged_attrs = Attributes::new();
        let mut out: BTreeMap<NodeId, Attributes> = BTreeMap::new();
        let mut inn: BTreeMap<NodeId, Attributes> = BTreeMap::new();
        let id_set: BTreeSet<NodeId> = ids.iter().cloned().collect();

        for id in ids {
            if let Some(a) = self.nodes.get(id) {
                merged_attrs = attributes::union(&merged_attrs, a);
            }
            for t in self.successors(id) {
                if id_set.contains(&t) && t != *id {
                    continue; // internal edge among merged nodes, dropped.
                }
                let a = self.edge_attrs(id, &t).cloned().unwrap_or_default();
                let entry = out.entry(t).or_default();
                *entry = attributes::union(entry, &a);
            }
            for s in self.predecessors(id) {
                if id_set.contains(&s) {
                    continue;
                }
                let a = self.edge_attrs(&s, id).cloned().unwrap_or_default();
                let entry = inn.entry(s).or_default();
                *entry = attributes::union(entry, &a);
            }
        }

        for id in ids {
            self.remove_node(id);
        }
        self.add_node(new_id.clone(), merged_attrs);
        for (t, a) in out {
            if self.has_node(&t) {
                self.add_edge(new_id.clone(), t, a);
            }
        }
        for (s, a) in inn {
            if self.has_node(&s) {
                self.add_edge(s, new_id.clone(), a);
            }
        }
    }

    fn generate_node_id(&self, prefix: &str) -> NodeId {
        if !self.has_node(prefix) {
            return prefix.to_string();
        }
        let mut i = 0u64;
        loop {
            let candidate = format!("{}{}", prefix, i);
            if !self.has_node(&candidate) {
                return candidate;
            }
            i += 1;
        }
    }

    fn find_matching(&self, pattern: &dyn Fn(&NodeId, &Attributes) -> bool) -> BTreeSet<NodeId> {
        self.nodes
            .iter()
            .filter(|(id, attrs)| pattern(id, attrs))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreeset;

    fn node(id: &str) -> (NodeId, Attributes) {
        (id.to_string(), Attributes::new())
    }

    #[test]
    fn clone_node_duplicates_attrs_and_edges() {
        let mut g = Graph::new();
        g.add_node("a".into(), Attributes::new());
        g.add_node("b".into(), Attributes::new());
        g.add_edge("a".into(), "b".into(), Attributes::new());

        g.clone_node("a", "a2".into());
        assert!(g.has_node("a2"));
        assert!(g.has_edge("a2", "b"));
        assert!(g.has_edge("a", "b"));
    }

    #[test]
    fn merge_nodes_unions_edges_and_drops_internal_edge() {
        let mut g = Graph::new();
        g.add_node("a".into(), Attributes::new());
        g.add_node("b".into(), Attributes::new());
        g.add_node("c".into(), Attributes::new());
        g.add_edge("a".into(), "c".into(), Attributes::new());
        g.add_edge("a".into(), "b".into(), Attributes::new());

        g.merge_nodes(&["a".to_string(), "b".to_string()], "ab".into());
        assert!(!g.has_node("a"));
        assert!(!g.has_node("b"));
        assert!(g.has_node("ab"));
        assert!(g.has_edge("ab", "c"));
        assert!(!g.has_edge("ab", "ab"));
    }

    #[test]
    fn generate_node_id_breaks_ties_with_smallest_integer() {
        let mut g = Graph::new();
        g.add_node(node("a").0, Attributes::new());
        assert_eq!(g.generate_node_id("a"), "a0");
        g.add_node("a0".into(), Attributes::new());
        assert_eq!(g.generate_node_id("a"), "a1");
        assert_eq!(g.generate_node_id("b"), "b");
    }

    #[test]
    fn remove_node_removes_incident_edges() {
        let mut g = Graph::new();
        g.add_node("a".into(), Attributes::new());
        g.add_node("b".into(), Attributes::new());
        g.add_edge("a".into(), "b".into(), Attributes::new());
        g.remove_node("a");
        assert!(!g.has_edge("a", "b"));
        assert_eq!(g.successors("b"), btreeset![]);
    }
}
