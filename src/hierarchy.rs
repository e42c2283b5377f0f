//! The DAG of graphs (C4): storage, structural mutation, and the analysis
//! primitives the rewriting and propagation engines walk.
//!
//! Graphs are nodes of a `daggy::Dag`, typings are its edges -- the same
//! "store the DAG, index by id" shape the teacher crate uses for
//! `ArtifactGraph`/`VersionGraph` (`IdentifiableGraph::emplace`/`get_by_id`).
//! Per design note §9 ("represent 𝒯 as an adjacency map keyed by id"),
//! `daggy::Dag::add_edge` also gives acyclicity (invariant 1) for free via
//! its `WouldCycle` rejection; commutativity (invariant 2) is checked
//! explicitly in `add_typing` since daggy has no notion of it.

use std::collections::{BTreeMap, BTreeSet};

use daggy::{Dag, NodeIndex};
use petgraph::Direction;
use tracing::{debug, instrument};

use crate::attributes::Attributes;
use crate::error::{Error, HierarchyError};
use crate::graph::{AttributedGraph, Graph};
use crate::ids::{GraphId, NodeId};
use crate::mapping::{self, Mapping};

#[derive(Clone, Debug)]
struct TypingEdge {
    mapping: Mapping,
    attrs: Attributes,
}

#[derive(Clone, Debug, Default)]
struct Relation {
    /// Stored once per unordered pair, keyed on the lexicographically
    /// smaller graph id; `rel` maps that graph's nodes to the other's.
    rel: BTreeMap<NodeId, BTreeSet<NodeId>>,
    attrs: Attributes,
}

#[derive(Clone, Default)]
pub struct Hierarchy {
    dag: Dag<GraphId, TypingEdge>,
    index: BTreeMap<GraphId, NodeIndex>,
    graphs: BTreeMap<GraphId, Graph>,
    graph_attrs: BTreeMap<GraphId, Attributes>,
    relations: BTreeMap<(GraphId, GraphId), Relation>,
}

fn relation_key(u: &str, v: &str) -> (GraphId, GraphId) {
    if u <= v {
        (u.to_string(), v.to_string())
    } else {
        (v.to_string(), u.to_string())
    }
}

impl Hierarchy {
    pub fn new() -> Self {
        Hierarchy::default()
    }

    fn idx(&self, id: &str) -> Result<NodeIndex, Error> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| HierarchyError::GraphNotFound(id.to_string()).into())
    }

    // -- Hierarchy management --------------------------------------------

    pub fn graphs(&self) -> impl Iterator<Item = &GraphId> {
        self.graphs.keys()
    }

    pub fn typings(&self) -> Vec<(GraphId, GraphId)> {
        self.dag
            .raw_edges()
            .iter()
            .map(|e| (self.dag[e.source()].clone(), self.dag[e.target()].clone()))
            .collect()
    }

    pub fn relations(&self) -> Vec<(GraphId, GraphId)> {
        self.relations.keys().cloned().collect()
    }

    pub fn successors(&self, id: &str) -> Result<BTreeSet<GraphId>, Error> {
        let idx = self.idx(id)?;
        Ok(self
            .dag
            .graph()
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.dag[n].clone())
            .collect())
    }

    pub fn predecessors(&self, id: &str) -> Result<BTreeSet<GraphId>, Error> {
        let idx = self.idx(id)?;
        Ok(self
            .dag
            .graph()
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| self.dag[n].clone())
            .collect())
    }

    pub fn get_graph(&self, id: &str) -> Result<&Graph, Error> {
        self.graphs
            .get(id)
            .ok_or_else(|| HierarchyError::GraphNotFound(id.to_string()).into())
    }

    fn get_graph_mut(&mut self, id: &str) -> Result<&mut Graph, Error> {
        self.graphs
            .get_mut(id)
            .ok_or_else(|| HierarchyError::GraphNotFound(id.to_string()).into())
    }

    pub fn get_typing(&self, s: &str, t: &str) -> Result<&Mapping, Error> {
        let (si, ti) = (self.idx(s)?, self.idx(t)?);
        self.dag
            .graph()
            .find_edge(si, ti)
            .and_then(|e| self.dag.graph().edge_weight(e))
            .map(|e| &e.mapping)
            .ok_or_else(|| HierarchyError::GraphNotFound(format!("{}->{}", s, t)).into())
    }

    pub fn get_relation(&self, u: &str, v: &str) -> Result<BTreeMap<NodeId, BTreeSet<NodeId>>, Error> {
        let key = relation_key(u, v);
        let rel = self
            .relations
            .get(&key)
            .ok_or_else(|| HierarchyError::GraphNotFound(format!("{{{},{}}}", u, v)))?;
        if u == key.0 {
            Ok(rel.rel.clone())
        } else {
            // derive the symmetric view.
            let mut inverse: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
            for (a, bs) in &rel.rel {
                for b in bs {
                    inverse.entry(b.clone()).or_default().insert(a.clone());
                }
            }
            Ok(inverse)
        }
    }

    pub fn get_graph_attrs(&self, id: &str) -> Result<&Attributes, Error> {
        self.graph_attrs
            .get(id)
            .ok_or_else(|| HierarchyError::GraphNotFound(id.to_string()).into())
    }

    pub fn set_graph_attrs(&mut self, id: &str, attrs: Attributes) -> Result<(), Error> {
        self.idx(id)?;
        self.graph_attrs.insert(id.to_string(), attrs);
        Ok(())
    }

    pub fn get_typing_attrs(&self, s: &str, t: &str) -> Result<&Attributes, Error> {
        let (si, ti) = (self.idx(s)?, self.idx(t)?);
        self.dag
            .graph()
            .find_edge(si, ti)
            .and_then(|e| self.dag.graph().edge_weight(e))
            .map(|e| &e.attrs)
            .ok_or_else(|| HierarchyError::GraphNotFound(format!("{}->{}", s, t)).into())
    }

    pub fn set_typing_attrs(&mut self, s: &str, t: &str, attrs: Attributes) -> Result<(), Error> {
        let (si, ti) = (self.idx(s)?, self.idx(t)?);
        let e = self
            .dag
            .graph()
            .find_edge(si, ti)
            .ok_or_else(|| HierarchyError::GraphNotFound(format!("{}->{}", s, t)))?;
        self.dag[e].attrs = attrs;
        Ok(())
    }

    pub fn get_relation_attrs(&self, u: &str, v: &str) -> Result<&Attributes, Error> {
        let key = relation_key(u, v);
        self.relations
            .get(&key)
            .map(|r| &r.attrs)
            .ok_or_else(|| HierarchyError::GraphNotFound(format!("{{{},{}}}", u, v)).into())
    }

    pub fn set_relation_attrs(&mut self, u: &str, v: &str, attrs: Attributes) -> Result<(), Error> {
        let key = relation_key(u, v);
        let rel = self
            .relations
            .get_mut(&key)
            .ok_or_else(|| HierarchyError::GraphNotFound(format!("{{{},{}}}", u, v)))?;
        rel.attrs = attrs;
        Ok(())
    }

    // -- Structural mutation ----------------------------------------------

    pub fn add_empty_graph(&mut self, id: GraphId, attrs: Attributes) -> Result<(), Error> {
        self.add_graph(id, Graph::new(), attrs)
    }

    pub fn add_graph_from_data<N, E>(
        &mut self,
        id: GraphId,
        nodes: N,
        edges: E,
        attrs: Attributes,
    ) -> Result<(), Error>
    where
        N: IntoIterator<Item = (NodeId, Attributes)>,
        E: IntoIterator<Item = (NodeId, NodeId, Attributes)>,
    {
        self.add_graph(id, Graph::from_data(nodes, edges), attrs)
    }

    pub fn add_graph(&mut self, id: GraphId, graph: Graph, attrs: Attributes) -> Result<(), Error> {
        if self.index.contains_key(&id) {
            return Err(HierarchyError::DuplicateGraph(id).into());
        }
        let idx = self.dag.add_node(id.clone());
        self.index.insert(id.clone(), idx);
        self.graphs.insert(id.clone(), graph);
        self.graph_attrs.insert(id, attrs);
        Ok(())
    }

    #[instrument(skip(self, mapping, attrs))]
    pub fn add_typing(&mut self, s: &str, t: &str, mapping: Mapping, attrs: Attributes) -> Result<(), Error> {
        let (si, ti) = (self.idx(s)?, self.idx(t)?);
        if self.dag.graph().find_edge(si, ti).is_some() {
            return Err(HierarchyError::DuplicateTyping(s.to_string(), t.to_string()).into());
        }

        mapping::check_homomorphism(
            &s.to_string(),
            &t.to_string(),
            self.get_graph(s)?,
            self.get_graph(t)?,
            &mapping,
            true,
        )?;

        // Commutativity (§4.2 edge-addition algorithm, step 3): for every
        // graph x with a path s->x and x->t, the composed path must agree
        // with `mapping` on V(s). Symmetric check for alternate s->t paths.
        for x in self.graphs().cloned().collect::<Vec<_>>() {
            if x == s || x == t {
                continue;
            }
            if let (Some(p1), Some(p2)) = (self.shortest_path(s, &x), self.shortest_path(&x, t)) {
                let via_x = mapping::compose(
                    &self.compose_path_typing(&p1)?,
                    &self.compose_path_typing(&p2)?,
                );
                if !maps_agree(&via_x, &mapping) {
                    return Err(HierarchyError::NonCommuting(s.to_string(), t.to_string()).into());
                }
            }
        }
        for p in self.all_paths(s, t) {
            let composed = self.compose_path_typing(&p)?;
            if !maps_agree(&composed, &mapping) {
                return Err(HierarchyError::NonCommuting(s.to_string(), t.to_string()).into());
            }
        }

        self.dag
            .add_edge(si, ti, TypingEdge { mapping, attrs })
            .map_err(|_| HierarchyError::CycleIntroduced(s.to_string(), t.to_string()))?;
        debug!(from = s, to = t, "added typing");
        Ok(())
    }

    pub fn add_relation(
        &mut self,
        u: &str,
        v: &str,
        rel: BTreeMap<NodeId, BTreeSet<NodeId>>,
        attrs: Attributes,
    ) -> Result<(), Error> {
        let gu = self.get_graph(u)?;
        let gv = self.get_graph(v)?;
        let key = relation_key(u, v);
        if self.relations.contains_key(&key) {
            return Err(HierarchyError::DuplicateRelation(u.to_string(), v.to_string()).into());
        }
        let (a, b) = if u == key.0 { (gu, gv) } else { (gv, gu) };
        for (src, tgts) in &rel {
            if !a.has_node(src) {
                return Err(HierarchyError::NodeOutOfRange(src.clone(), if u == key.0 { u.to_string() } else { v.to_string() }).into());
            }
            for tgt in tgts {
                if !b.has_node(tgt) {
                    return Err(HierarchyError::NodeOutOfRange(tgt.clone(), if u == key.0 { v.to_string() } else { u.to_string() }).into());
                }
            }
        }
        let rel = if u == key.0 {
            rel
        } else {
            let mut inverse: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
            for (a, bs) in rel {
                for b in bs {
                    inverse.entry(b).or_default().insert(a.clone());
                }
            }
            inverse
        };
        self.relations.insert(key, Relation { rel, attrs });
        Ok(())
    }

    pub fn remove_typing(&mut self, s: &str, t: &str) {
        if let (Ok(si), Ok(ti)) = (self.idx(s), self.idx(t)) {
            if let Some(e) = self.dag.graph().find_edge(si, ti) {
                self.dag.remove_edge(e);
            }
        }
    }

    pub fn remove_relation(&mut self, u: &str, v: &str) {
        self.relations.remove(&relation_key(u, v));
    }

    #[instrument(skip(self))]
    pub fn remove_graph(&mut self, id: &str, reconnect: bool) -> Result<(), Error> {
        let idx = self.idx(id)?;
        if reconnect {
            let preds: Vec<_> = self.predecessors(id)?.into_iter().collect();
            let succs: Vec<_> = self.successors(id)?.into_iter().collect();
            for p in &preds {
                for s in &succs {
                    let composed = mapping::compose(self.get_typing(p, id)?, self.get_typing(id, s)?);
                    if self.get_typing(p, s).is_err() {
                        self.add_typing(p, s, composed, Attributes::new())?;
                    }
                }
            }
        }
        self.dag.remove_node(idx);
        self.graphs.remove(id);
        self.graph_attrs.remove(id);
        self.relations.retain(|(u, v), _| u != id && v != id);
        // `petgraph::Graph::remove_node` swap-removes, reassigning whatever
        // index used to be last onto the freed slot -- rebuild the id index
        // rather than just dropping `id`'s own entry.
        self.index = self
            .dag
            .graph()
            .node_indices()
            .map(|n| (self.dag[n].clone(), n))
            .collect();
        Ok(())
    }

    pub fn copy_graph(&mut self, id: &str, new_id: GraphId, attach_graphs: &[GraphId]) -> Result<(), Error> {
        let graph = self.get_graph(id)?.clone();
        let attrs = self.get_graph_attrs(id)?.clone();
        self.add_graph(new_id.clone(), graph, attrs)?;
        for other in attach_graphs {
            if self.get_typing(id, other).is_ok() {
                let m = self.get_typing(id, other)?.clone();
                let a = self.get_typing_attrs(id, other)?.clone();
                self.add_typing(&new_id, other, m, a)?;
            } else if self.get_typing(other, id).is_ok() {
                let m = self.get_typing(other, id)?.clone();
                let a = self.get_typing_attrs(other, id)?.clone();
                self.add_typing(other, &new_id, m, a)?;
            }
            if self.relations.contains_key(&relation_key(id, other)) {
                let rel = self.get_relation(id, other)?;
                let a = self.get_relation_attrs(id, other)?.clone();
                self.add_relation(&new_id, other, rel, a)?;
            }
        }
        Ok(())
    }

    pub fn duplicate_subgraph(
        &mut self,
        map_old_new: &BTreeMap<GraphId, GraphId>,
        attach_graphs: &[GraphId],
    ) -> Result<(), Error> {
        for new_id in map_old_new.values() {
            if self.index.contains_key(new_id) {
                return Err(HierarchyError::DuplicateGraph(new_id.clone()).into());
            }
        }
        for (old, new) in map_old_new {
            let graph = self.get_graph(old)?.clone();
            let attrs = self.get_graph_attrs(old)?.clone();
            self.add_graph(new.clone(), graph, attrs)?;
        }
        for (old_s, new_s) in map_old_new {
            for (old_t, new_t) in map_old_new {
                if old_s == old_t {
                    continue;
                }
                if let Ok(m) = self.get_typing(old_s, old_t) {
                    let m = m.clone();
                    let a = self.get_typing_attrs(old_s, old_t)?.clone();
                    self.add_typing(new_s, new_t, m, a)?;
                }
            }
            for other in attach_graphs {
                if let Ok(m) = self.get_typing(old_s, other) {
                    let m = m.clone();
                    let a = self.get_typing_attrs(old_s, other)?.clone();
                    self.add_typing(new_s, other, m, a)?;
                } else if let Ok(m) = self.get_typing(other, old_s) {
                    let m = m.clone();
                    let a = self.get_typing_attrs(other, old_s)?.clone();
                    self.add_typing(other, new_s, m, a)?;
                }
            }
        }
        Ok(())
    }

    pub fn relabel_graph_node(&mut self, graph_id: &str, old: &str, new: NodeId) -> Result<(), Error> {
        let mut map = Mapping::new();
        map.insert(old.to_string(), new);
        self.relabel_graph(graph_id, &map)
    }

    pub fn relabel_graph(&mut self, graph_id: &str, map: &Mapping) -> Result<(), Error> {
        {
            let graph = self.get_graph(graph_id)?;
            for new in map.values() {
                if graph.has_node(new) && !map.contains_key(new) {
                    return Err(HierarchyError::MalformedRelabel(
                        graph_id.to_string(),
                        format!("target id '{}' collides with an existing node", new),
                    )
                    .into());
                }
            }
        }

        let nodes: Vec<_> = self.get_graph(graph_id)?.node_set().into_iter().collect();
        let edges: Vec<_> = self.get_graph(graph_id)?.edges().map(|(s, t)| (s.clone(), t.clone())).collect();
        let relabel = |n: &str, map: &Mapping| map.get(n).cloned().unwrap_or_else(|| n.to_string());

        let mut new_graph = Graph::new();
        for n in &nodes {
            let attrs = self.get_graph(graph_id)?.node_attrs(n).cloned().unwrap_or_default();
            new_graph.add_node(relabel(n, map), attrs);
        }
        for (s, t) in &edges {
            let attrs = self.get_graph(graph_id)?.edge_attrs(s, t).cloned().unwrap_or_default();
            new_graph.add_edge(relabel(s, map), relabel(t, map), attrs);
        }
        *self.get_graph_mut(graph_id)? = new_graph;

        let succs: Vec<_> = self.successors(graph_id)?.into_iter().collect();
        let preds: Vec<_> = self.predecessors(graph_id)?.into_iter().collect();
        for s in succs {
            let (si, ti) = (self.idx(graph_id)?, self.idx(&s)?);
            let e = self.dag.graph().find_edge(si, ti).expect("successor edge must exist");
            let old_mapping = self.dag.graph()[e].mapping.clone();
            let relabelled: Mapping = old_mapping
                .into_iter()
                .map(|(k, v)| (relabel(&k, map), v))
                .collect();
            self.dag[e].mapping = relabelled;
        }
        for p in preds {
            let (pi, ti) = (self.idx(&p)?, self.idx(graph_id)?);
            let e = self.dag.graph().find_edge(pi, ti).expect("predecessor edge must exist");
            let old_mapping = self.dag.graph()[e].mapping.clone();
            let relabelled: Mapping = old_mapping
                .into_iter()
                .map(|(k, v)| (k, relabel(&v, map)))
                .collect();
            self.dag[e].mapping = relabelled;
        }
        for ((u, v), relation) in self.relations.iter_mut() {
            if u == graph_id {
                let relabelled: BTreeMap<NodeId, BTreeSet<NodeId>> = relation
                    .rel
                    .iter()
                    .map(|(k, vs)| (relabel(k, map), vs.clone()))
                    .collect();
                relation.rel = relabelled;
            } else if v == graph_id {
                let relabelled: BTreeMap<NodeId, BTreeSet<NodeId>> = relation
                    .rel
                    .iter()
                    .map(|(k, vs)| (k.clone(), vs.iter().map(|n| relabel(n, map)).collect()))
                    .collect();
                relation.rel = relabelled;
            }
        }
        Ok(())
    }

    pub fn relabel_graphs(&mut self, maps: &BTreeMap<GraphId, Mapping>) -> Result<(), Error> {
        for (graph_id, map) in maps {
            self.relabel_graph(graph_id, map)?;
        }
        Ok(())
    }

    pub fn set_node_relation(&mut self, u: &str, v: &str, node_u: &str, nodes_v: BTreeSet<NodeId>) -> Result<(), Error> {
        let key = relation_key(u, v);
        let rel = self
            .relations
            .get_mut(&key)
            .ok_or_else(|| HierarchyError::GraphNotFound(format!("{{{},{}}}", u, v)))?;
        if u == key.0 {
            rel.rel.insert(node_u.to_string(), nodes_v);
        } else {
            // caller addressed the relation from the non-canonical side;
            // rewrite the canonical mapping's entries that pointed at node_u.
            for bs in rel.rel.values_mut() {
                bs.remove(node_u);
            }
            for target in nodes_v {
                rel.rel.entry(target).or_default().insert(node_u.to_string());
            }
        }
        Ok(())
    }

    // -- Analysis -----------------------------------------------------------

    pub fn bfs_tree(&self, src: &str, reverse: bool) -> Result<Vec<GraphId>, Error> {
        let start = self.idx(src)?;
        let direction = if reverse { Direction::Incoming } else { Direction::Outgoing };
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(start);
        visited.insert(start);
        while let Some(n) = queue.pop_front() {
            if n != start {
                order.push(self.dag[n].clone());
            }
            let mut neighbors: Vec<_> = self.dag.graph().neighbors_directed(n, direction).collect();
            neighbors.sort_by_key(|n| self.dag[*n].clone());
            for next in neighbors {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        Ok(order)
    }

    pub fn shortest_path(&self, s: &str, t: &str) -> Option<Vec<GraphId>> {
        let (si, ti) = (self.index.get(s)?, self.index.get(t)?);
        if si == ti {
            return Some(vec![s.to_string()]);
        }
        let mut visited = BTreeSet::new();
        let mut queue = std::collections::VecDeque::new();
        let mut parent: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
        queue.push_back(*si);
        visited.insert(*si);
        while let Some(n) = queue.pop_front() {
            if n == *ti {
                let mut path = vec![n];
                let mut cur = n;
                while let Some(p) = parent.get(&cur) {
                    path.push(*p);
                    cur = *p;
                }
                path.reverse();
                return Some(path.into_iter().map(|i| self.dag[i].clone()).collect());
            }
            for next in self.dag.graph().neighbors_directed(n, Direction::Outgoing) {
                if visited.insert(next) {
                    parent.insert(next, n);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    fn all_paths(&self, s: &str, t: &str) -> Vec<Vec<GraphId>> {
        let mut out = Vec::new();
        let mut stack = vec![(s.to_string(), vec![s.to_string()])];
        while let Some((cur, path)) = stack.pop() {
            if cur == t && path.len() > 1 {
                out.push(path.clone());
                continue;
            }
            if let Ok(succs) = self.successors(&cur) {
                for next in succs {
                    if path.contains(&next) {
                        continue; // DAG, but guard against re-entering mid-search.
                    }
                    let mut p2 = path.clone();
                    p2.push(next.clone());
                    stack.push((next, p2));
                }
            }
        }
        out
    }

    pub fn compose_path_typing(&self, path: &[GraphId]) -> Result<Mapping, Error> {
        if path.is_empty() {
            return Ok(Mapping::new());
        }
        let mut acc = mapping::identity(&self.get_graph(&path[0])?.node_set());
        for pair in path.windows(2) {
            let step = self.get_typing(&pair[0], &pair[1])?;
            acc = mapping::compose(&acc, step);
        }
        Ok(acc)
    }

    pub fn get_ancestors(&self, id: &str) -> Result<BTreeMap<GraphId, Mapping>, Error> {
        let mut out = BTreeMap::new();
        for a in self.bfs_tree(id, true)? {
            if let Some(path) = self.shortest_path(&a, id) {
                out.insert(a, self.compose_path_typing(&path)?);
            }
        }
        Ok(out)
    }

    pub fn get_descendants(&self, id: &str) -> Result<BTreeMap<GraphId, Mapping>, Error> {
        let mut out = BTreeMap::new();
        for d in self.bfs_tree(id, false)? {
            if let Some(path) = self.shortest_path(id, &d) {
                out.insert(d, self.compose_path_typing(&path)?);
            }
        }
        Ok(out)
    }

    pub fn node_type(&self, graph_id: &str, node_id: &str) -> Result<BTreeMap<GraphId, NodeId>, Error> {
        let mut out = BTreeMap::new();
        for s in self.successors(graph_id)? {
            if let Some(img) = self.get_typing(graph_id, &s)?.get(node_id) {
                out.insert(s, img.clone());
            }
        }
        Ok(out)
    }

    pub fn adjacent_relations(&self, id: &str) -> Vec<GraphId> {
        self.relations
            .keys()
            .filter_map(|(u, v)| {
                if u == id {
                    Some(v.clone())
                } else if v == id {
                    Some(u.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn unique_graph_id(&self, prefix: &str) -> GraphId {
        if !self.index.contains_key(prefix) {
            return prefix.to_string();
        }
        let mut i = 0u64;
        loop {
            let candidate = format!("{}{}", prefix, i);
            if !self.index.contains_key(&candidate) {
                return candidate;
            }
            i += 1;
        }
    }

    pub fn find_matching(&self, graph_id: &str, pattern: &dyn Fn(&NodeId, &Attributes) -> bool) -> Result<BTreeSet<NodeId>, Error> {
        Ok(self.get_graph(graph_id)?.find_matching(pattern))
    }

    pub(crate) fn graph_mut_for_rewrite(&mut self, id: &str) -> Result<&mut Graph, Error> {
        self.get_graph_mut(id)
    }

    pub(crate) fn set_typing(&mut self, s: &str, t: &str, mapping: Mapping) -> Result<(), Error> {
        self.remove_typing(s, t);
        let attrs = Attributes::new();
        let (si, ti) = (self.idx(s)?, self.idx(t)?);
        self.dag
            .add_edge(si, ti, TypingEdge { mapping, attrs })
            .map_err(|_| HierarchyError::CycleIntroduced(s.to_string(), t.to_string()))?;
        Ok(())
    }
}

fn maps_agree(a: &Mapping, b: &Mapping) -> bool {
    a.iter().all(|(k, v)| b.get(k).map(|bv| bv == v).unwrap_or(true))
        && b.iter().all(|(k, v)| a.get(k).map(|av| av == v).unwrap_or(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn single_node_graph(n: &str) -> Graph {
        let mut g = Graph::new();
        g.add_node(n.to_string(), Default::default());
        g
    }

    #[test]
    fn add_graph_rejects_duplicate() {
        let mut h = Hierarchy::new();
        h.add_empty_graph("T".into(), Default::default()).unwrap();
        let err = h.add_empty_graph("T".into(), Default::default()).unwrap_err();
        assert!(matches!(err, Error::Hierarchy(HierarchyError::DuplicateGraph(_))));
    }

    #[test]
    fn add_typing_rejects_cycle() {
        let mut h = Hierarchy::new();
        h.add_graph("A".into(), single_node_graph("a"), Default::default()).unwrap();
        h.add_graph("B".into(), single_node_graph("b"), Default::default()).unwrap();
        h.add_typing("A", "B", btreemap! {"a".to_string() => "b".to_string()}, Default::default())
            .unwrap();
        let err = h
            .add_typing("B", "A", btreemap! {"b".to_string() => "a".to_string()}, Default::default())
            .unwrap_err();
        assert!(matches!(err, Error::Hierarchy(HierarchyError::CycleIntroduced(..))));
    }

    #[test]
    fn get_ancestors_collapses_paths() {
        let mut h = Hierarchy::new();
        h.add_graph("A".into(), single_node_graph("a"), Default::default()).unwrap();
        h.add_graph("B".into(), single_node_graph("b"), Default::default()).unwrap();
        h.add_graph("C".into(), single_node_graph("c"), Default::default()).unwrap();
        h.add_typing("A", "B", btreemap! {"a".to_string() => "b".to_string()}, Default::default())
            .unwrap();
        h.add_typing("B", "C", btreemap! {"b".to_string() => "c".to_string()}, Default::default())
            .unwrap();
        let ancestors = h.get_ancestors("C").unwrap();
        assert_eq!(ancestors["A"]["a"], "c");
        assert_eq!(ancestors["B"]["b"], "c");
    }

    #[test]
    fn remove_graph_reconnects() {
        let mut h = Hierarchy::new();
        h.add_graph("A".into(), single_node_graph("a"), Default::default()).unwrap();
        h.add_graph("B".into(), single_node_graph("b"), Default::default()).unwrap();
        h.add_graph("C".into(), single_node_graph("c"), Default::default()).unwrap();
        h.add_typing("A", "B", btreemap! {"a".to_string() => "b".to_string()}, Default::default())
            .unwrap();
        h.add_typing("B", "C", btreemap! {"b".to_string() => "c".to_string()}, Default::default())
            .unwrap();
        h.remove_graph("B", true).unwrap();
        assert_eq!(h.get_typing("A", "C").unwrap()["a"], "c");
    }
}
