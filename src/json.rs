//! JSON (de)serialization (§6's wire shape), hand-rolled because `Graph`'s
//! `(NodeId, NodeId)`-keyed edge map has no direct `serde_json` object
//! representation.

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::error::Error;
use crate::graph::{AttributedGraph, Graph};
use crate::hierarchy::Hierarchy;
use crate::ids::{GraphId, NodeId};
use crate::mapping::Mapping;

#[derive(Serialize, Deserialize)]
struct NodeJson {
    id: NodeId,
    attrs: Attributes,
}

#[derive(Serialize, Deserialize)]
struct EdgeJson {
    from: NodeId,
    to: NodeId,
    attrs: Attributes,
}

#[derive(Serialize, Deserialize)]
struct GraphJson {
    nodes: Vec<NodeJson>,
    edges: Vec<EdgeJson>,
}

#[derive(Serialize, Deserialize)]
struct GraphEntryJson {
    id: GraphId,
    graph: GraphJson,
    attrs: Attributes,
}

#[derive(Serialize, Deserialize)]
struct TypingEntryJson {
    from: GraphId,
    to: GraphId,
    mapping: Mapping,
    attrs: Attributes,
}

#[derive(Serialize, Deserialize)]
struct RelationEntryJson {
    from: GraphId,
    to: GraphId,
    rel: std::collections::BTreeMap<NodeId, std::collections::BTreeSet<NodeId>>,
    attrs: Attributes,
}

#[derive(Serialize, Deserialize, Default)]
struct HierarchyJson {
    graphs: Vec<GraphEntryJson>,
    typing: Vec<TypingEntryJson>,
    relations: Vec<RelationEntryJson>,
}

/// Ids to drop from the loaded hierarchy (§6: "the loader accepts an
/// `ignore` block filtering graphs/typings/relations by id").
#[derive(Clone, Debug, Default)]
pub struct Ignore {
    pub graphs: std::collections::BTreeSet<GraphId>,
    pub typings: std::collections::BTreeSet<(GraphId, GraphId)>,
    pub relations: std::collections::BTreeSet<(GraphId, GraphId)>,
}

fn graph_to_json(g: &Graph) -> GraphJson {
    GraphJson {
        nodes: g
            .nodes()
            .map(|n| NodeJson {
                id: n.clone(),
                attrs: g.node_attrs(n).cloned().unwrap_or_default(),
            })
            .collect(),
        edges: g
            .edges()
            .map(|(s, t)| EdgeJson {
                from: s.clone(),
                to: t.clone(),
                attrs: g.edge_attrs(s, t).cloned().unwrap_or_default(),
            })
            .collect(),
    }
}

fn graph_from_json(j: GraphJson) -> Graph {
    let mut g = Graph::new();
    for n in j.nodes {
        g.add_node(n.id, n.attrs);
    }
    for e in j.edges {
        g.add_edge(e.from, e.to, e.attrs);
    }
    g
}

pub fn to_json(h: &Hierarchy) -> Result<String, Error> {
    let doc = HierarchyJson {
        graphs: h
            .graphs()
            .map(|id| -> Result<GraphEntryJson, Error> {
                Ok(GraphEntryJson {
                    id: id.clone(),
                    graph: graph_to_json(h.get_graph(id)?),
                    attrs: h.get_graph_attrs(id)?.clone(),
                })
            })
            .collect::<Result<_, _>>()?,
        typing: h
            .typings()
            .into_iter()
            .map(|(from, to)| -> Result<TypingEntryJson, Error> {
                Ok(TypingEntryJson {
                    mapping: h.get_typing(&from, &to)?.clone(),
                    attrs: h.get_typing_attrs(&from, &to)?.clone(),
                    from,
                    to,
                })
            })
            .collect::<Result<_, _>>()?,
        relations: h
            .relations()
            .into_iter()
            .map(|(from, to)| -> Result<RelationEntryJson, Error> {
                Ok(RelationEntryJson {
                    rel: h.get_relation(&from, &to)?,
                    attrs: h.get_relation_attrs(&from, &to)?.clone(),
                    from,
                    to,
                })
            })
            .collect::<Result<_, _>>()?,
    };
    Ok(serde_json::to_string(&doc)?)
}

pub fn from_json(data: &str, ignore: &Ignore) -> Result<Hierarchy, Error> {
    let doc: HierarchyJson = serde_json::from_str(data)?;
    let mut h = Hierarchy::new();

    for entry in doc.graphs {
        if ignore.graphs.contains(&entry.id) {
            continue;
        }
        h.add_graph(entry.id, graph_from_json(entry.graph), entry.attrs)?;
    }
    for entry in doc.typing {
        let key = (entry.from.clone(), entry.to.clone());
        if ignore.typings.contains(&key) || ignore.graphs.contains(&entry.from) || ignore.graphs.contains(&entry.to) {
            continue;
        }
        h.add_typing(&entry.from, &entry.to, entry.mapping, entry.attrs)?;
    }
    for entry in doc.relations {
        let key = (entry.from.clone(), entry.to.clone());
        if ignore.relations.contains(&key) || ignore.graphs.contains(&entry.from) || ignore.graphs.contains(&entry.to) {
            continue;
        }
        h.add_relation(&entry.from, &entry.to, entry.rel, entry.attrs)?;
    }

    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_small_hierarchy() {
        let mut h = Hierarchy::new();
        let mut g = Graph::new();
        g.add_node("a".into(), Default::default());
        g.add_node("b".into(), Default::default());
        g.add_edge("a".into(), "b".into(), Default::default());
        h.add_graph("G".into(), g, Default::default()).unwrap();

        let json = to_json(&h).unwrap();
        let loaded = from_json(&json, &Ignore::default()).unwrap();
        assert!(loaded.get_graph("G").unwrap().has_node("a"));
        assert!(loaded.get_graph("G").unwrap().has_edge("a", "b"));
    }

    #[test]
    fn ignore_block_drops_named_graph() {
        let mut h = Hierarchy::new();
        h.add_graph("G".into(), Graph::new(), Default::default()).unwrap();
        let json = to_json(&h).unwrap();
        let mut ignore = Ignore::default();
        ignore.graphs.insert("G".to_string());
        let loaded = from_json(&json, &ignore).unwrap();
        assert!(loaded.get_graph("G").is_err());
    }
}
