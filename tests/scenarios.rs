//! End-to-end scenarios against a `Hierarchy`: construct a small DAG of
//! typed graphs, apply one rewrite, and check the whole hierarchy's shape
//! afterward. Complements the per-module unit tests with the literal
//! multi-graph cases a reviewer would reach for first.

use maplit::{btreemap, btreeset};

use regraph_core::graph::{AttributedGraph, Graph};
use regraph_core::hierarchy::Hierarchy;
use regraph_core::mapping::Mapping;
use regraph_core::rewriting::{rewrite, PTyping, RhsTyping};
use regraph_core::rule::Rule;
use regraph_core::rule_hierarchy::{refine_rule_hierarchy, RulePropagations};
use regraph_core::{from_json, to_json, Ignore};

fn graph(nodes: &[&str]) -> Graph {
    let mut g = Graph::new();
    for n in nodes {
        g.add_node(n.to_string(), Default::default());
    }
    g
}

fn mapping(pairs: &[(&str, &str)]) -> Mapping {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn s1_two_level_cloning() {
    let mut h = Hierarchy::new();
    h.add_graph("T".into(), graph(&["a", "b"]), Default::default()).unwrap();
    h.add_graph("G".into(), graph(&["x", "y"]), Default::default()).unwrap();
    h.add_typing("G", "T", mapping(&[("x", "a"), ("y", "a")]), Default::default()).unwrap();

    // L = {a}, P = {p1, p2} both mapping to a, R = {a1, a2}: clone a.
    let lhs = graph(&["a"]);
    let p = graph(&["p1", "p2"]);
    let rhs = graph(&["a1", "a2"]);
    let rule = Rule {
        lhs,
        p,
        rhs,
        p_lhs: mapping(&[("p1", "a"), ("p2", "a")]),
        p_rhs: mapping(&[("p1", "a1"), ("p2", "a2")]),
    };
    let instance = mapping(&[("a", "a")]);
    let p_typing: PTyping = btreemap! {
        "G".to_string() => btreemap! { "x".to_string() => btreeset!["p1".to_string()], "y".to_string() => btreeset!["p2".to_string()] },
    };

    rewrite(&mut h, "T", &rule, Some(instance), p_typing, RhsTyping::new(), false).unwrap();

    let t = h.get_graph("T").unwrap();
    assert_eq!(t.node_set(), btreeset!["a1".to_string(), "a2".to_string(), "b".to_string()]);
    let g = h.get_graph("G").unwrap();
    assert_eq!(g.node_set(), btreeset!["x".to_string(), "y".to_string()]);
    let t_gt = h.get_typing("G", "T").unwrap();
    assert_eq!(t_gt.get("x"), Some(&"a1".to_string()));
    assert_eq!(t_gt.get("y"), Some(&"a2".to_string()));
}

#[test]
fn s2_forward_merge() {
    let mut h = Hierarchy::new();
    h.add_graph("T".into(), graph(&["a", "b"]), Default::default()).unwrap();
    h.add_graph("G".into(), graph(&["x", "y"]), Default::default()).unwrap();
    h.add_typing("G", "T", mapping(&[("x", "a"), ("y", "b")]), Default::default()).unwrap();

    // L = {a,b}, P = {a,b}, R = {c}: merge a,b into c.
    let rule = Rule {
        lhs: graph(&["a", "b"]),
        p: graph(&["a", "b"]),
        rhs: graph(&["c"]),
        p_lhs: mapping(&[("a", "a"), ("b", "b")]),
        p_rhs: mapping(&[("a", "c"), ("b", "c")]),
    };
    let instance = mapping(&[("a", "a"), ("b", "b")]);

    rewrite(&mut h, "T", &rule, Some(instance), PTyping::new(), RhsTyping::new(), false).unwrap();

    let t = h.get_graph("T").unwrap();
    assert_eq!(t.node_set(), btreeset!["c".to_string()]);
    let g = h.get_graph("G").unwrap();
    assert_eq!(g.node_set(), btreeset!["x".to_string(), "y".to_string()]);
    let t_gt = h.get_typing("G", "T").unwrap();
    assert_eq!(t_gt.get("x"), Some(&"c".to_string()));
    assert_eq!(t_gt.get("y"), Some(&"c".to_string()));
}

fn build_s3_hierarchy() -> Hierarchy {
    let mut h = Hierarchy::new();
    h.add_graph("T".into(), graph(&["a", "b"]), Default::default()).unwrap();
    h.add_graph("M".into(), graph(&["u", "v"]), Default::default()).unwrap();
    h.add_graph("G".into(), graph(&["x"]), Default::default()).unwrap();
    h.add_typing("M", "T", mapping(&[("u", "a"), ("v", "b")]), Default::default()).unwrap();
    h.add_typing("G", "M", mapping(&[("x", "u")]), Default::default()).unwrap();
    h
}

fn deletion_rule() -> Rule {
    // L = {a}, P = {} (deleted), R = {}.
    Rule {
        lhs: graph(&["a"]),
        p: Graph::new(),
        rhs: Graph::new(),
        p_lhs: Mapping::new(),
        p_rhs: Mapping::new(),
    }
}

#[test]
fn s3_deletion_propagation() {
    let mut h = build_s3_hierarchy();
    let rule = deletion_rule();
    let instance = mapping(&[("a", "a")]);

    rewrite(&mut h, "T", &rule, Some(instance), PTyping::new(), RhsTyping::new(), false).unwrap();

    assert_eq!(h.get_graph("T").unwrap().node_set(), btreeset!["b".to_string()]);
    assert_eq!(h.get_graph("M").unwrap().node_set(), btreeset!["v".to_string()]);
    assert_eq!(h.get_graph("G").unwrap().node_set(), btreeset![]);
    assert!(h.get_typing("M", "T").unwrap().is_empty());
    assert!(h.get_typing("G", "M").unwrap().is_empty());
    // DAG edges survive even with an empty typing.
    assert!(h.typings().contains(&("M".to_string(), "T".to_string())));
    assert!(h.typings().contains(&("G".to_string(), "M".to_string())));
}

#[test]
fn s4_strict_addition_without_ancestor_typing_fails() {
    let mut h = build_s3_hierarchy();
    let snapshot = h.clone();

    // L = P = {}, R = {c}: add a node with no LHS/P counterpart.
    let rule = Rule {
        lhs: Graph::new(),
        p: Graph::new(),
        rhs: graph(&["c"]),
        p_lhs: Mapping::new(),
        p_rhs: Mapping::new(),
    };

    let err = rewrite(&mut h, "T", &rule, Some(Mapping::new()), PTyping::new(), RhsTyping::new(), true).unwrap_err();
    assert!(matches!(err, regraph_core::Error::Rewriting(_)));
    assert_eq!(h.get_graph("T").unwrap().node_set(), snapshot.get_graph("T").unwrap().node_set());
    assert_eq!(h.get_graph("M").unwrap().node_set(), snapshot.get_graph("M").unwrap().node_set());
}

#[test]
fn s4_strict_addition_succeeds_with_full_rhs_typing() {
    let mut h = build_s3_hierarchy();

    let rule = Rule {
        lhs: Graph::new(),
        p: Graph::new(),
        rhs: graph(&["c"]),
        p_lhs: Mapping::new(),
        p_rhs: Mapping::new(),
    };
    let rhs_typing: RhsTyping = btreemap! {
        "M".to_string() => btreemap! { "c".to_string() => btreeset!["w".to_string()] },
        "G".to_string() => btreemap! { "c".to_string() => btreeset!["y".to_string()] },
    };

    rewrite(&mut h, "T", &rule, Some(Mapping::new()), PTyping::new(), rhs_typing, true).unwrap();

    assert!(h.get_graph("T").unwrap().has_node("c"));
    assert!(h.get_graph("M").unwrap().has_node("w"));
    assert!(h.get_graph("G").unwrap().has_node("y"));
}

#[test]
fn s5_add_typing_rejects_a_cycle() {
    let mut h = Hierarchy::new();
    h.add_graph("A".into(), graph(&["a"]), Default::default()).unwrap();
    h.add_graph("B".into(), graph(&["b"]), Default::default()).unwrap();
    h.add_typing("A", "B", mapping(&[("a", "b")]), Default::default()).unwrap();

    let err = h.add_typing("B", "A", mapping(&[("b", "a")]), Default::default()).unwrap_err();
    assert!(matches!(err, regraph_core::Error::Hierarchy(_)));
}

#[test]
fn s6_json_round_trip() {
    let mut h = Hierarchy::new();
    h.add_graph("A".into(), graph(&["a1", "a2"]), Default::default()).unwrap();
    h.add_graph("B".into(), graph(&["b1"]), Default::default()).unwrap();
    h.add_typing("A", "B", mapping(&[("a1", "b1"), ("a2", "b1")]), Default::default()).unwrap();
    h.add_relation("A", "B", btreemap! { "a1".to_string() => btreeset!["b1".to_string()] }, Default::default()).unwrap();

    let json = to_json(&h).unwrap();
    let h2 = from_json(&json, &Ignore::default()).unwrap();

    assert_eq!(h.get_graph("A").unwrap(), h2.get_graph("A").unwrap());
    assert_eq!(h.get_graph("B").unwrap(), h2.get_graph("B").unwrap());
    assert_eq!(h.get_typing("A", "B").unwrap(), h2.get_typing("A", "B").unwrap());
    assert_eq!(h.get_relation("A", "B").unwrap(), h2.get_relation("A", "B").unwrap());
}

#[test]
fn empty_rule_is_a_no_op_everywhere() {
    let mut h = build_s3_hierarchy();
    let snapshot = h.clone();
    let rule = Rule::identity(graph(&["a", "b"]));
    let instance = mapping(&[("a", "a"), ("b", "b")]);

    rewrite(&mut h, "T", &rule, Some(instance), PTyping::new(), RhsTyping::new(), false).unwrap();

    assert_eq!(h.get_graph("T").unwrap(), snapshot.get_graph("T").unwrap());
    assert_eq!(h.get_graph("M").unwrap(), snapshot.get_graph("M").unwrap());
    assert_eq!(h.get_graph("G").unwrap(), snapshot.get_graph("G").unwrap());
    assert_eq!(h.get_typing("M", "T").unwrap(), snapshot.get_typing("M", "T").unwrap());
    assert_eq!(h.get_typing("G", "M").unwrap(), snapshot.get_typing("G", "M").unwrap());
}

#[test]
fn s7_refine_composes_multi_hop_homomorphism() {
    // A -> T -> D, plus a direct shortcut A -> D consistent with the
    // two-hop composition. A real hierarchy: A is an instance of T, and
    // T is itself typed by D, with A also typed by D directly.
    let mut h = Hierarchy::new();
    h.add_graph("A".into(), graph(&["x", "y"]), Default::default()).unwrap();
    h.add_graph("T".into(), graph(&["a", "b"]), Default::default()).unwrap();
    h.add_graph("D".into(), graph(&["p", "q"]), Default::default()).unwrap();
    h.add_typing("A", "T", mapping(&[("x", "a"), ("y", "b")]), Default::default()).unwrap();
    h.add_typing("T", "D", mapping(&[("a", "p"), ("b", "q")]), Default::default()).unwrap();
    h.add_typing("A", "D", mapping(&[("x", "p"), ("y", "q")]), Default::default()).unwrap();

    // Identity rules on all three graphs, with only the two adjacent
    // homomorphisms known -- (A, D) is a literal edge of `h` but has no
    // entry yet, and can only be reached by composing through T.
    let mut propagations = RulePropagations::default();
    for id in ["A", "T", "D"] {
        propagations.rules.insert(id.to_string(), Rule::identity(h.get_graph(id).unwrap().clone()));
    }
    let a_t = mapping(&[("x", "a"), ("y", "b")]);
    let t_d = mapping(&[("a", "p"), ("b", "q")]);
    propagations
        .rule_homomorphisms
        .insert(("A".to_string(), "T".to_string()), (a_t.clone(), a_t.clone(), a_t));
    propagations
        .rule_homomorphisms
        .insert(("T".to_string(), "D".to_string()), (t_d.clone(), t_d.clone(), t_d));

    refine_rule_hierarchy(&h, "T", &mut propagations).unwrap();

    let expected = mapping(&[("x", "p"), ("y", "q")]);
    let (l, p, r) = propagations
        .rule_homomorphisms
        .get(&("A".to_string(), "D".to_string()))
        .expect("shortest-known-homomorphism-path composition fills the shortcut edge");
    assert_eq!(l, &expected);
    assert_eq!(p, &expected);
    assert_eq!(r, &expected);
}

#[test]
fn p_typing_retyping_conflict_is_rejected() {
    let mut h = Hierarchy::new();
    h.add_graph("T".into(), graph(&["a", "b"]), Default::default()).unwrap();
    h.add_graph("G".into(), graph(&["x"]), Default::default()).unwrap();
    // x is typed to "b", unrelated to the node the rule below touches.
    h.add_typing("G", "T", mapping(&[("x", "b")]), Default::default()).unwrap();

    let rule = Rule {
        lhs: graph(&["a"]),
        p: graph(&["p1"]),
        rhs: graph(&["a"]),
        p_lhs: mapping(&[("p1", "a")]),
        p_rhs: mapping(&[("p1", "a")]),
    };
    let instance = mapping(&[("a", "a")]);
    // Claims x is typed through p1, i.e. should map to "a" -- but x is
    // actually typed to "b", so this re-typing claim disagrees with G's
    // existing typing.
    let p_typing: PTyping = btreemap! {
        "G".to_string() => btreemap! { "x".to_string() => btreeset!["p1".to_string()] },
    };

    let err = rewrite(&mut h, "T", &rule, Some(instance), p_typing, RhsTyping::new(), false).unwrap_err();
    assert!(matches!(err, regraph_core::Error::Rewriting(_)));
}
