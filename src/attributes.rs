//! Attribute values and the set-of-values maps attached to nodes and edges.
//!
//! Attribute values are opaque to the core beyond equality and ordering
//! (§3: "Attribute JSON is a mapping name -> {...} -- opaque to the core").
//! `AttrValue` is therefore a thin wrapper over any JSON scalar rather than
//! a typed union the core would have to interpret.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Str(String),
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

/// name -> set-of-values, per node or per edge.
pub type Attributes = BTreeMap<String, BTreeSet<AttrValue>>;

/// Union of two attribute maps: for each name, the union of its value sets.
pub fn union(a: &Attributes, b: &Attributes) -> Attributes {
    let mut out = a.clone();
    for (k, vs) in b {
        out.entry(k.clone()).or_default().extend(vs.iter().cloned());
    }
    out
}

/// Intersection of two attribute maps: only names present in both, with the
/// intersection of their value sets. A name whose intersected set would be
/// empty is dropped entirely.
pub fn intersection(a: &Attributes, b: &Attributes) -> Attributes {
    let mut out = Attributes::new();
    for (k, vs) in a {
        if let Some(other) = b.get(k) {
            let common: BTreeSet<_> = vs.intersection(other).cloned().collect();
            if !common.is_empty() {
                out.insert(k.clone(), common);
            }
        }
    }
    out
}

/// True iff every name/value pair in `sub` also appears in `sup` (the
/// attribute-`subseteq` check required of every homomorphism).
pub fn is_subset(sub: &Attributes, sup: &Attributes) -> bool {
    sub.iter().all(|(k, vs)| match sup.get(k) {
        Some(sup_vs) => vs.is_subset(sup_vs),
        None => vs.is_empty(),
    })
}

/// Remove every name/value pair present in `to_remove` from `attrs`.
/// Names left with an empty value set are dropped.
pub fn remove(attrs: &mut Attributes, to_remove: &Attributes) {
    for (k, vs) in to_remove {
        if let Some(existing) = attrs.get_mut(k) {
            for v in vs {
                existing.remove(v);
            }
            if existing.is_empty() {
                attrs.remove(k);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreeset;

    fn attrs(pairs: &[(&str, &[i64])]) -> Attributes {
        pairs
            .iter()
            .map(|(k, vs)| ((*k).to_string(), vs.iter().map(|v| AttrValue::Int(*v)).collect()))
            .collect()
    }

    #[test]
    fn union_merges_value_sets() {
        let a = attrs(&[("color", &[1, 2])]);
        let b = attrs(&[("color", &[2, 3]), ("size", &[5])]);
        let u = union(&a, &b);
        assert_eq!(u["color"], btreeset![AttrValue::Int(1), AttrValue::Int(2), AttrValue::Int(3)]);
        assert_eq!(u["size"], btreeset![AttrValue::Int(5)]);
    }

    #[test]
    fn intersection_drops_empty_names() {
        let a = attrs(&[("color", &[1, 2])]);
        let b = attrs(&[("color", &[3, 4])]);
        assert!(intersection(&a, &b).is_empty());
    }

    #[test]
    fn subset_checks_missing_names_as_empty() {
        let sub = attrs(&[("color", &[])]);
        let sup = attrs(&[]);
        assert!(is_subset(&sub, &sup));

        let sub = attrs(&[("color", &[1])]);
        assert!(!is_subset(&sub, &sup));
    }
}
