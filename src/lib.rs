//! An in-memory DAG of attributed graphs connected by typing homomorphisms,
//! with sesqui-pushout rewriting and automatic propagation across the DAG.
//!
//! The crate is organized leaves-first: [`attributes`] and [`graph`] are
//! the raw material, [`mapping`] and [`kernel`] are the category theory,
//! [`hierarchy`] is the DAG bookkeeping, and [`rewriting`]/[`propagation`]/
//! [`rule_hierarchy`] are the three things callers actually invoke.

pub mod attributes;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod ids;
pub mod json;
pub mod kernel;
pub mod mapping;
pub mod propagation;
pub mod rewriting;
pub mod rule;
pub mod rule_hierarchy;

pub use error::Error;
pub use graph::{AttributedGraph, Graph};
pub use hierarchy::Hierarchy;
pub use ids::{GraphId, NodeId};
pub use json::{from_json, to_json, Ignore};
pub use mapping::Mapping;
pub use rewriting::{rewrite, PTyping, RhsTyping};
pub use rule::Rule;
pub use rule_hierarchy::{get_rule_propagations, refine_rule_hierarchy, RulePropagations};
