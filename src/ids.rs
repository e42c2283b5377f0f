//! Id types used throughout the crate.
//!
//! Node and graph identity is string-based rather than a generated opaque
//! handle: the source hierarchy and every test scenario in the spec name
//! nodes and graphs directly ("a", "T", "x1"), and fresh ids must be
//! generatable from a human-chosen prefix (see `Graph::generate_node_id`).

/// Identifies a graph within a `Hierarchy`.
pub type GraphId = String;

/// Identifies a node within a single `Graph`. Node ids are only unique
/// within the graph that owns them, not across the hierarchy.
pub type NodeId = String;
