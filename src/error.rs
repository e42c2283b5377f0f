use crate::ids::{GraphId, NodeId};

/// The error taxonomy for the whole crate. Every fallible public function
/// returns `Result<T, Error>`; internal helpers propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("hierarchy error: {0}")]
    Hierarchy(#[source] HierarchyError),

    #[error("invalid homomorphism: {0}")]
    InvalidHomomorphism(#[source] InvalidHomomorphism),

    #[error("rewriting error: {0}")]
    Rewriting(#[source] RewritingError),

    #[error("{0}")]
    ReGraph(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<HierarchyError> for Error {
    fn from(e: HierarchyError) -> Self {
        Error::Hierarchy(e)
    }
}

impl From<InvalidHomomorphism> for Error {
    fn from(e: InvalidHomomorphism) -> Self {
        Error::InvalidHomomorphism(e)
    }
}

impl From<RewritingError> for Error {
    fn from(e: RewritingError) -> Self {
        Error::Rewriting(e)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
    #[error("graph '{0}' already exists")]
    DuplicateGraph(GraphId),

    #[error("graph '{0}' does not exist")]
    GraphNotFound(GraphId),

    #[error("typing '{0}' -> '{1}' already exists")]
    DuplicateTyping(GraphId, GraphId),

    #[error("relation between '{0}' and '{1}' already exists")]
    DuplicateRelation(GraphId, GraphId),

    #[error("adding typing '{0}' -> '{1}' would introduce a cycle")]
    CycleIntroduced(GraphId, GraphId),

    #[error("typing '{0}' -> '{1}' does not commute with an existing path")]
    NonCommuting(GraphId, GraphId),

    #[error("node '{0}' referenced by a relation is out of range for graph '{1}'")]
    NodeOutOfRange(NodeId, GraphId),

    #[error("relabel map for graph '{0}' is malformed: {1}")]
    MalformedRelabel(GraphId, String),
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidHomomorphism {
    #[error("map from '{0}' to '{1}' is not total: node '{2}' is unmapped")]
    NotTotal(GraphId, GraphId, NodeId),

    #[error("map from '{0}' to '{1}' does not preserve edge ('{2}', '{3}')")]
    EdgeNotPreserved(GraphId, GraphId, NodeId, NodeId),

    #[error("map from '{0}' to '{1}' does not preserve attributes of node '{2}'")]
    NodeAttrsNotPreserved(GraphId, GraphId, NodeId),

    #[error("map from '{0}' to '{1}' does not preserve attributes of edge ('{2}', '{3}')")]
    EdgeAttrsNotPreserved(GraphId, GraphId, NodeId, NodeId),

    #[error("map from '{0}' to '{1}' is not injective at image node '{2}'")]
    NotMono(GraphId, GraphId, NodeId),
}

#[derive(Debug, thiserror::Error)]
pub enum RewritingError {
    #[error("instance map is not mono: node '{0}' is shared by multiple LHS nodes")]
    InstanceNotMono(NodeId),

    #[error("p_typing re-types node '{0}' in ancestor '{1}'")]
    PTypingRetypes(NodeId, GraphId),

    #[error("p_typing for ancestor '{0}' is not composable with predecessor '{1}'")]
    PTypingNotComposable(GraphId, GraphId),

    #[error("rhs_typing for descendant '{0}' is incompatible with existing typing")]
    RhsTypingIncompatible(GraphId),

    #[error("strict mode requires rhs_typing for added node '{0}' in descendant '{1}'")]
    StrictRhsTypingMissing(NodeId, GraphId),

    #[error("strict mode requires a singleton rhs_typing for added node '{0}' in descendant '{1}'")]
    StrictRhsTypingNotSingleton(NodeId, GraphId),

    #[error("added edge ('{0}', '{1}') has no image edge in descendant '{2}' under strict mode")]
    StrictEdgeImageMissing(NodeId, NodeId, GraphId),

    #[error("attribute subset violated for node '{0}' during strict rewrite")]
    StrictAttrsViolated(NodeId),
}
