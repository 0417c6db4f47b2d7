//! Tree engine errors.

use tp_store::{NodeId, StoreError, StoreErrorKind};

/// Error returned by tree planning and the admin service.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Node does not exist.
    #[error("Node not found: {0}")]
    NotFound(NodeId),
    /// Move would create a cycle or targets the node itself.
    #[error("Invalid move of node {node} relative to {target}: {reason}")]
    InvalidMove {
        /// Node being moved.
        node: NodeId,
        /// Requested target.
        target: NodeId,
        /// Why the move was refused.
        reason: &'static str,
    },
    /// Node has children and the delete policy refuses to touch them.
    #[error("Node {0} has children")]
    HasChildren(NodeId),
    /// Snapshot violates the nested-set structure.
    #[error("Corrupt tree: {0}")]
    Corrupt(String),
    /// Store failure. The failing batch was rolled back.
    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for TreeError {
    fn from(e: StoreError) -> Self {
        match (&e.kind, e.node) {
            (StoreErrorKind::NotFound, Some(id)) => Self::NotFound(id),
            _ => Self::Storage(e),
        }
    }
}
