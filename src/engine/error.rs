//! Engine-level error taxonomy

use crate::external::ExternalError;
use crate::graph::{ActorId, GraphId, NodeId};
use crate::history::{Direction, HistoryError};
use crate::merge::DeltaError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors surfaced to callers of `GraphEngine`
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Graph not found: {0}")]
    GraphNotFound(GraphId),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("{actor} may not delete node {node_id}")]
    PermissionDenied { actor: ActorId, node_id: NodeId },

    #[error("Invalid delta: {0}")]
    InvalidDelta(#[from] DeltaError),

    #[error("External service error: {0}")]
    ExternalService(#[from] ExternalError),

    #[error("Nothing to {direction} for graph {graph_id}")]
    NoHistory {
        graph_id: GraphId,
        direction: Direction,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl EngineError {
    /// True for the not-found family (graph, node or version)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::GraphNotFound(_)
                | EngineError::NodeNotFound(_)
                | EngineError::VersionNotFound(_)
        )
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::GraphNotFound(id) => EngineError::GraphNotFound(GraphId::from_string(id)),
            StorageError::NodeNotFound(id) => EngineError::NodeNotFound(NodeId::from_string(id)),
            StorageError::VersionNotFound(id) => EngineError::VersionNotFound(id),
            other => EngineError::Storage(other),
        }
    }
}

impl From<HistoryError> for EngineError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::GraphNotFound(id) => EngineError::GraphNotFound(GraphId::from_string(id)),
            HistoryError::VersionNotFound(id) => EngineError::VersionNotFound(id),
            HistoryError::NoHistory {
                graph_id,
                direction,
            } => EngineError::NoHistory {
                graph_id: GraphId::from_string(graph_id),
                direction,
            },
            HistoryError::Storage(e) => e.into(),
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
