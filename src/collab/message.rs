//! Messages pushed to listeners

use crate::assembler::AssembledGraph;
use crate::graph::GraphId;
use serde::{Deserialize, Serialize};

/// What a listener receives after a graph changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BroadcastMessage {
    /// Full current state of the graph
    #[serde(rename_all = "camelCase")]
    Update {
        graph_id: GraphId,
        title: Option<String>,
        /// Sequence of the version the state corresponds to, if any
        sequence: Option<u64>,
        graph: AssembledGraph,
    },
    /// The graph is gone; no further messages follow
    #[serde(rename_all = "camelCase")]
    Deleted { graph_id: GraphId },
}

impl BroadcastMessage {
    pub fn graph_id(&self) -> &GraphId {
        match self {
            BroadcastMessage::Update { graph_id, .. } => graph_id,
            BroadcastMessage::Deleted { graph_id } => graph_id,
        }
    }

    pub fn sequence(&self) -> Option<u64> {
        match self {
            BroadcastMessage::Update { sequence, .. } => *sequence,
            BroadcastMessage::Deleted { .. } => None,
        }
    }
}
