//! Versions: immutable, sequence-numbered snapshots of a graph's contents

use super::edge::Edge;
use super::knowledge::GraphId;
use super::node::{Node, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Unique identifier for a version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Full node/edge state of a graph at one point in time.
///
/// Unlike the wire shape, a snapshot keeps edge ids so a restore can put
/// every row back exactly as it was stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Split edges into those whose endpoints both appear in `nodes` and
    /// those that dangle.
    pub fn without_dangling_edges(self) -> (GraphSnapshot, Vec<Edge>) {
        let present: HashSet<&NodeId> = self.nodes.iter().map(|n| &n.id).collect();
        let (kept, dropped): (Vec<Edge>, Vec<Edge>) = self
            .edges
            .into_iter()
            .partition(|e| present.contains(&e.source) && present.contains(&e.target));
        (
            GraphSnapshot {
                nodes: self.nodes,
                edges: kept,
            },
            dropped,
        )
    }
}

/// One link of a graph's linear history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub graph_id: GraphId,
    /// Per-graph monotonic counter; total order of the chain
    pub sequence: u64,
    pub snapshot: GraphSnapshot,
    pub created_at: DateTime<Utc>,
}

impl Version {
    pub fn new(graph_id: GraphId, sequence: u64, snapshot: GraphSnapshot) -> Self {
        Self {
            id: VersionId::new(),
            graph_id,
            sequence,
            snapshot,
            created_at: Utc::now(),
        }
    }
}
