//! Assembler: relational rows <-> flat wire shape
//!
//! `{nodes: [{id,label,description,type,color,comments[],ownerId}],
//!   edges: [{from,to,label}]}`
//!
//! Pure and stateless. Shape only: invariants are the store's business.

use crate::graph::{ActorId, Comment, Edge, GraphId, GraphSnapshot, Node, NodeId};
use serde::{Deserialize, Serialize};

/// A node as seen by viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNode {
    pub id: NodeId,
    pub label: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub node_type: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(alias = "owner_id")]
    pub owner_id: Option<ActorId>,
}

/// An edge as seen by viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub label: Option<String>,
}

/// The assembled view of a graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledGraph {
    pub nodes: Vec<WireNode>,
    pub edges: Vec<WireEdge>,
}

impl AssembledGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &NodeId) -> Option<&WireNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }
}

/// Rows to wire shape, preserving row order
pub fn assemble(snapshot: &GraphSnapshot) -> AssembledGraph {
    AssembledGraph {
        nodes: snapshot
            .nodes
            .iter()
            .map(|n| WireNode {
                id: n.id.clone(),
                label: n.label.clone(),
                description: n.description.clone(),
                node_type: n.node_type.clone(),
                color: n.color.clone(),
                comments: n.comments.clone(),
                owner_id: n.owner_id.clone(),
            })
            .collect(),
        edges: snapshot
            .edges
            .iter()
            .map(|e| WireEdge {
                from: e.source.clone(),
                to: e.target.clone(),
                label: e.label.clone(),
            })
            .collect(),
    }
}

/// Wire shape back to rows for `graph_id`.
///
/// The wire shape carries no edge ids, so each edge gets a fresh one.
pub fn disassemble(graph_id: &GraphId, graph: &AssembledGraph) -> GraphSnapshot {
    GraphSnapshot {
        nodes: graph
            .nodes
            .iter()
            .map(|w| Node {
                id: w.id.clone(),
                graph_id: graph_id.clone(),
                label: w.label.clone(),
                description: w.description.clone(),
                node_type: w.node_type.clone(),
                color: w.color.clone(),
                comments: w.comments.clone(),
                owner_id: w.owner_id.clone(),
            })
            .collect(),
        edges: graph
            .edges
            .iter()
            .map(|w| {
                let mut edge = Edge::new(graph_id.clone(), w.from.clone(), w.to.clone());
                edge.label = w.label.clone();
                edge
            })
            .collect(),
    }
}
