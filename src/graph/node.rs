//! Node representation in the knowledge graph

use super::knowledge::GraphId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a node
///
/// Persistent ids are UUIDs, but any string is accepted so that snapshots
/// and wire payloads round-trip without reinterpretation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new random NodeId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a NodeId from an existing string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a user acting on a graph (node owner, comment author)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A comment attached to a node. Comments are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(alias = "user_id", alias = "actor_id")]
    pub actor_id: ActorId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Comment {
    /// Create a comment stamped with the current time
    pub fn new(actor_id: ActorId, text: impl Into<String>) -> Self {
        Self {
            actor_id,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A concept in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Persistent, globally unique identifier
    pub id: NodeId,
    /// Graph this node belongs to
    pub graph_id: GraphId,
    pub label: Option<String>,
    pub description: Option<String>,
    /// Type tag (e.g. "main_concept", "entity", "detail")
    pub node_type: Option<String>,
    /// Display color, usually a hex string
    pub color: Option<String>,
    /// Append-only comment history, oldest first
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Owner, when one is recorded. Unowned nodes may be deleted by anyone.
    pub owner_id: Option<ActorId>,
}

impl Node {
    /// Create an empty node with a fresh id
    pub fn new(graph_id: GraphId) -> Self {
        Self {
            id: NodeId::new(),
            graph_id,
            label: None,
            description: None,
            node_type: None,
            color: None,
            comments: Vec::new(),
            owner_id: None,
        }
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_owner(mut self, owner: ActorId) -> Self {
        self.owner_id = Some(owner);
        self
    }

    /// Whether `actor` may delete this node.
    pub fn deletable_by(&self, actor: &ActorId) -> bool {
        match &self.owner_id {
            Some(owner) => owner == actor,
            None => true,
        }
    }
}
