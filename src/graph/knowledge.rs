//! KnowledgeGraph: a titled, owned collection of nodes and edges

use super::node::ActorId;
use super::version::VersionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(String);

impl GraphId {
    /// Create a new random GraphId
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

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GraphId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GraphId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Graph row: title, ownership and the version pointer.
///
/// Nodes, edges and versions live in their own tables and are loaded
/// separately; this struct is the graph header only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub id: GraphId,
    pub title: Option<String>,
    pub owner_id: ActorId,
    /// Version the live node/edge rows correspond to
    pub current_version_id: Option<VersionId>,
    /// Highest sequence number ever allocated for this graph. Never reused,
    /// even after pruning.
    pub last_sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeGraph {
    /// Create a new, empty graph with no history
    pub fn new(owner_id: ActorId) -> Self {
        Self {
            id: GraphId::new(),
            title: None,
            owner_id,
            current_version_id: None,
            last_sequence: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: GraphId) -> Self {
        self.id = id;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}
