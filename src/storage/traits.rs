//! Storage trait definitions

use crate::graph::{
    Comment, Edge, GraphId, GraphSnapshot, KnowledgeGraph, Node, NodeId, Version,
    VersionId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Connection lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Field-level update to an existing node. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub id: NodeId,
    pub label: Option<String>,
    pub description: Option<String>,
    pub node_type: Option<String>,
    pub color: Option<String>,
}

impl NodePatch {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// True if the patch would not change any field
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.description.is_none()
            && self.node_type.is_none()
            && self.color.is_none()
    }
}

/// A set of row changes committed as one transaction.
///
/// Nodes are created or patched; the graph's edge set is replaced
/// wholesale by `edges`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub created: Vec<Node>,
    pub patched: Vec<NodePatch>,
    pub edges: Vec<Edge>,
}

/// Version metadata without the snapshot body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionHeader {
    pub id: VersionId,
    pub graph_id: GraphId,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
}

/// Trait for graph storage backends
///
/// Every mutating method is atomic: either all of its row changes land or
/// none do. Implementations must be thread-safe (Send + Sync).
pub trait GraphStore: Send + Sync {
    // === Graph Operations ===

    /// Insert a new graph row
    fn create_graph(&self, graph: &KnowledgeGraph) -> StorageResult<()>;

    /// Load a graph header by ID
    fn load_graph(&self, id: &GraphId) -> StorageResult<Option<KnowledgeGraph>>;

    /// List all graphs, ordered by title
    fn list_graphs(&self) -> StorageResult<Vec<KnowledgeGraph>>;

    /// Change a graph's title. Returns false if the graph does not exist.
    fn rename_graph(&self, id: &GraphId, title: &str) -> StorageResult<bool>;

    /// Delete a graph with all its nodes, edges and versions
    fn delete_graph(&self, id: &GraphId) -> StorageResult<bool>;

    // === Node Operations ===

    /// Load a node by ID, scoped to a graph
    fn load_node(&self, graph_id: &GraphId, node_id: &NodeId) -> StorageResult<Option<Node>>;

    /// Load every node of a graph in insertion order
    fn load_nodes(&self, graph_id: &GraphId) -> StorageResult<Vec<Node>>;

    /// Delete a node and every edge incident to it
    fn delete_node(&self, graph_id: &GraphId, node_id: &NodeId) -> StorageResult<bool>;

    /// Append a comment to a node. Returns false if the node does not exist.
    fn append_comment(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        comment: &Comment,
    ) -> StorageResult<bool>;

    // === Edge Operations ===

    /// Load every edge of a graph in insertion order
    fn load_edges(&self, graph_id: &GraphId) -> StorageResult<Vec<Edge>>;

    // === Bulk Operations ===

    /// Load the current node/edge state of a graph
    fn load_snapshot(&self, graph_id: &GraphId) -> StorageResult<GraphSnapshot> {
        Ok(GraphSnapshot::new(
            self.load_nodes(graph_id)?,
            self.load_edges(graph_id)?,
        ))
    }

    /// Create/patch nodes and replace the edge set in one transaction.
    ///
    /// Edges whose endpoints are not nodes of the graph after the node
    /// changes are dropped, never stored.
    fn apply_changes(&self, graph_id: &GraphId, changes: &ChangeSet) -> StorageResult<()>;

    // === Version Operations ===

    /// List version headers in ascending sequence order
    fn list_versions(&self, graph_id: &GraphId) -> StorageResult<Vec<VersionHeader>>;

    /// Load a full version, scoped to a graph
    fn load_version(
        &self,
        graph_id: &GraphId,
        version_id: &VersionId,
    ) -> StorageResult<Option<Version>>;

    /// Append a version and make it current, in one transaction.
    ///
    /// When `prune_after` is set, every version of the graph with a greater
    /// sequence number is deleted first. The graph's `last_sequence` is
    /// advanced to `version.sequence`.
    fn append_version(&self, version: &Version, prune_after: Option<u64>) -> StorageResult<()>;

    /// Replace all nodes and edges of a graph with `snapshot` and point the
    /// graph at `version_id`, in one transaction.
    fn restore_version(
        &self,
        graph_id: &GraphId,
        version_id: &VersionId,
        snapshot: &GraphSnapshot,
    ) -> StorageResult<()>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

