//! Version history: a linear, prunable snapshot chain per graph
//!
//! Every committed edit appends a version. Undo and redo move the graph's
//! current pointer along the chain and restore the store from the target
//! snapshot; they never append. An edit made while not at the head prunes
//! everything after the pointer first.

use crate::graph::{GraphId, Version, VersionId};
use crate::storage::{GraphStore, StorageError, VersionHeader};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors from history navigation
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("No history to {direction} for graph {graph_id}")]
    NoHistory {
        graph_id: String,
        direction: Direction,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Which way along the chain a navigation moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Undo,
    Redo,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Undo => write!(f, "undo"),
            Direction::Redo => write!(f, "redo"),
        }
    }
}

/// A version header annotated with whether it is the graph's current one
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub id: VersionId,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
    pub is_current: bool,
}

/// Snapshot/undo/redo over a graph store.
///
/// Callers serialize access per graph; nothing here takes locks.
pub struct VersionHistory<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> VersionHistory<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    /// Record the graph's current contents as the new head of its chain.
    ///
    /// If the current pointer is not at the head, later versions are pruned
    /// in the same transaction as the append.
    pub fn snapshot(&self, graph_id: &GraphId) -> HistoryResult<Version> {
        let graph = self
            .store
            .load_graph(graph_id)?
            .ok_or_else(|| HistoryError::GraphNotFound(graph_id.to_string()))?;
        let headers = self.store.list_versions(graph_id)?;
        let head = headers.last().map(|h| h.sequence);
        let current = current_sequence(&headers, graph.current_version_id.as_ref());

        let prune_after = match (current, head) {
            (Some(cur), Some(head)) if cur < head => Some(cur),
            // A chain without a pointer has nothing worth keeping
            (None, Some(_)) => Some(0),
            _ => None,
        };

        let contents = self.store.load_snapshot(graph_id)?;
        let version = Version::new(graph_id.clone(), graph.last_sequence + 1, contents);
        self.store.append_version(&version, prune_after)?;

        if let Some(after) = prune_after {
            tracing::debug!(graph_id = %graph_id, after, "pruned versions past current pointer");
        }
        tracing::debug!(
            graph_id = %graph_id,
            sequence = version.sequence,
            nodes = version.snapshot.nodes.len(),
            edges = version.snapshot.edges.len(),
            "snapshot recorded"
        );
        Ok(version)
    }

    /// Step back to the version preceding the current one
    pub fn undo(&self, graph_id: &GraphId) -> HistoryResult<Version> {
        self.step(graph_id, Direction::Undo)
    }

    /// Step forward to the version following the current one
    pub fn redo(&self, graph_id: &GraphId) -> HistoryResult<Version> {
        self.step(graph_id, Direction::Redo)
    }

    /// Jump the current pointer to any version of the graph's chain
    pub fn restore_version(
        &self,
        graph_id: &GraphId,
        version_id: &VersionId,
    ) -> HistoryResult<Version> {
        if self.store.load_graph(graph_id)?.is_none() {
            return Err(HistoryError::GraphNotFound(graph_id.to_string()));
        }
        self.restore(graph_id, version_id)
    }

    /// All versions in ascending sequence order
    pub fn list_versions(&self, graph_id: &GraphId) -> HistoryResult<Vec<VersionSummary>> {
        let graph = self
            .store
            .load_graph(graph_id)?
            .ok_or_else(|| HistoryError::GraphNotFound(graph_id.to_string()))?;
        let current = graph.current_version_id;

        Ok(self
            .store
            .list_versions(graph_id)?
            .into_iter()
            .map(|h| VersionSummary {
                is_current: current.as_ref() == Some(&h.id),
                id: h.id,
                sequence: h.sequence,
                created_at: h.created_at,
                node_count: h.node_count,
                edge_count: h.edge_count,
            })
            .collect())
    }

    fn step(&self, graph_id: &GraphId, direction: Direction) -> HistoryResult<Version> {
        let graph = self
            .store
            .load_graph(graph_id)?
            .ok_or_else(|| HistoryError::GraphNotFound(graph_id.to_string()))?;
        let headers = self.store.list_versions(graph_id)?;
        let no_history = || HistoryError::NoHistory {
            graph_id: graph_id.to_string(),
            direction,
        };

        let current =
            current_sequence(&headers, graph.current_version_id.as_ref()).ok_or_else(no_history)?;

        // Headers are ascending by sequence
        let target = match direction {
            Direction::Undo => headers.iter().rev().find(|h| h.sequence < current),
            Direction::Redo => headers.iter().find(|h| h.sequence > current),
        }
        .ok_or_else(no_history)?;

        let version = self.restore(graph_id, &target.id)?;
        tracing::info!(
            graph_id = %graph_id,
            from = current,
            to = version.sequence,
            "{}",
            direction
        );
        Ok(version)
    }

    fn restore(&self, graph_id: &GraphId, version_id: &VersionId) -> HistoryResult<Version> {
        let mut version = self
            .store
            .load_version(graph_id, version_id)?
            .ok_or_else(|| HistoryError::VersionNotFound(version_id.to_string()))?;

        let (contents, dropped) = std::mem::take(&mut version.snapshot).without_dangling_edges();
        for edge in &dropped {
            tracing::warn!(
                graph_id = %graph_id,
                version_id = %version_id,
                source = %edge.source,
                target = %edge.target,
                "dropping dangling edge from snapshot"
            );
        }

        self.store.restore_version(graph_id, version_id, &contents)?;
        version.snapshot = contents;
        Ok(version)
    }
}

fn current_sequence(headers: &[VersionHeader], current: Option<&VersionId>) -> Option<u64> {
    let current = current?;
    headers.iter().find(|h| &h.id == current).map(|h| h.sequence)
}
