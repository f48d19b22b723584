//! Merge reconciliation: transient ids -> persistent ids
//!
//! Existing nodes are patched in place (their id, owner and comments
//! survive); novel transient ids become new nodes; the edge set is
//! regenerated from the proposal.

use super::delta::{ProposedDelta, ProposedNode};
use crate::graph::{ActorId, Edge, GraphId, Node, NodeId};
use crate::storage::{ChangeSet, GraphStore, NodePatch, StorageResult};
use serde::Serialize;
use std::collections::HashMap;

/// Per-merge mapping from transient ids to persistent node ids.
///
/// Seeded with every existing node of the graph mapped to itself, so a
/// proposal can refer back to a node by quoting its real id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IdentifierMap(HashMap<String, NodeId>);

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every node's persistent id to itself
    pub fn seeded_with<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        Self(
            nodes
                .into_iter()
                .map(|n| (n.id.as_str().to_string(), n.id.clone()))
                .collect(),
        )
    }

    pub fn resolve(&self, transient: &str) -> Option<&NodeId> {
        self.0.get(transient)
    }

    pub fn contains(&self, transient: &str) -> bool {
        self.0.contains_key(transient)
    }

    pub fn insert(&mut self, transient: impl Into<String>, persistent: NodeId) {
        self.0.insert(transient.into(), persistent);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeId)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// An edge that could not be resolved against the identifier map.
///
/// Non-fatal: the edge is discarded and the merge goes on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyViolation {
    pub from: String,
    pub to: String,
    /// The endpoint ids that did not resolve
    pub unresolved: Vec<String>,
}

impl std::fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "edge {}→{} dropped: unresolved {}",
            self.from,
            self.to,
            self.unresolved.join(", ")
        )
    }
}

/// What a merge will write, computed without touching the store
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub changes: ChangeSet,
    pub id_map: IdentifierMap,
    pub warnings: Vec<ConsistencyViolation>,
}

/// Summary of a committed merge
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeOutcome {
    pub id_map: IdentifierMap,
    pub warnings: Vec<ConsistencyViolation>,
    pub nodes_created: usize,
    pub nodes_patched: usize,
    pub edges_committed: usize,
}

/// Integrates proposals into a graph store.
///
/// Not safe to run concurrently against the same graph: callers hold the
/// graph's exclusion across `merge`.
pub struct MergeReconciler<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> MergeReconciler<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    /// Compute the change set for `delta` against the graph's current nodes
    pub fn plan(
        graph_id: &GraphId,
        existing: &[Node],
        delta: &ProposedDelta,
        actor: &ActorId,
    ) -> MergePlan {
        let mut id_map = IdentifierMap::seeded_with(existing);
        let mut created: Vec<Node> = Vec::new();
        // Keyed by persistent id; insertion order kept separately
        let mut patches: HashMap<NodeId, NodePatch> = HashMap::new();
        let mut patch_order: Vec<NodeId> = Vec::new();

        for proposed in &delta.nodes {
            match id_map.resolve(&proposed.id).cloned() {
                Some(persistent) => {
                    // Repeated transient id whose node is still pending
                    if let Some(pending) = created.iter_mut().find(|n| n.id == persistent) {
                        apply_to_pending(pending, proposed);
                        continue;
                    }
                    let patch = patches.entry(persistent.clone()).or_insert_with(|| {
                        patch_order.push(persistent.clone());
                        NodePatch::new(persistent)
                    });
                    merge_patch(patch, proposed);
                }
                None => {
                    let node = Node {
                        id: NodeId::new(),
                        graph_id: graph_id.clone(),
                        label: proposed.label.clone(),
                        description: proposed.description.clone(),
                        node_type: proposed.node_type.clone(),
                        color: proposed.color.clone(),
                        comments: proposed.comments.clone().unwrap_or_default(),
                        owner_id: Some(actor.clone()),
                    };
                    id_map.insert(proposed.id.clone(), node.id.clone());
                    created.push(node);
                }
            }
        }

        let mut edges = Vec::new();
        let mut warnings = Vec::new();
        for proposed in &delta.edges {
            match (id_map.resolve(&proposed.from), id_map.resolve(&proposed.to)) {
                (Some(source), Some(target)) => {
                    let mut edge = Edge::new(graph_id.clone(), source.clone(), target.clone());
                    edge.label = proposed.label.clone();
                    edges.push(edge);
                }
                (source, target) => {
                    let mut unresolved = Vec::new();
                    if source.is_none() {
                        unresolved.push(proposed.from.clone());
                    }
                    if target.is_none() {
                        unresolved.push(proposed.to.clone());
                    }
                    warnings.push(ConsistencyViolation {
                        from: proposed.from.clone(),
                        to: proposed.to.clone(),
                        unresolved,
                    });
                }
            }
        }

        let patched = patch_order
            .into_iter()
            .filter_map(|id| patches.remove(&id))
            .filter(|p| !p.is_empty())
            .collect();

        MergePlan {
            changes: ChangeSet {
                created,
                patched,
                edges,
            },
            id_map,
            warnings,
        }
    }

    /// Plan and commit `delta` as one store transaction
    pub fn merge(
        &self,
        graph_id: &GraphId,
        delta: &ProposedDelta,
        actor: &ActorId,
    ) -> StorageResult<MergeOutcome> {
        let existing = self.store.load_nodes(graph_id)?;
        let plan = Self::plan(graph_id, &existing, delta, actor);

        for warning in &plan.warnings {
            tracing::warn!(graph_id = %graph_id, "{}", warning);
        }

        self.store.apply_changes(graph_id, &plan.changes)?;

        tracing::debug!(
            graph_id = %graph_id,
            created = plan.changes.created.len(),
            patched = plan.changes.patched.len(),
            edges = plan.changes.edges.len(),
            "merge committed"
        );

        Ok(MergeOutcome {
            nodes_created: plan.changes.created.len(),
            nodes_patched: plan.changes.patched.len(),
            edges_committed: plan.changes.edges.len(),
            id_map: plan.id_map,
            warnings: plan.warnings,
        })
    }
}

fn merge_patch(patch: &mut NodePatch, proposed: &ProposedNode) {
    if proposed.label.is_some() {
        patch.label = proposed.label.clone();
    }
    if proposed.description.is_some() {
        patch.description = proposed.description.clone();
    }
    if proposed.node_type.is_some() {
        patch.node_type = proposed.node_type.clone();
    }
    if proposed.color.is_some() {
        patch.color = proposed.color.clone();
    }
}

fn apply_to_pending(node: &mut Node, proposed: &ProposedNode) {
    if proposed.label.is_some() {
        node.label = proposed.label.clone();
    }
    if proposed.description.is_some() {
        node.description = proposed.description.clone();
    }
    if proposed.node_type.is_some() {
        node.node_type = proposed.node_type.clone();
    }
    if proposed.color.is_some() {
        node.color = proposed.color.clone();
    }
}
