//! GraphEngine: the main entry point for collaborative graph editing
//!
//! Every mutation of a graph runs commit, snapshot and broadcast inside
//! that graph's exclusive section, so listeners never see a state older
//! than one they already received. Calls to external services happen
//! before the section is entered.

use super::error::{EngineError, EngineResult};
use crate::assembler::{assemble, AssembledGraph};
use crate::collab::{BroadcastMessage, Broadcaster, Listener, ListenerId};
use crate::config::EngineConfig;
use crate::external::{
    with_deadline, ContentExtractor, ContentGenerator, ExternalError, GenerationRequest,
    PlainTextExtractor,
};
use crate::graph::{
    ActorId, Comment, GraphId, GraphSnapshot, KnowledgeGraph, NodeId, VersionId,
};
use crate::history::{VersionHistory, VersionSummary};
use crate::merge::{ConsistencyViolation, IdentifierMap, MergeReconciler, ProposedDelta};
use crate::storage::GraphStore;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const EXPAND_PREFIX: &str = "Expand: ";

/// Who is making a change, and through which listener (if any)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
    pub listener: Option<ListenerId>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ActorId::new(id),
            listener: None,
        }
    }

    /// Mark the change as originating from `listener`
    pub fn via(mut self, listener: ListenerId) -> Self {
        self.listener = Some(listener);
        self
    }
}

/// Graph header as shown in listings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub id: GraphId,
    pub title: Option<String>,
    pub owner_id: ActorId,
}

impl From<&KnowledgeGraph> for GraphSummary {
    fn from(graph: &KnowledgeGraph) -> Self {
        Self {
            id: graph.id.clone(),
            title: graph.title.clone(),
            owner_id: graph.owner_id.clone(),
        }
    }
}

/// Result of a committed merge
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub graph_id: GraphId,
    /// Sequence of the version recorded for this merge
    pub sequence: u64,
    pub graph: AssembledGraph,
    pub id_map: IdentifierMap,
    pub warnings: Vec<ConsistencyViolation>,
}

/// Parameters of a generation call
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Target graph; created when absent or unknown
    pub graph_id: Option<GraphId>,
    /// Title for a newly created graph
    pub title: Option<String>,
    pub instruction: String,
}

impl GenerateRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    pub fn for_graph(mut self, graph_id: GraphId) -> Self {
        self.graph_id = Some(graph_id);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// The collaborative graph engine
pub struct GraphEngine {
    store: Arc<dyn GraphStore>,
    broadcaster: Arc<Broadcaster>,
    generator: Option<Arc<dyn ContentGenerator>>,
    extractor: Arc<dyn ContentExtractor>,
    config: EngineConfig,
    /// Per-graph exclusion for commit+snapshot+broadcast
    locks: DashMap<GraphId, Arc<Mutex<()>>>,
}

impl GraphEngine {
    /// Create an engine over a store, with default config, no generator
    /// and the plain-text extractor
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            broadcaster: Arc::new(Broadcaster::new()),
            generator: None,
            extractor: Arc::new(PlainTextExtractor),
            config: EngineConfig::default(),
            locks: DashMap::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock_for(&self, graph_id: &GraphId) -> Arc<Mutex<()>> {
        self.locks.entry(graph_id.clone()).or_default().clone()
    }

    /// Enter the graph's exclusive section
    async fn enter(&self, graph_id: &GraphId) -> GraphSection<'_> {
        let guard = self.lock_for(graph_id).lock_owned().await;
        GraphSection {
            locks: &self.locks,
            graph_id: graph_id.clone(),
            guard: Some(guard),
        }
    }

    fn require_graph(&self, graph_id: &GraphId) -> EngineResult<KnowledgeGraph> {
        self.store
            .load_graph(graph_id)?
            .ok_or_else(|| EngineError::GraphNotFound(graph_id.clone()))
    }

    fn current_sequence(&self, graph: &KnowledgeGraph) -> EngineResult<Option<u64>> {
        let Some(current) = graph.current_version_id.as_ref() else {
            return Ok(None);
        };
        Ok(self
            .store
            .list_versions(&graph.id)?
            .into_iter()
            .find(|h| &h.id == current)
            .map(|h| h.sequence))
    }

    /// Push the state to the graph's listeners. Must run inside the
    /// graph's section, after the commit.
    fn publish(
        &self,
        graph_id: &GraphId,
        sequence: Option<u64>,
        graph: &AssembledGraph,
        actor: &Actor,
    ) -> EngineResult<()> {
        let title = self.store.load_graph(graph_id)?.and_then(|g| g.title);
        let exclude = if self.config.exclude_origin {
            actor.listener.as_ref()
        } else {
            None
        };
        let stats = self.broadcaster.broadcast(
            BroadcastMessage::Update {
                graph_id: graph_id.clone(),
                title,
                sequence,
                graph: graph.clone(),
            },
            exclude,
        );
        tracing::debug!(
            graph_id = %graph_id,
            sequence,
            delivered = stats.delivered,
            stale = stats.stale,
            "state broadcast"
        );
        Ok(())
    }

    /// Snapshot, assemble and broadcast after a committed edit
    fn record_and_publish(
        &self,
        graph_id: &GraphId,
        actor: &Actor,
    ) -> EngineResult<(u64, AssembledGraph)> {
        let version = VersionHistory::new(self.store.as_ref()).snapshot(graph_id)?;
        let graph = assemble(&version.snapshot);
        self.publish(graph_id, Some(version.sequence), &graph, actor)?;
        Ok((version.sequence, graph))
    }

    // --- Graphs ---

    /// Return `graph_id` if it exists; otherwise create a graph (with that
    /// id, if given) owned by `owner`, with an empty first version.
    pub async fn create_or_load_graph(
        &self,
        graph_id: Option<GraphId>,
        title: Option<String>,
        owner: &ActorId,
    ) -> EngineResult<GraphId> {
        let graph_id = graph_id.unwrap_or_default();
        let _section = self.enter(&graph_id).await;

        if self.store.load_graph(&graph_id)?.is_some() {
            return Ok(graph_id);
        }

        let mut graph = KnowledgeGraph::new(owner.clone()).with_id(graph_id.clone());
        graph.title = title;
        self.store.create_graph(&graph)?;
        // First version lets the first edit be undone
        VersionHistory::new(self.store.as_ref()).snapshot(&graph_id)?;

        tracing::info!(graph_id = %graph_id, owner = %owner, "graph created");
        Ok(graph_id)
    }

    /// Current assembled state of a graph
    pub fn get_graph(&self, graph_id: &GraphId) -> EngineResult<AssembledGraph> {
        self.require_graph(graph_id)?;
        Ok(assemble(&self.store.load_snapshot(graph_id)?))
    }

    /// Header of a graph
    pub fn graph_summary(&self, graph_id: &GraphId) -> EngineResult<GraphSummary> {
        Ok(GraphSummary::from(&self.require_graph(graph_id)?))
    }

    /// All graphs, ordered by title
    pub fn list_graphs(&self) -> EngineResult<Vec<GraphSummary>> {
        Ok(self
            .store
            .list_graphs()?
            .iter()
            .map(GraphSummary::from)
            .collect())
    }

    /// Change a graph's title. Not versioned; listeners are notified.
    pub async fn rename_graph(
        &self,
        graph_id: &GraphId,
        title: &str,
        actor: &Actor,
    ) -> EngineResult<GraphSummary> {
        let _section = self.enter(graph_id).await;

        if !self.store.rename_graph(graph_id, title)? {
            return Err(EngineError::GraphNotFound(graph_id.clone()));
        }
        let graph = self.require_graph(graph_id)?;
        let sequence = self.current_sequence(&graph)?;
        let state = assemble(&self.store.load_snapshot(graph_id)?);
        self.publish(graph_id, sequence, &state, actor)?;

        tracing::info!(graph_id = %graph_id, title, "graph renamed");
        Ok(GraphSummary::from(&graph))
    }

    /// Delete a graph with its nodes, edges and versions.
    ///
    /// Listeners get a final `deleted` message and are then dropped. The
    /// graph's lock entry goes away with the last task holding it.
    pub async fn delete_graph(&self, graph_id: &GraphId) -> EngineResult<()> {
        let _section = self.enter(graph_id).await;
        if !self.store.delete_graph(graph_id)? {
            return Err(EngineError::GraphNotFound(graph_id.clone()));
        }
        self.broadcaster.broadcast(
            BroadcastMessage::Deleted {
                graph_id: graph_id.clone(),
            },
            None,
        );
        let closed = self.broadcaster.close(graph_id);
        tracing::info!(graph_id = %graph_id, listeners = closed, "graph deleted");
        Ok(())
    }

    // --- Merging ---

    /// Integrate a validated delta: commit, snapshot, broadcast.
    pub async fn merge_generated_content(
        &self,
        graph_id: &GraphId,
        delta: &ProposedDelta,
        actor: &Actor,
    ) -> EngineResult<MergeResult> {
        let _section = self.enter(graph_id).await;

        self.require_graph(graph_id)?;
        let outcome = MergeReconciler::new(self.store.as_ref()).merge(graph_id, delta, &actor.id)?;
        let (sequence, graph) = self.record_and_publish(graph_id, actor)?;

        tracing::info!(
            graph_id = %graph_id,
            sequence,
            created = outcome.nodes_created,
            patched = outcome.nodes_patched,
            edges = outcome.edges_committed,
            dropped_edges = outcome.warnings.len(),
            "merge applied"
        );
        Ok(MergeResult {
            graph_id: graph_id.clone(),
            sequence,
            graph,
            id_map: outcome.id_map,
            warnings: outcome.warnings,
        })
    }

    /// Ask the generator for content and merge it.
    ///
    /// The generator sees the current graph when there is one worth
    /// refining. Nothing is written if the call fails or its output is
    /// invalid.
    pub async fn generate(
        &self,
        request: GenerateRequest,
        actor: &Actor,
    ) -> EngineResult<MergeResult> {
        let previous = match &request.graph_id {
            Some(id) if self.store.load_graph(id)?.is_some() => {
                let state = assemble(&self.store.load_snapshot(id)?);
                (!state.is_empty()).then_some(state)
            }
            _ => None,
        };
        let mut generation = GenerationRequest::new(request.instruction);
        generation.previous_graph = previous;

        let delta = self.call_generator(&generation).await?;
        let graph_id = self
            .create_or_load_graph(request.graph_id, request.title, &actor.id)
            .await?;
        self.merge_generated_content(&graph_id, &delta, actor).await
    }

    /// Grow the map around a focus concept, optionally grounded in
    /// document text.
    pub async fn expand_node(
        &self,
        graph_id: &GraphId,
        focus: &str,
        document_context: Option<&str>,
        actor: &Actor,
    ) -> EngineResult<MergeResult> {
        self.require_graph(graph_id)?;
        let instruction = expand_instruction(focus, document_context, self.config.context_char_limit);
        self.generate(
            GenerateRequest::new(instruction).for_graph(graph_id.clone()),
            actor,
        )
        .await
    }

    /// Rework an existing graph according to feedback
    pub async fn refine(
        &self,
        graph_id: &GraphId,
        feedback: &str,
        actor: &Actor,
    ) -> EngineResult<MergeResult> {
        self.require_graph(graph_id)?;
        let current = assemble(&self.store.load_snapshot(graph_id)?);
        let generation = GenerationRequest::new(feedback).with_previous(current);
        let delta = self.call_generator(&generation).await?;
        self.merge_generated_content(graph_id, &delta, actor).await
    }

    async fn call_generator(&self, request: &GenerationRequest) -> EngineResult<ProposedDelta> {
        let generator = self.generator.as_ref().ok_or_else(|| {
            ExternalError::Unavailable("no content generator configured".to_string())
        })?;
        let raw = with_deadline(
            "generator",
            self.config.generator_timeout(),
            generator.generate(request),
        )
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "generator call failed");
            e
        })?;
        Ok(parse_generated(raw)?)
    }

    /// Plain text of an uploaded document
    pub async fn extract_text(&self, bytes: &[u8], mime_hint: &str) -> EngineResult<String> {
        let text = with_deadline(
            "extractor",
            self.config.extractor_timeout(),
            self.extractor.extract(bytes, mime_hint),
        )
        .await?;
        tracing::debug!(mime_hint, chars = text.chars().count(), "text extracted");
        Ok(text)
    }

    // --- Nodes ---

    /// Delete a node and its incident edges.
    ///
    /// Only the recorded owner may delete a node; nodes without an owner
    /// can be deleted by anyone.
    pub async fn delete_node(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        actor: &Actor,
    ) -> EngineResult<AssembledGraph> {
        let _section = self.enter(graph_id).await;

        self.require_graph(graph_id)?;
        let node = self
            .store
            .load_node(graph_id, node_id)?
            .ok_or_else(|| EngineError::NodeNotFound(node_id.clone()))?;
        if !node.deletable_by(&actor.id) {
            return Err(EngineError::PermissionDenied {
                actor: actor.id.clone(),
                node_id: node_id.clone(),
            });
        }

        self.store.delete_node(graph_id, node_id)?;
        let (sequence, graph) = self.record_and_publish(graph_id, actor)?;
        tracing::info!(graph_id = %graph_id, node_id = %node_id, sequence, "node deleted");
        Ok(graph)
    }

    /// Append a comment to a node
    pub async fn add_comment(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        actor: &Actor,
        text: &str,
    ) -> EngineResult<AssembledGraph> {
        let _section = self.enter(graph_id).await;

        self.require_graph(graph_id)?;
        let comment = Comment::new(actor.id.clone(), text);
        if !self.store.append_comment(graph_id, node_id, &comment)? {
            return Err(EngineError::NodeNotFound(node_id.clone()));
        }
        let (_, graph) = self.record_and_publish(graph_id, actor)?;
        Ok(graph)
    }

    // --- History ---

    pub async fn undo(&self, graph_id: &GraphId, actor: &Actor) -> EngineResult<AssembledGraph> {
        let _section = self.enter(graph_id).await;

        let version = VersionHistory::new(self.store.as_ref()).undo(graph_id)?;
        self.publish_restored(graph_id, version.sequence, &version.snapshot, actor)
    }

    pub async fn redo(&self, graph_id: &GraphId, actor: &Actor) -> EngineResult<AssembledGraph> {
        let _section = self.enter(graph_id).await;

        let version = VersionHistory::new(self.store.as_ref()).redo(graph_id)?;
        self.publish_restored(graph_id, version.sequence, &version.snapshot, actor)
    }

    /// Jump to any version of the graph's chain without recording a new one
    pub async fn restore_version(
        &self,
        graph_id: &GraphId,
        version_id: &VersionId,
        actor: &Actor,
    ) -> EngineResult<AssembledGraph> {
        let _section = self.enter(graph_id).await;

        let version =
            VersionHistory::new(self.store.as_ref()).restore_version(graph_id, version_id)?;
        tracing::info!(graph_id = %graph_id, sequence = version.sequence, "version restored");
        self.publish_restored(graph_id, version.sequence, &version.snapshot, actor)
    }

    fn publish_restored(
        &self,
        graph_id: &GraphId,
        sequence: u64,
        snapshot: &GraphSnapshot,
        actor: &Actor,
    ) -> EngineResult<AssembledGraph> {
        let graph = assemble(snapshot);
        self.publish(graph_id, Some(sequence), &graph, actor)?;
        Ok(graph)
    }

    pub fn list_versions(&self, graph_id: &GraphId) -> EngineResult<Vec<VersionSummary>> {
        Ok(VersionHistory::new(self.store.as_ref()).list_versions(graph_id)?)
    }

    /// Pretty-printed JSON of the assembled graph
    pub fn export(&self, graph_id: &GraphId) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(&self.get_graph(graph_id)?)?)
    }

    // --- Collaboration ---

    pub fn subscribe(&self, graph_id: &GraphId, listener: Listener) -> ListenerId {
        self.broadcaster.subscribe(graph_id, listener)
    }

    pub fn unsubscribe(&self, graph_id: &GraphId, listener_id: &ListenerId) -> bool {
        self.broadcaster.unsubscribe(graph_id, listener_id)
    }
}

/// Exclusive section of one graph.
///
/// On drop the lock is released and its registry entry removed if no other
/// task holds or waits on it. The check runs under the map's shard lock, so
/// a concurrent `lock_for` either sees the old entry or creates the only one.
struct GraphSection<'a> {
    locks: &'a DashMap<GraphId, Arc<Mutex<()>>>,
    graph_id: GraphId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for GraphSection<'_> {
    fn drop(&mut self) {
        // The guard owns a clone of the Arc; release it before counting
        self.guard.take();
        self.locks
            .remove_if(&self.graph_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Validate generator output, which may be a JSON object or raw text
fn parse_generated(raw: Value) -> Result<ProposedDelta, EngineError> {
    let delta = match raw {
        Value::String(text) => ProposedDelta::from_text(&text),
        other => ProposedDelta::from_value(other),
    };
    delta.map_err(|e| {
        tracing::warn!(error = %e, "generator output rejected");
        EngineError::InvalidDelta(e)
    })
}

fn expand_instruction(focus: &str, document_context: Option<&str>, limit: usize) -> String {
    let mut instruction = if focus.starts_with(EXPAND_PREFIX) {
        focus.to_string()
    } else {
        format!("{}{}", EXPAND_PREFIX, focus)
    };
    if let Some(context) = document_context.filter(|c| !c.trim().is_empty()) {
        let excerpt: String = context.chars().take(limit).collect();
        instruction.push_str("\n\nDocument context:\n");
        instruction.push_str(&excerpt);
    }
    instruction
}
