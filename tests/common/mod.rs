//! Common test utilities for cogmap integration tests
//!
//! Engines over in-memory stores, delta builders and a scripted generator.

#![allow(dead_code)]

use cogmap::{
    Actor, ActorId, GraphEngine, GraphId, MockGenerator, OpenStore, ProposedDelta, ProposedEdge,
    ProposedNode, SqliteStore,
};
use serde_json::Value;
use std::sync::Arc;

/// Engine over a fresh in-memory store
pub fn engine() -> GraphEngine {
    GraphEngine::new(Arc::new(
        SqliteStore::open_in_memory().expect("in-memory store"),
    ))
}

/// Engine whose generator replays `responses` in order
pub fn scripted_engine(responses: Vec<Value>) -> (GraphEngine, Arc<MockGenerator>) {
    let generator = responses
        .into_iter()
        .fold(MockGenerator::available(), |g, r| g.with_response(r));
    let generator = Arc::new(generator);
    (engine().with_generator(generator.clone()), generator)
}

/// Create an empty titled graph owned by `owner`
pub async fn new_graph(engine: &GraphEngine, owner: &str) -> GraphId {
    engine
        .create_or_load_graph(None, Some("Test map".into()), &ActorId::new(owner))
        .await
        .expect("create graph")
}

/// Delta from `(transient id, label)` nodes and `(from, to)` edges
pub fn delta(nodes: &[(&str, &str)], edges: &[(&str, &str)]) -> ProposedDelta {
    let delta = nodes.iter().fold(ProposedDelta::new(), |d, (id, label)| {
        d.with_node(ProposedNode::new(*id).with_label(*label))
    });
    edges
        .iter()
        .fold(delta, |d, (from, to)| d.with_edge(ProposedEdge::new(*from, *to)))
}

pub fn actor(id: &str) -> Actor {
    Actor::new(id)
}

/// Canonical JSON of a graph's current state
pub fn state_json(engine: &GraphEngine, graph_id: &GraphId) -> String {
    serde_json::to_string(&engine.get_graph(graph_id).expect("graph")).expect("json")
}
