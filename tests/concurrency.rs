//! Concurrency: per-graph serialization of commit, snapshot and broadcast
//!
//! Concurrent merges on one graph must all land, each strictly after the
//! other; merges on different graphs proceed independently.
//!
//! Run with: `cargo test --test concurrency`

mod common;

use cogmap::{BroadcastMessage, GraphEngine, Listener, ProposedDelta, ProposedNode};
use common::{actor, delta, engine, new_graph};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_merges_on_one_graph_all_land() {
    let engine: Arc<GraphEngine> = Arc::new(engine());
    let g = new_graph(&engine, "u1").await;
    let (listener, mut rx) = Listener::channel();
    engine.subscribe(&g, listener);

    let mut tasks = JoinSet::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        let g = g.clone();
        tasks.spawn(async move {
            let transient = format!("t{}", i);
            let label = format!("concept {}", i);
            engine
                .merge_generated_content(
                    &g,
                    &delta(&[(transient.as_str(), label.as_str())], &[]),
                    &actor(&format!("user{}", i)),
                )
                .await
                .map(|r| r.sequence)
        });
    }

    let mut sequences = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        sequences.insert(joined.unwrap().unwrap());
    }

    // Every merge got its own version and none was lost
    assert_eq!(sequences.len(), 16);
    assert_eq!(engine.get_graph(&g).unwrap().nodes.len(), 16);
    assert_eq!(engine.list_versions(&g).unwrap().len(), 17);

    // The listener saw them in strictly increasing order
    let mut seen = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let BroadcastMessage::Update { sequence, graph, .. } = msg.as_ref() {
            seen.push((sequence.unwrap(), graph.nodes.len()));
        }
    }
    assert_eq!(seen.len(), 16);
    assert!(seen.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 < w[1].1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_patches_to_same_node_are_not_lost() {
    let engine: Arc<GraphEngine> = Arc::new(engine());
    let g = new_graph(&engine, "u1").await;
    let first = engine
        .merge_generated_content(&g, &delta(&[("a", "A")], &[]), &actor("u1"))
        .await
        .unwrap();
    let a = first.id_map.resolve("a").unwrap().clone();

    let describe = {
        let engine = Arc::clone(&engine);
        let (g, a) = (g.clone(), a.clone());
        tokio::spawn(async move {
            let delta = ProposedDelta::new()
                .with_node(ProposedNode::new(a.as_str()).with_description("light reactions"));
            engine.merge_generated_content(&g, &delta, &actor("u2")).await
        })
    };
    let colour = {
        let engine = Arc::clone(&engine);
        let (g, a) = (g.clone(), a.clone());
        tokio::spawn(async move {
            let delta = ProposedDelta::new()
                .with_node(ProposedNode::new(a.as_str()).with_color("#77DD77"));
            engine.merge_generated_content(&g, &delta, &actor("u3")).await
        })
    };
    let (d, c) = (describe.await.unwrap().unwrap(), colour.await.unwrap().unwrap());
    assert_ne!(d.sequence, c.sequence);

    let state = engine.get_graph(&g).unwrap();
    let node = state.node(&a).unwrap();
    assert_eq!(node.description.as_deref(), Some("light reactions"));
    assert_eq!(node.color.as_deref(), Some("#77DD77"));
    assert_eq!(state.nodes.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_graphs_proceed_independently() {
    let engine: Arc<GraphEngine> = Arc::new(engine());
    let mut graphs = Vec::new();
    for _ in 0..4 {
        graphs.push(new_graph(&engine, "u1").await);
    }

    let mut tasks = JoinSet::new();
    for g in graphs.clone() {
        for i in 0..4 {
            let engine = Arc::clone(&engine);
            let g = g.clone();
            tasks.spawn(async move {
                let t = format!("n{}", i);
                engine
                    .merge_generated_content(&g, &delta(&[(t.as_str(), "x")], &[]), &actor("u1"))
                    .await
                    .map(|_| ())
            });
        }
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    for g in &graphs {
        assert_eq!(engine.get_graph(g).unwrap().nodes.len(), 4);
        let sequences: Vec<u64> = engine
            .list_versions(g)
            .unwrap()
            .iter()
            .map(|v| v.sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    }
}
