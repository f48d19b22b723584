//! Serialization and invariant tests for the graph types

use serde_json::{json, Value};

/// Comment as written by older clients (snake_case author key)
fn legacy_comment_fixture() -> Value {
    json!({
        "user_id": "u1",
        "text": "needs a source",
        "timestamp": "2025-03-01T10:00:00Z"
    })
}

#[cfg(test)]
mod serialization_tests {
    use super::*;
    use crate::graph::{ActorId, Comment, Edge, GraphId, GraphSnapshot, Node, NodeId};

    #[test]
    fn node_id_serializes_as_string() {
        let id = NodeId::from_string("n1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"n1\"");
    }

    #[test]
    fn fresh_ids_are_unique() {
        assert_ne!(NodeId::new(), NodeId::new());
        assert_ne!(GraphId::new(), GraphId::new());
    }

    #[test]
    fn comment_uses_camel_case_author_key() {
        let c = Comment::new(ActorId::new("u1"), "hello");
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["actorId"], "u1");
        assert!(v.get("actor_id").is_none());
    }

    #[test]
    fn comment_accepts_legacy_author_key() {
        let c: Comment = serde_json::from_value(legacy_comment_fixture()).unwrap();
        assert_eq!(c.actor_id.as_str(), "u1");
        assert_eq!(c.text, "needs a source");
    }

    #[test]
    fn unowned_node_is_deletable_by_anyone() {
        let node = Node::new(GraphId::new());
        assert!(node.deletable_by(&ActorId::new("anyone")));
    }

    #[test]
    fn owned_node_is_deletable_only_by_owner() {
        let node = Node::new(GraphId::new()).with_owner(ActorId::new("u1"));
        assert!(node.deletable_by(&ActorId::new("u1")));
        assert!(!node.deletable_by(&ActorId::new("u2")));
    }

    #[test]
    fn snapshot_drops_dangling_edges() {
        let g = GraphId::new();
        let a = Node::new(g.clone()).with_label("A");
        let b = Node::new(g.clone()).with_label("B");
        let good = Edge::new(g.clone(), a.id.clone(), b.id.clone());
        let bad = Edge::new(g.clone(), a.id.clone(), NodeId::from_string("ghost"));

        let snapshot = GraphSnapshot::new(vec![a, b], vec![good.clone(), bad.clone()]);
        let (clean, dropped) = snapshot.without_dangling_edges();

        assert_eq!(clean.edges, vec![good]);
        assert_eq!(dropped, vec![bad]);
        assert_eq!(clean.nodes.len(), 2);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let g = GraphId::new();
        let a = Node::new(g.clone()).with_label("A").with_owner(ActorId::new("u1"));
        let snapshot = GraphSnapshot::new(vec![a], vec![]);
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: GraphSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
