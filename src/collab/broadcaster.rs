//! Per-graph listener registry and best-effort fan-out

use super::message::BroadcastMessage;
use crate::graph::GraphId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// Identifies one connected collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(String);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving half handed to the collaborator's connection task
pub type ListenerReceiver = UnboundedReceiver<Arc<BroadcastMessage>>;

/// Sending half kept in the registry
#[derive(Debug, Clone)]
pub struct Listener {
    id: ListenerId,
    sender: UnboundedSender<Arc<BroadcastMessage>>,
}

impl Listener {
    pub fn new(sender: UnboundedSender<Arc<BroadcastMessage>>) -> Self {
        Self {
            id: ListenerId::new(),
            sender,
        }
    }

    /// A listener and the receiver its messages arrive on
    pub fn channel() -> (Self, ListenerReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> &ListenerId {
        &self.id
    }

    fn push(&self, message: Arc<BroadcastMessage>) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub delivered: usize,
    pub skipped: usize,
    pub stale: usize,
}

/// Registry of listeners keyed by graph id.
///
/// Collaboration state lives only in memory and starts empty.
#[derive(Debug, Default)]
pub struct Broadcaster {
    rooms: DashMap<GraphId, HashMap<ListenerId, Listener>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for a graph
    pub fn subscribe(&self, graph_id: &GraphId, listener: Listener) -> ListenerId {
        let id = listener.id().clone();
        self.rooms
            .entry(graph_id.clone())
            .or_default()
            .insert(id.clone(), listener);
        tracing::debug!(graph_id = %graph_id, listener_id = %id, "listener subscribed");
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, graph_id: &GraphId, listener_id: &ListenerId) -> bool {
        let removed = match self.rooms.get_mut(graph_id) {
            Some(mut room) => room.remove(listener_id).is_some(),
            None => false,
        };
        self.collect_if_empty(graph_id);
        if removed {
            tracing::debug!(graph_id = %graph_id, listener_id = %listener_id, "listener unsubscribed");
        }
        removed
    }

    /// Push `message` to every listener of its graph, optionally skipping one.
    ///
    /// A failed push marks that listener stale; it is dropped after the
    /// fan-out and never affects delivery to the others.
    pub fn broadcast(
        &self,
        message: BroadcastMessage,
        exclude: Option<&ListenerId>,
    ) -> BroadcastStats {
        let graph_id = message.graph_id().clone();
        let message = Arc::new(message);
        let mut stats = BroadcastStats::default();
        let mut stale = Vec::new();

        if let Some(room) = self.rooms.get(&graph_id) {
            for (id, listener) in room.iter() {
                if exclude == Some(id) {
                    stats.skipped += 1;
                    continue;
                }
                if listener.push(Arc::clone(&message)) {
                    stats.delivered += 1;
                } else {
                    tracing::warn!(graph_id = %graph_id, listener_id = %id, "push failed, listener is stale");
                    stale.push(id.clone());
                }
            }
        }
        stats.stale = stale.len();

        if !stale.is_empty() {
            if let Some(mut room) = self.rooms.get_mut(&graph_id) {
                for id in &stale {
                    room.remove(id);
                }
            }
            self.collect_if_empty(&graph_id);
        }
        stats
    }

    /// Drop every listener of a graph, closing their channels
    pub fn close(&self, graph_id: &GraphId) -> usize {
        self.rooms
            .remove(graph_id)
            .map(|(_, room)| room.len())
            .unwrap_or(0)
    }

    pub fn listener_count(&self, graph_id: &GraphId) -> usize {
        self.rooms.get(graph_id).map(|r| r.len()).unwrap_or(0)
    }

    /// Number of graphs with at least one listener
    pub fn graph_count(&self) -> usize {
        self.rooms.len()
    }

    fn collect_if_empty(&self, graph_id: &GraphId) {
        self.rooms.remove_if(graph_id, |_, room| room.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::AssembledGraph;

    fn update(graph_id: &GraphId, sequence: u64) -> BroadcastMessage {
        BroadcastMessage::Update {
            graph_id: graph_id.clone(),
            title: None,
            sequence: Some(sequence),
            graph: AssembledGraph::default(),
        }
    }

    #[test]
    fn delivers_to_every_listener_of_the_graph() {
        let broadcaster = Broadcaster::new();
        let g = GraphId::from("g");
        let (a, mut rx_a) = Listener::channel();
        let (b, mut rx_b) = Listener::channel();
        broadcaster.subscribe(&g, a);
        broadcaster.subscribe(&g, b);

        let stats = broadcaster.broadcast(update(&g, 1), None);
        assert_eq!(stats.delivered, 2);
        assert_eq!(rx_a.try_recv().unwrap().sequence(), Some(1));
        assert_eq!(rx_b.try_recv().unwrap().sequence(), Some(1));
    }

    #[test]
    fn other_graphs_are_not_notified() {
        let broadcaster = Broadcaster::new();
        let (a, mut rx_a) = Listener::channel();
        broadcaster.subscribe(&GraphId::from("g1"), a);

        broadcaster.broadcast(update(&GraphId::from("g2"), 1), None);
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn origin_can_be_excluded() {
        let broadcaster = Broadcaster::new();
        let g = GraphId::from("g");
        let (a, mut rx_a) = Listener::channel();
        let (b, mut rx_b) = Listener::channel();
        let origin = broadcaster.subscribe(&g, a);
        broadcaster.subscribe(&g, b);

        let stats = broadcaster.broadcast(update(&g, 1), Some(&origin));
        assert_eq!(stats.skipped, 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn stale_listener_is_removed_without_affecting_others() {
        let broadcaster = Broadcaster::new();
        let g = GraphId::from("g");
        let (a, rx_a) = Listener::channel();
        let (b, mut rx_b) = Listener::channel();
        broadcaster.subscribe(&g, a);
        broadcaster.subscribe(&g, b);
        drop(rx_a);

        let stats = broadcaster.broadcast(update(&g, 1), None);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.stale, 1);
        assert_eq!(broadcaster.listener_count(&g), 1);
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn empty_room_is_collected() {
        let broadcaster = Broadcaster::new();
        let g = GraphId::from("g");
        let (a, rx_a) = Listener::channel();
        let id = broadcaster.subscribe(&g, a);
        assert_eq!(broadcaster.graph_count(), 1);

        assert!(broadcaster.unsubscribe(&g, &id));
        assert_eq!(broadcaster.graph_count(), 0);
        assert!(!broadcaster.unsubscribe(&g, &id));
        drop(rx_a);

        let (b, rx_b) = Listener::channel();
        broadcaster.subscribe(&g, b);
        drop(rx_b);
        broadcaster.broadcast(update(&g, 2), None);
        assert_eq!(broadcaster.graph_count(), 0);
    }

    #[test]
    fn close_drops_all_listeners() {
        let broadcaster = Broadcaster::new();
        let g = GraphId::from("g");
        let (a, mut rx_a) = Listener::channel();
        broadcaster.subscribe(&g, a);

        assert_eq!(broadcaster.close(&g), 1);
        assert_eq!(broadcaster.listener_count(&g), 0);
        // Sender dropped: channel reports disconnection
        assert!(matches!(
            rx_a.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
