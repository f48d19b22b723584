//! Cogmap: Collaborative Knowledge-Graph Engine
//!
//! Keeps concept maps (concepts as nodes, relations as edges) in a relational
//! store, folds in incremental deltas proposed by an external content
//! generator, versions every edit on a linear undo/redo chain, and pushes
//! each new state to every connected collaborator.
//!
//! # Core Concepts
//!
//! - **Graphs**: titled, owned collections of nodes and edges with a version chain
//! - **Deltas**: generator proposals naming nodes by transient ids
//! - **Versions**: immutable, sequence-numbered snapshots for undo/redo
//! - **Listeners**: in-process handles that receive state after each change
//!
//! # Example
//!
//! ```
//! use cogmap::{GraphEngine, OpenStore, SqliteStore};
//! use std::sync::Arc;
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! let engine = GraphEngine::new(Arc::new(store));
//! assert!(engine.list_graphs().unwrap().is_empty());
//! ```

pub mod assembler;
pub mod collab;
pub mod config;
pub mod engine;
pub mod external;
mod graph;
pub mod history;
pub mod merge;
pub mod storage;

pub use assembler::{assemble, disassemble, AssembledGraph, WireEdge, WireNode};
pub use collab::{BroadcastMessage, Broadcaster, Listener, ListenerId, ListenerReceiver};
pub use config::{CommandSpec, ConfigError, EngineConfig};
pub use engine::{
    Actor, EngineError, EngineResult, GenerateRequest, GraphEngine, GraphSummary, MergeResult,
};
pub use external::{
    CommandGenerator, ContentExtractor, ContentGenerator, ExternalError, GenerationRequest,
    MockExtractor, MockGenerator, PlainTextExtractor,
};
pub use graph::{
    ActorId, Comment, Edge, EdgeId, GraphId, GraphSnapshot, KnowledgeGraph, Node, NodeId,
    Version, VersionId,
};
pub use history::{Direction, VersionHistory, VersionSummary};
pub use merge::{
    ConsistencyViolation, DeltaError, IdentifierMap, MergeReconciler, ProposedDelta,
    ProposedEdge, ProposedNode,
};
pub use storage::{GraphStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
