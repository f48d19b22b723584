//! Core graph data structures

mod edge;
mod knowledge;
mod node;
mod version;

#[cfg(test)]
mod tests;

pub use edge::{Edge, EdgeId};
pub use knowledge::{GraphId, KnowledgeGraph};
pub use node::{ActorId, Comment, Node, NodeId};
pub use version::{GraphSnapshot, Version, VersionId};
