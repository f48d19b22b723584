//! Storage backends for cogmap
//!
//! The engine talks to persistence through the `GraphStore` trait.
//! The primary implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    ChangeSet, GraphStore, NodePatch, OpenStore, StorageError, StorageResult, VersionHeader,
};
