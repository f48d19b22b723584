//! The engine: per-graph serialized operations over store, history and
//! broadcaster.

mod error;
mod graph_engine;


pub use error::{EngineError, EngineResult};
pub use graph_engine::{Actor, GenerateRequest, GraphEngine, GraphSummary, MergeResult};
