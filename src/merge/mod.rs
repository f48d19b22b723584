//! Merge reconciler: integrates generator proposals into the graph store

mod delta;
mod reconciler;

pub use delta::{extract_json, DeltaError, ProposedDelta, ProposedEdge, ProposedNode};
pub use reconciler::{
    ConsistencyViolation, IdentifierMap, MergeOutcome, MergePlan, MergeReconciler,
};
