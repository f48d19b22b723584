//! Proposed deltas from the content generator
//!
//! A delta names nodes by transient ids that only mean something inside
//! the delta itself, unless they quote a persistent id of the target graph.

use crate::graph::Comment;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why a proposed delta was rejected before touching the store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeltaError {
    #[error("generator output is not a JSON object")]
    NotAnObject,
    #[error("generator output is missing the '{0}' key")]
    MissingKey(&'static str),
    #[error("node #{0} has an empty id")]
    EmptyNodeId(usize),
    #[error("malformed delta: {0}")]
    Malformed(String),
}

/// Accept string or numeric ids; generators emit both.
fn scalar_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected a string id, got {}", other))),
    }
}

/// A node in a proposal. Absent fields mean "no change" on patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedNode {
    #[serde(deserialize_with = "scalar_id")]
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type", alias = "node_type")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Used verbatim on create, ignored on patch
    #[serde(default)]
    pub comments: Option<Vec<Comment>>,
}

impl ProposedNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            description: None,
            node_type: None,
            color: None,
            comments: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// An edge in a proposal, referencing nodes by transient id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedEdge {
    #[serde(deserialize_with = "scalar_id", alias = "source")]
    pub from: String,
    #[serde(deserialize_with = "scalar_id", alias = "target")]
    pub to: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl ProposedEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A validated proposal: `{nodes: [...], edges: [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposedDelta {
    pub nodes: Vec<ProposedNode>,
    pub edges: Vec<ProposedEdge>,
}

impl ProposedDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: ProposedNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: ProposedEdge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Validate raw generator output.
    ///
    /// Both `nodes` and `edges` keys must be present, and every node must
    /// carry a non-empty id.
    pub fn from_value(value: Value) -> Result<Self, DeltaError> {
        let object = value.as_object().ok_or(DeltaError::NotAnObject)?;
        if !object.contains_key("nodes") {
            return Err(DeltaError::MissingKey("nodes"));
        }
        if !object.contains_key("edges") {
            return Err(DeltaError::MissingKey("edges"));
        }

        let delta: ProposedDelta =
            serde_json::from_value(value).map_err(|e| DeltaError::Malformed(e.to_string()))?;

        if let Some(index) = delta.nodes.iter().position(|n| n.id.trim().is_empty()) {
            return Err(DeltaError::EmptyNodeId(index));
        }
        Ok(delta)
    }

    /// Validate generator output that arrived as free text
    pub fn from_text(text: &str) -> Result<Self, DeltaError> {
        let value = extract_json(text).ok_or(DeltaError::NotAnObject)?;
        Self::from_value(value)
    }
}

/// First JSON object in generator output.
///
/// Candidates are tried in order: the whole text, the body of the first
/// code fence (any language tag), then the span from the first `{` to the
/// last `}`.
pub fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();
    [Some(text), fenced_block(text), brace_span(text)]
        .into_iter()
        .flatten()
        .find_map(parse_object)
}

fn parse_object(candidate: &str) -> Option<Value> {
    serde_json::from_str::<Value>(candidate.trim())
        .ok()
        .filter(Value::is_object)
}

fn fenced_block(text: &str) -> Option<&str> {
    let rest = &text[text.find("```")? + 3..];
    // Skip the language tag line
    let body = &rest[rest.find('\n')? + 1..];
    body.find("```").map(|close| &body[..close])
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_well_formed_delta() {
        let delta = ProposedDelta::from_value(json!({
            "nodes": [
                {"id": "c1", "label": "Photosynthesis", "type": "main_concept", "color": "#FFB347", "comments": []},
                {"id": "c2", "label": "Chlorophyll"}
            ],
            "edges": [{"from": "c1", "to": "c2", "label": "requires"}]
        }))
        .unwrap();

        assert_eq!(delta.nodes.len(), 2);
        assert_eq!(delta.nodes[0].node_type.as_deref(), Some("main_concept"));
        assert_eq!(delta.nodes[0].comments, Some(vec![]));
        assert_eq!(delta.nodes[1].comments, None);
        assert_eq!(delta.edges[0].label.as_deref(), Some("requires"));
    }

    #[test]
    fn missing_nodes_key_is_rejected() {
        let err = ProposedDelta::from_value(json!({"edges": []})).unwrap_err();
        assert_eq!(err, DeltaError::MissingKey("nodes"));
    }

    #[test]
    fn missing_edges_key_is_rejected() {
        let err = ProposedDelta::from_value(json!({"nodes": []})).unwrap_err();
        assert_eq!(err, DeltaError::MissingKey("edges"));
    }

    #[test]
    fn node_without_id_is_rejected() {
        let err = ProposedDelta::from_value(json!({
            "nodes": [{"label": "orphan"}],
            "edges": []
        }))
        .unwrap_err();
        assert!(matches!(err, DeltaError::Malformed(_)));
    }

    #[test]
    fn node_with_blank_id_is_rejected() {
        let err = ProposedDelta::from_value(json!({
            "nodes": [{"id": "ok"}, {"id": "  "}],
            "edges": []
        }))
        .unwrap_err();
        assert_eq!(err, DeltaError::EmptyNodeId(1));
    }

    #[test]
    fn non_object_is_rejected() {
        let err = ProposedDelta::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(err, DeltaError::NotAnObject);
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let delta = ProposedDelta::from_value(json!({
            "nodes": [{"id": 1}, {"id": 2}],
            "edges": [{"from": 1, "to": 2}]
        }))
        .unwrap();
        assert_eq!(delta.nodes[0].id, "1");
        assert_eq!(delta.edges[0].to, "2");
    }

    #[test]
    fn from_text_handles_fenced_block() {
        let text = "Here is your map:\n```json\n{\"nodes\": [{\"id\": \"a\"}], \"edges\": []}\n```\nEnjoy!";
        let delta = ProposedDelta::from_text(text).unwrap();
        assert_eq!(delta.nodes[0].id, "a");
    }

    #[test]
    fn from_text_handles_surrounding_prose() {
        let text = "Sure! {\"nodes\": [], \"edges\": []} Hope that helps.";
        assert!(ProposedDelta::from_text(text).unwrap().nodes.is_empty());
    }

    #[test]
    fn fenced_block_wins_over_stray_braces() {
        let text = "Use {label} for names.\n```\n{\"nodes\": [{\"id\": \"b\"}], \"edges\": []}\n```\nDone {}";
        let value = extract_json(text).unwrap();
        assert_eq!(value["nodes"][0]["id"], "b");
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("[1, 2]").is_none());
    }

    #[test]
    fn from_text_without_json_is_rejected() {
        assert_eq!(
            ProposedDelta::from_text("I cannot help with that").unwrap_err(),
            DeltaError::NotAnObject
        );
    }
}
