//! Node/edge types, the node-type whitelist, and the identifier convention.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{NoemaError, NoemaResult};

/// The whitelisted node types, plus an `Other` escape hatch.
///
/// Programmatic construction (`NodeType::parse`) enforces the whitelist, but a
/// loaded dump may legitimately contain a type tag from a future version; those
/// round-trip through `Other` instead of failing the load outright.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeType {
    Concept,
    Event,
    Action,
    Rule,
    Emotion,
    Personality,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Concept => "Concept",
            NodeType::Event => "Event",
            NodeType::Action => "Action",
            NodeType::Rule => "Rule",
            NodeType::Emotion => "Emotion",
            NodeType::Personality => "Personality",
            NodeType::Other(tag) => tag,
        }
    }

    /// Parse a type tag, enforcing the whitelist.
    pub fn parse(s: &str) -> NoemaResult<Self> {
        Ok(match s {
            "Concept" => NodeType::Concept,
            "Event" => NodeType::Event,
            "Action" => NodeType::Action,
            "Rule" => NodeType::Rule,
            "Emotion" => NodeType::Emotion,
            "Personality" => NodeType::Personality,
            other => return Err(NoemaError::invalid_node_type(other)),
        })
    }

    /// Parse a type tag without whitelist enforcement, for loading a dump.
    fn from_tag(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|_| NodeType::Other(s.to_string()))
    }
}

impl Serialize for NodeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(D::Error::custom("node type tag must not be empty"));
        }
        Ok(NodeType::from_tag(&s))
    }
}

/// Whether a node belongs to the semantic or episodic store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Semantic,
    Episodic,
}

/// A single node in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub base_weight: f64,
    pub memory_type: MemoryType,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType, base_weight: f64, memory_type: MemoryType) -> Self {
        Self {
            id: id.into(),
            node_type,
            base_weight,
            memory_type,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name").and_then(Value::as_str)
    }
}

/// A directed edge between two nodes. `relation` is free-form data (UPPER_SNAKE_CASE
/// by convention), not an enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub src: String,
    pub dst: String,
    pub relation: String,
    pub weight: f64,
}

/// Normalize a concept name: trim, lowercase, drop a trailing plural `s`
/// (but not `ss`), then title-case each whitespace-separated token.
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim().to_lowercase();
    let singular = if trimmed.ends_with('s') && !trimmed.ends_with("ss") {
        &trimmed[..trimmed.len() - 1]
    } else {
        trimmed.as_str()
    };

    singular
        .split_whitespace()
        .map(title_case_token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_token(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Generate a deterministic node id: `<Type>_<NormalizedUnderscoredName>_<8-hex-md5>`.
pub fn generate_node_id(name: &str, node_type: NodeType) -> String {
    let normalized = normalize_name(name).replace(' ', "_");
    let digest = format!("{:x}", md5::compute(normalized.as_bytes()));
    let suffix = &digest[..8];
    format!("{}_{}_{}", node_type.as_str(), normalized, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_trailing_plural_s() {
        assert_eq!(normalize_name("cats"), "Cat");
        assert_eq!(normalize_name("  glass "), "Glass");
        assert_eq!(normalize_name("CAT"), "Cat");
    }

    #[test]
    fn normalize_title_cases_multiple_tokens() {
        assert_eq!(normalize_name("big red dogs"), "Big Red Dog");
    }

    #[test]
    fn generate_node_id_is_deterministic() {
        let a = generate_node_id("cats", NodeType::Concept);
        let b = generate_node_id("Cat", NodeType::Concept);
        assert_eq!(a, b);
        assert!(a.starts_with("Concept_Cat_"));
        assert_eq!(a.len(), "Concept_Cat_".len() + 8);
    }

    #[test]
    fn node_type_parse_rejects_unknown() {
        assert!(NodeType::parse("Widget").is_err());
        assert!(matches!(NodeType::parse("Action"), Ok(NodeType::Action)));
    }
}
