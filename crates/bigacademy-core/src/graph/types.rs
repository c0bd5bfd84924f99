//! Property graph types
//!
//! Nodes and edges carry a type tag and an open attribute bag. Type tags are
//! closed enums with an `Other` variant so unknown tags read from storage
//! survive a round trip.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Attribute bag attached to nodes, edges and sessions
pub type Properties = serde_json::Map<String, Value>;

/// Types of graph nodes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum NodeType {
    /// An agent persona that learns from sources
    Agent,
    /// An extracted source (repository, document set)
    Source,
    /// One unit of extracted content
    KnowledgeChunk,
    /// A technology named by an agent profile
    Technology,
    /// A skill category from an agent's knowledge filters
    Skill,
    /// Any other tag
    Other(String),
}

impl NodeType {
    /// Get the string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Agent => "Agent",
            Self::Source => "Source",
            Self::KnowledgeChunk => "KnowledgeChunk",
            Self::Technology => "Technology",
            Self::Skill => "Skill",
            Self::Other(tag) => tag,
        }
    }

    /// Parse from string. Known tags never become `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "Agent" => Self::Agent,
            "Source" => Self::Source,
            "KnowledgeChunk" => Self::KnowledgeChunk,
            "Technology" => Self::Technology,
            "Skill" => Self::Skill,
            other => Self::Other(other.to_string()),
        }
    }

    /// Get all built-in node types
    pub fn builtin() -> &'static [NodeType] {
        &[
            Self::Agent,
            Self::Source,
            Self::KnowledgeChunk,
            Self::Technology,
            Self::Skill,
        ]
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<NodeType> for String {
    fn from(t: NodeType) -> Self {
        t.as_str().to_string()
    }
}

/// Types of relationships between nodes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum RelationshipType {
    /// Agent extracted knowledge from a source
    ExtractsFrom,
    /// Source contains a knowledge chunk
    Contains,
    /// Agent learns from a knowledge chunk
    LearnsFrom,
    /// Agent requires a technology
    Requires,
    /// Knowledge chunk implements a technology
    Implements,
    /// Agent specializes in a skill
    SpecializesIn,
    /// Knowledge chunk demonstrates a skill
    Demonstrates,
    /// Any other tag
    Other(String),
}

impl RelationshipType {
    /// Get the string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::ExtractsFrom => "EXTRACTS_FROM",
            Self::Contains => "CONTAINS",
            Self::LearnsFrom => "LEARNS_FROM",
            Self::Requires => "REQUIRES",
            Self::Implements => "IMPLEMENTS",
            Self::SpecializesIn => "SPECIALIZES_IN",
            Self::Demonstrates => "DEMONSTRATES",
            Self::Other(tag) => tag,
        }
    }

    /// Parse from string. Known tags never become `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "EXTRACTS_FROM" => Self::ExtractsFrom,
            "CONTAINS" => Self::Contains,
            "LEARNS_FROM" => Self::LearnsFrom,
            "REQUIRES" => Self::Requires,
            "IMPLEMENTS" => Self::Implements,
            "SPECIALIZES_IN" => Self::SpecializesIn,
            "DEMONSTRATES" => Self::Demonstrates,
            other => Self::Other(other.to_string()),
        }
    }

    /// Get all built-in relationship types
    pub fn builtin() -> &'static [RelationshipType] {
        &[
            Self::ExtractsFrom,
            Self::Contains,
            Self::LearnsFrom,
            Self::Requires,
            Self::Implements,
            Self::SpecializesIn,
            Self::Demonstrates,
        ]
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for RelationshipType {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for RelationshipType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<RelationshipType> for String {
    fn from(t: RelationshipType) -> Self {
        t.as_str().to_string()
    }
}

/// Direction for relationship lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Edges whose source is the node
    Outgoing,
    /// Edges whose target is the node
    Incoming,
    /// Edges whose source or target is the node
    #[default]
    Both,
}

/// A node in the property graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub node_type: NodeType,
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Look up a property
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Look up a string property
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Whether every filter entry equals the node's value; a missing key reads as null
    pub fn matches(&self, filter: &Properties) -> bool {
        filter
            .iter()
            .all(|(key, expected)| self.properties.get(key).unwrap_or(&Value::Null) == expected)
    }
}

/// A directed, typed, weighted edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: RelationshipType,
    pub properties: Properties,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of one ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_name: String,
    pub source_id: String,
    pub source_type: String,
    pub total_chunks: u64,
    pub total_tokens: u64,
    pub extraction_metadata: Properties,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session record with a generated id
    pub fn new(
        agent_name: impl Into<String>,
        source_id: impl Into<String>,
        source_type: impl Into<String>,
        total_chunks: u64,
        total_tokens: u64,
        extraction_metadata: Properties,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_name: agent_name.into(),
            source_id: source_id.into(),
            source_type: source_type.into(),
            total_chunks,
            total_tokens,
            extraction_metadata,
            created_at: Utc::now(),
        }
    }
}

/// Knowledge totals for one agent, summed over its sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatistics {
    pub session_count: u64,
    pub total_chunks: u64,
    pub total_tokens: u64,
}

/// Graph-wide counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub node_counts: BTreeMap<NodeType, u64>,
    pub edge_counts: BTreeMap<RelationshipType, u64>,
    /// Present when statistics were requested for an agent
    pub agent: Option<AgentStatistics>,
}

impl GraphStatistics {
    /// Number of nodes of a type
    pub fn nodes_of(&self, node_type: &NodeType) -> u64 {
        self.node_counts.get(node_type).copied().unwrap_or(0)
    }

    /// Number of edges of a type
    pub fn edges_of(&self, relationship_type: &RelationshipType) -> u64 {
        self.edge_counts.get(relationship_type).copied().unwrap_or(0)
    }

    pub fn total_nodes(&self) -> u64 {
        self.node_counts.values().sum()
    }

    pub fn total_edges(&self) -> u64 {
        self.edge_counts.values().sum()
    }
}

/// Fixed-width UTC timestamp; lexical order equals chronological order
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str, record: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::CorruptRecord(format!("{}: bad timestamp '{}': {}", record, raw, e)))
}

/// Convert a `json!({...})` literal into a property bag
pub fn properties(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        Value::Null => Properties::new(),
        other => {
            let mut map = Properties::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
