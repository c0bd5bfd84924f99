//! Knowledge retrieval - the read path over the graph
//!
//! Walks `Agent -LEARNS_FROM-> Chunk` edges, filters by stored relevance and
//! resolves each chunk's provenance through `Source -CONTAINS-> Chunk`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::extraction::KnowledgeChunk;
use crate::graph::{Direction, Edge, GraphStore, Node, NodeType, Properties, RelationshipType};

/// Provenance label when no source node can be found
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Where a chunk came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub source_node_id: Option<String>,
    pub url: String,
    pub source_type: String,
    pub total_chunks: u64,
    pub total_tokens: u64,
}

impl SourceInfo {
    pub fn unknown() -> Self {
        Self {
            source_node_id: None,
            url: UNKNOWN_SOURCE.to_string(),
            source_type: UNKNOWN_SOURCE.to_string(),
            total_chunks: 0,
            total_tokens: 0,
        }
    }

    fn from_node(node: &Node) -> Self {
        let text = |key: &str| {
            node.str_property(key)
                .unwrap_or(UNKNOWN_SOURCE)
                .to_string()
        };
        let count = |key: &str| node.property(key).and_then(Value::as_u64).unwrap_or(0);

        Self {
            source_node_id: Some(node.id.clone()),
            url: text("url"),
            source_type: text("source_type"),
            total_chunks: count("total_chunks"),
            total_tokens: count("total_tokens"),
        }
    }
}

/// A chunk an agent learns from, with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub chunk: KnowledgeChunk,
    pub source: SourceInfo,
}

impl RetrievedChunk {
    pub fn relevance(&self) -> f64 {
        self.chunk.relevance_score
    }
}

/// An agent node together with everything it points at
#[derive(Debug, Clone)]
pub struct AgentNeighborhood {
    pub agent: Node,
    pub neighbors: Vec<(Edge, Node)>,
}

impl AgentNeighborhood {
    /// Neighbors reached through one relationship type
    pub fn neighbors_via<'a>(
        &'a self,
        relationship_type: &'a RelationshipType,
    ) -> impl Iterator<Item = &'a Node> + 'a {
        self.neighbors
            .iter()
            .filter(move |(edge, _)| &edge.relationship_type == relationship_type)
            .map(|(_, node)| node)
    }
}

/// Read-only queries over agent knowledge
#[derive(Debug, Clone)]
pub struct KnowledgeRetrieval {
    store: GraphStore,
}

impl KnowledgeRetrieval {
    pub fn new(store: GraphStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// First agent node with this name, by creation order
    pub async fn find_agent(&self, agent_name: &str) -> Result<Option<Node>> {
        let mut filter = Properties::new();
        filter.insert("name".to_string(), Value::String(agent_name.to_string()));
        self.store.find_node(&NodeType::Agent, &filter).await
    }

    /// Chunks the agent learns from with relevance at least `min_relevance`,
    /// most relevant first
    ///
    /// Equal relevance keeps ingestion order. An unknown agent yields an empty list.
    pub async fn get_agent_knowledge(
        &self,
        agent_name: &str,
        min_relevance: f64,
    ) -> Result<Vec<RetrievedChunk>> {
        let Some(agent) = self.find_agent(agent_name).await? else {
            debug!(agent = %agent_name, "No agent node, returning no knowledge");
            return Ok(Vec::new());
        };

        let learns = self
            .store
            .get_relationships(&agent.id, Some(&RelationshipType::LearnsFrom), Direction::Outgoing)
            .await?;

        let mut knowledge = Vec::with_capacity(learns.len());
        for edge in learns {
            let Some(node) = self.store.get_node(&edge.target_id).await? else {
                continue;
            };

            let chunk = KnowledgeChunk::from_properties(&node.properties);
            if chunk.relevance_score < min_relevance {
                continue;
            }

            let source = self.resolve_source(&node.id).await?;
            knowledge.push(RetrievedChunk {
                chunk_id: node.id,
                chunk,
                source,
            });
        }

        // stable: ties keep LEARNS_FROM creation order
        knowledge.sort_by(|a, b| b.relevance().total_cmp(&a.relevance()));

        debug!(
            agent = %agent_name,
            min_relevance,
            chunks = knowledge.len(),
            "Retrieved agent knowledge"
        );
        Ok(knowledge)
    }

    /// Provenance from the earliest `CONTAINS` edge whose source is a Source node
    async fn resolve_source(&self, chunk_id: &str) -> Result<SourceInfo> {
        let contains = self
            .store
            .get_relationships(chunk_id, Some(&RelationshipType::Contains), Direction::Incoming)
            .await?;

        for edge in contains {
            if let Some(node) = self.store.get_node(&edge.source_id).await? {
                if node.node_type == NodeType::Source {
                    return Ok(SourceInfo::from_node(&node));
                }
            }
        }

        Ok(SourceInfo::unknown())
    }

    /// The agent node with all its outgoing edges and their targets
    pub async fn agent_neighborhood(&self, agent_name: &str) -> Result<Option<AgentNeighborhood>> {
        let Some(agent) = self.find_agent(agent_name).await? else {
            return Ok(None);
        };

        let edges = self
            .store
            .get_relationships(&agent.id, None, Direction::Outgoing)
            .await?;

        let mut neighbors = Vec::with_capacity(edges.len());
        for edge in edges {
            if let Some(node) = self.store.get_node(&edge.target_id).await? {
                neighbors.push((edge, node));
            }
        }

        Ok(Some(AgentNeighborhood { agent, neighbors }))
    }
}
