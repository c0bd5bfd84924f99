//! Ingestion - turning one extraction result into graph mutations
//!
//! For each ingestion call the pipeline writes, in order:
//!
//! 1. a session audit record
//! 2. the agent node (looked up by name, created on first sight)
//! 3. a source node, linked `Agent -EXTRACTS_FROM-> Source`
//! 4. per chunk: a chunk node, `Source -CONTAINS-> Chunk` and
//!    `Agent -LEARNS_FROM-> Chunk`, both weighted by relevance
//! 5. per chunk: technologies mentioned in the text (`IMPLEMENTS`) and skill
//!    categories whose keyword score clears the threshold (`DEMONSTRATES`)
//!
//! All of it runs in one [`GraphTransaction`]; an error rolls back the whole
//! ingestion, session record included.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::extraction::{ExtractionResult, KnowledgeChunk};
use crate::graph::types::format_timestamp;
use crate::graph::{
    Direction, GraphStore, GraphTransaction, NodeType, Properties, RelationshipType, Session,
    DEFAULT_WEIGHT,
};
use crate::profile::AgentProfile;
use crate::scoring::{mentions, RelevanceScorer};

/// Default minimum category score for a chunk to demonstrate a skill
pub const DEFAULT_SKILL_THRESHOLD: f64 = 0.1;

/// Ingestion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// A chunk demonstrates a skill when its category score is strictly above this
    pub skill_threshold: f64,
    /// Resolve technologies and skills against nodes from earlier ingestions
    /// (matched by type, name and agent) instead of creating new ones per call
    pub reuse_existing_concepts: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            skill_threshold: DEFAULT_SKILL_THRESHOLD,
            reuse_existing_concepts: false,
        }
    }
}

/// Writes extraction results into a [`GraphStore`]
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    store: GraphStore,
    config: IngestionConfig,
}

/// Technology or skill node, created lazily and linked to the agent once
struct Concept<'a> {
    node_type: NodeType,
    link: RelationshipType,
    name: &'a str,
    properties: Properties,
}

/// Concept ids resolved during one ingestion call, keyed by name
#[derive(Default)]
struct ConceptCache {
    ids: HashMap<String, String>,
    created: usize,
}

impl IngestionPipeline {
    pub fn new(store: GraphStore, config: IngestionConfig) -> Self {
        Self { store, config }
    }

    pub fn with_defaults(store: GraphStore) -> Self {
        Self::new(store, IngestionConfig::default())
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Store an extraction result for an agent, returning the session id
    pub async fn ingest(
        &self,
        result: &ExtractionResult,
        profile: &AgentProfile,
    ) -> Result<String> {
        let mut tx = self.store.begin().await?;

        match self.write_all(&mut tx, result, profile).await {
            Ok(session_id) => {
                tx.commit().await?;
                Ok(session_id)
            }
            Err(e) => {
                warn!(
                    agent = %profile.name,
                    source = %result.source_id,
                    error = %e,
                    "Ingestion failed, rolling back"
                );
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn write_all(
        &self,
        tx: &mut GraphTransaction,
        result: &ExtractionResult,
        profile: &AgentProfile,
    ) -> Result<String> {
        let session = Session::new(
            &profile.name,
            &result.source_id,
            &result.source_type,
            result.total_chunks,
            result.total_tokens,
            result.extraction_metadata.clone(),
        );
        tx.record_session(&session).await?;

        let agent_id = self.ensure_agent(tx, profile).await?;

        let source_id = tx
            .upsert_node(NodeType::Source, source_properties(result), None)
            .await?;
        tx.add_edge(
            &agent_id,
            &source_id,
            RelationshipType::ExtractsFrom,
            Some(object(json!({
                "session_id": session.id,
                "extraction_date": format_timestamp(&Utc::now()),
            }))),
            DEFAULT_WEIGHT,
        )
        .await?;

        let mut technologies = ConceptCache::default();
        let mut skills = ConceptCache::default();

        for chunk in &result.chunks {
            if !(0.0..=1.0).contains(&chunk.relevance_score) {
                return Err(Error::InvalidInput(format!(
                    "chunk '{}' has relevance {} outside [0, 1]",
                    chunk.source_path, chunk.relevance_score
                )));
            }

            let chunk_id = self
                .write_chunk(tx, chunk, &agent_id, &source_id, &session.id)
                .await?;
            self.link_technologies(tx, chunk, &chunk_id, &agent_id, profile, &mut technologies)
                .await?;
            self.link_skills(tx, chunk, &chunk_id, &agent_id, profile, &mut skills)
                .await?;
        }

        info!(
            session_id = %session.id,
            agent = %profile.name,
            source = %result.source_id,
            chunks = result.chunks.len(),
            technologies_created = technologies.created,
            skills_created = skills.created,
            "Stored extraction result"
        );

        Ok(session.id)
    }

    /// First agent node with the profile's name, or a new one
    async fn ensure_agent(
        &self,
        tx: &mut GraphTransaction,
        profile: &AgentProfile,
    ) -> Result<String> {
        let filter = object(json!({ "name": profile.name }));
        if let Some(agent) = tx.find_node(&NodeType::Agent, &filter).await? {
            return Ok(agent.id);
        }

        let id = tx
            .upsert_node(NodeType::Agent, profile.agent_properties(), None)
            .await?;
        debug!(agent = %profile.name, agent_id = %id, "Created agent node");
        Ok(id)
    }

    async fn write_chunk(
        &self,
        tx: &mut GraphTransaction,
        chunk: &KnowledgeChunk,
        agent_id: &str,
        source_id: &str,
        session_id: &str,
    ) -> Result<String> {
        let chunk_id = tx
            .upsert_node(NodeType::KnowledgeChunk, chunk.to_properties(), None)
            .await?;

        tx.add_edge(
            source_id,
            &chunk_id,
            RelationshipType::Contains,
            None,
            chunk.relevance_score,
        )
        .await?;
        tx.add_edge(
            agent_id,
            &chunk_id,
            RelationshipType::LearnsFrom,
            Some(object(json!({
                "relevance_score": chunk.relevance_score,
                "session_id": session_id,
            }))),
            chunk.relevance_score,
        )
        .await?;

        Ok(chunk_id)
    }

    async fn link_technologies(
        &self,
        tx: &mut GraphTransaction,
        chunk: &KnowledgeChunk,
        chunk_id: &str,
        agent_id: &str,
        profile: &AgentProfile,
        cache: &mut ConceptCache,
    ) -> Result<()> {
        for tech in &profile.technologies {
            if !mentions(&chunk.content, tech) {
                continue;
            }

            let concept = Concept {
                node_type: NodeType::Technology,
                link: RelationshipType::Requires,
                name: tech,
                properties: object(json!({
                    "name": tech,
                    "agent_context": profile.name,
                })),
            };
            let tech_id = self.resolve_concept(tx, agent_id, concept, cache).await?;

            tx.add_edge(chunk_id, &tech_id, RelationshipType::Implements, None, DEFAULT_WEIGHT)
                .await?;
        }
        Ok(())
    }

    async fn link_skills(
        &self,
        tx: &mut GraphTransaction,
        chunk: &KnowledgeChunk,
        chunk_id: &str,
        agent_id: &str,
        profile: &AgentProfile,
        cache: &mut ConceptCache,
    ) -> Result<()> {
        for (category, keywords) in &profile.knowledge_filters {
            let category_score = RelevanceScorer::category_score(&chunk.content, keywords);
            if category_score <= self.config.skill_threshold {
                continue;
            }

            let concept = Concept {
                node_type: NodeType::Skill,
                link: RelationshipType::SpecializesIn,
                name: category,
                properties: object(json!({
                    "name": category,
                    "keywords": keywords,
                    "agent_context": profile.name,
                })),
            };
            let skill_id = self.resolve_concept(tx, agent_id, concept, cache).await?;

            tx.add_edge(
                chunk_id,
                &skill_id,
                RelationshipType::Demonstrates,
                None,
                category_score,
            )
            .await?;
        }
        Ok(())
    }

    /// Id of the concept node, creating it and the agent link on first use in this call
    async fn resolve_concept(
        &self,
        tx: &mut GraphTransaction,
        agent_id: &str,
        concept: Concept<'_>,
        cache: &mut ConceptCache,
    ) -> Result<String> {
        if let Some(id) = cache.ids.get(concept.name) {
            return Ok(id.clone());
        }

        let existing = if self.config.reuse_existing_concepts {
            let filter = object(json!({
                "name": concept.name,
                "agent_context": concept.properties.get("agent_context"),
            }));
            tx.find_node(&concept.node_type, &filter).await?
        } else {
            None
        };

        let (id, needs_link) = match existing {
            Some(node) => {
                let linked = tx
                    .get_relationships(agent_id, Some(&concept.link), Direction::Outgoing)
                    .await?
                    .iter()
                    .any(|edge| edge.target_id == node.id);
                (node.id, !linked)
            }
            None => {
                let id = tx
                    .upsert_node(concept.node_type.clone(), concept.properties, None)
                    .await?;
                cache.created += 1;
                debug!(
                    node_type = %concept.node_type,
                    name = %concept.name,
                    node_id = %id,
                    "Created concept node"
                );
                (id, true)
            }
        };

        if needs_link {
            tx.add_edge(agent_id, &id, concept.link, None, DEFAULT_WEIGHT)
                .await?;
        }

        cache.ids.insert(concept.name.to_string(), id.clone());
        Ok(id)
    }
}

fn source_properties(result: &ExtractionResult) -> Properties {
    object(json!({
        "url": result.source_id,
        "source_type": result.source_type,
        "total_chunks": result.total_chunks,
        "total_tokens": result.total_tokens,
        "metadata": result.extraction_metadata,
    }))
}

fn object(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::RoleDefinition;

    fn profile() -> AgentProfile {
        AgentProfile::new(
            "backend_engineer",
            RoleDefinition {
                title: "Backend Engineer".into(),
                identity_prompt: "You build APIs".into(),
                ..Default::default()
            },
        )
        .with_technologies(["FastAPI", "PostgreSQL", "Redis"])
        .with_focus_areas(["api design"])
        .with_knowledge_source("github", vec!["https://github.com/tiangolo/fastapi".into()])
        .with_knowledge_filter("api", ["endpoint", "route"])
        .with_knowledge_filter("data", ["postgresql", "migration"])
        .with_knowledge_filter("ops", ["kubernetes"])
    }

    fn chunk(content: &str, path: &str, relevance: f64) -> KnowledgeChunk {
        KnowledgeChunk {
            content: content.to_string(),
            source_path: path.to_string(),
            file_type: "py".to_string(),
            language: Some("python".to_string()),
            size_tokens: 10,
            relevance_score: relevance,
            metadata: Properties::new(),
        }
    }

    fn extraction() -> ExtractionResult {
        ExtractionResult::new(
            "https://github.com/tiangolo/fastapi",
            "github",
            vec![
                chunk("FastAPI endpoint with PostgreSQL models", "app/api.py", 0.9),
                chunk("A FastAPI route handler", "app/routes.py", 0.6),
                chunk("Project notes", "README.md", 0.3),
            ],
            object(json!({"extraction_method": "test"})),
        )
    }

    async fn pipeline(config: IngestionConfig) -> IngestionPipeline {
        let store = GraphStore::in_memory().await.unwrap();
        IngestionPipeline::new(store, config)
    }

    #[tokio::test]
    async fn test_ingest_creates_expected_graph() {
        let pipeline = pipeline(IngestionConfig::default()).await;
        let session_id = pipeline.ingest(&extraction(), &profile()).await.unwrap();

        let store = pipeline.store();
        let stats = store.get_statistics(Some("backend_engineer")).await.unwrap();

        assert_eq!(stats.nodes_of(&NodeType::Agent), 1);
        assert_eq!(stats.nodes_of(&NodeType::Source), 1);
        assert_eq!(stats.nodes_of(&NodeType::KnowledgeChunk), 3);
        assert_eq!(stats.nodes_of(&NodeType::Technology), 2);
        assert_eq!(stats.nodes_of(&NodeType::Skill), 2);

        assert_eq!(stats.edges_of(&RelationshipType::ExtractsFrom), 1);
        assert_eq!(stats.edges_of(&RelationshipType::Contains), 3);
        assert_eq!(stats.edges_of(&RelationshipType::LearnsFrom), 3);
        assert_eq!(stats.edges_of(&RelationshipType::Requires), 2);
        assert_eq!(stats.edges_of(&RelationshipType::Implements), 3);
        assert_eq!(stats.edges_of(&RelationshipType::SpecializesIn), 2);
        assert_eq!(stats.edges_of(&RelationshipType::Demonstrates), 3);

        let agent_stats = stats.agent.unwrap();
        assert_eq!(agent_stats.session_count, 1);
        assert_eq!(agent_stats.total_chunks, 3);
        assert_eq!(agent_stats.total_tokens, 30);

        let sessions = store.list_sessions("backend_engineer").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session_id);
        assert_eq!(sessions[0].extraction_metadata["extraction_method"], json!("test"));
    }

    #[tokio::test]
    async fn test_edge_weights_and_properties() {
        let pipeline = pipeline(IngestionConfig::default()).await;
        let session_id = pipeline.ingest(&extraction(), &profile()).await.unwrap();
        let store = pipeline.store();

        let agent = store
            .find_node(&NodeType::Agent, &object(json!({"name": "backend_engineer"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agent.str_property("title"), Some("Backend Engineer"));

        let learns = store
            .get_relationships(&agent.id, Some(&RelationshipType::LearnsFrom), Direction::Outgoing)
            .await
            .unwrap();
        let weights: Vec<f64> = learns.iter().map(|e| e.weight).collect();
        assert_eq!(weights, vec![0.9, 0.6, 0.3]);
        assert_eq!(learns[0].properties["session_id"], json!(session_id));
        assert_eq!(learns[0].properties["relevance_score"], json!(0.9));

        let extracts = store
            .get_relationships(
                &agent.id,
                Some(&RelationshipType::ExtractsFrom),
                Direction::Outgoing,
            )
            .await
            .unwrap();
        assert_eq!(extracts[0].properties["session_id"], json!(session_id));
        assert!(extracts[0].properties.contains_key("extraction_date"));

        let skill = store
            .find_node(&NodeType::Skill, &object(json!({"name": "api"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(skill.properties["keywords"], json!(["endpoint", "route"]));
        assert_eq!(skill.str_property("agent_context"), Some("backend_engineer"));

        let demonstrations = store
            .get_relationships(
                &skill.id,
                Some(&RelationshipType::Demonstrates),
                Direction::Incoming,
            )
            .await
            .unwrap();
        assert_eq!(demonstrations.len(), 2);
        assert!(demonstrations.iter().all(|e| e.weight == 0.5));
    }

    #[tokio::test]
    async fn test_repeat_ingestion_duplicates_concepts_per_call() {
        let pipeline = pipeline(IngestionConfig::default()).await;
        pipeline.ingest(&extraction(), &profile()).await.unwrap();
        pipeline.ingest(&extraction(), &profile()).await.unwrap();

        let stats = pipeline.store().get_statistics(Some("backend_engineer")).await.unwrap();
        assert_eq!(stats.nodes_of(&NodeType::Agent), 1);
        assert_eq!(stats.nodes_of(&NodeType::Source), 2);
        assert_eq!(stats.nodes_of(&NodeType::Technology), 4);
        assert_eq!(stats.nodes_of(&NodeType::Skill), 4);
        assert_eq!(stats.edges_of(&RelationshipType::Requires), 4);
        assert_eq!(stats.agent.unwrap().session_count, 2);
    }

    #[tokio::test]
    async fn test_reuse_existing_concepts() {
        let pipeline = pipeline(IngestionConfig {
            reuse_existing_concepts: true,
            ..Default::default()
        })
        .await;
        pipeline.ingest(&extraction(), &profile()).await.unwrap();
        pipeline.ingest(&extraction(), &profile()).await.unwrap();

        let stats = pipeline.store().get_statistics(None).await.unwrap();
        assert_eq!(stats.nodes_of(&NodeType::Technology), 2);
        assert_eq!(stats.nodes_of(&NodeType::Skill), 2);
        assert_eq!(stats.edges_of(&RelationshipType::Requires), 2);
        assert_eq!(stats.edges_of(&RelationshipType::SpecializesIn), 2);
        assert_eq!(stats.edges_of(&RelationshipType::Implements), 6);
        assert_eq!(stats.edges_of(&RelationshipType::Demonstrates), 6);
    }

    #[tokio::test]
    async fn test_skill_threshold_is_strict() {
        let pipeline = pipeline(IngestionConfig {
            skill_threshold: 0.5,
            ..Default::default()
        })
        .await;
        pipeline.ingest(&extraction(), &profile()).await.unwrap();

        let stats = pipeline.store().get_statistics(None).await.unwrap();
        // every category scores exactly 0.5 at best
        assert_eq!(stats.nodes_of(&NodeType::Skill), 0);
        assert_eq!(stats.edges_of(&RelationshipType::Demonstrates), 0);
    }

    #[tokio::test]
    async fn test_sub_word_hits_demonstrate_no_skill() {
        let pipeline = pipeline(IngestionConfig::default()).await;
        let result = ExtractionResult::new(
            "https://github.com/tiangolo/fastapi",
            "github",
            vec![chunk("Routers and endpoints for pending migrations", "app/net.py", 0.4)],
            Properties::new(),
        );
        pipeline.ingest(&result, &profile()).await.unwrap();

        let stats = pipeline.store().get_statistics(None).await.unwrap();
        assert_eq!(stats.nodes_of(&NodeType::KnowledgeChunk), 1);
        assert_eq!(stats.nodes_of(&NodeType::Skill), 0);
        assert_eq!(stats.edges_of(&RelationshipType::SpecializesIn), 0);
        assert_eq!(stats.edges_of(&RelationshipType::Demonstrates), 0);
    }

    #[tokio::test]
    async fn test_failed_ingestion_rolls_back() {
        let pipeline = pipeline(IngestionConfig::default()).await;
        let mut result = extraction();
        result.chunks[1].relevance_score = 1.5;

        let err = pipeline.ingest(&result, &profile()).await.unwrap_err();
        assert_eq!(err.code(), "E800");

        let stats = pipeline.store().get_statistics(Some("backend_engineer")).await.unwrap();
        assert_eq!(stats.total_nodes(), 0);
        assert_eq!(stats.total_edges(), 0);
        assert_eq!(stats.agent.unwrap().session_count, 0);

        pipeline.ingest(&extraction(), &profile()).await.unwrap();
        let stats = pipeline.store().get_statistics(None).await.unwrap();
        assert_eq!(stats.nodes_of(&NodeType::KnowledgeChunk), 3);
    }

    #[tokio::test]
    async fn test_empty_result() {
        let pipeline = pipeline(IngestionConfig::default()).await;
        let result = ExtractionResult::new("repo", "github", Vec::new(), Properties::new());
        pipeline.ingest(&result, &profile()).await.unwrap();

        let stats = pipeline.store().get_statistics(None).await.unwrap();
        assert_eq!(stats.nodes_of(&NodeType::Agent), 1);
        assert_eq!(stats.nodes_of(&NodeType::Source), 1);
        assert_eq!(stats.total_edges(), 1);
    }
}
