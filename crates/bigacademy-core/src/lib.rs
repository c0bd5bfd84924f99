//! BigAcademy Core Library
//!
//! This crate provides the core functionality for BigAcademy, including:
//! - Property graph storage (SQLite-backed nodes, edges and sessions)
//! - Ingestion of extraction results into the knowledge graph
//! - Keyword relevance scoring
//! - Ranked knowledge retrieval with provenance
//! - Dataset sampling into templated training batches and export

pub mod config;
pub mod dataset;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod ingestion;
pub mod profile;
pub mod retrieval;
pub mod scoring;
pub mod storage;
pub mod telemetry;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::dataset::{
        DatasetBatch, DatasetSample, DatasetSampler, GenerationStats, SamplingOptions,
    };
    pub use crate::error::{Error, Result};
    pub use crate::extraction::{ExtractionResult, KnowledgeChunk};
    pub use crate::graph::{Direction, Edge, GraphStore, Node, NodeType, RelationshipType};
    pub use crate::ingestion::IngestionPipeline;
    pub use crate::profile::{AgentProfile, RoleDefinition};
    pub use crate::retrieval::{KnowledgeRetrieval, RetrievedChunk, SourceInfo};
    pub use crate::scoring::RelevanceScorer;
}
