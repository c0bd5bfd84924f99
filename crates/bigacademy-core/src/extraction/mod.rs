//! Extraction results and the extractor seam
//!
//! Network-bound extractors (repository cloners, document crawlers) live
//! outside this crate and implement [`Extractor`]. What they hand back is an
//! [`ExtractionResult`]: relevance-ranked [`KnowledgeChunk`]s plus totals.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::graph::Properties;
use crate::scoring::RelevanceScorer;

/// One unit of extracted content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub content: String,
    pub source_path: String,
    pub file_type: String,
    pub language: Option<String>,
    pub size_tokens: u64,
    /// Overall relevance in [0, 1]
    pub relevance_score: f64,
    #[serde(default)]
    pub metadata: Properties,
}

impl KnowledgeChunk {
    /// Build a chunk from a file's content, deriving language and token estimate
    pub fn from_file(
        content: impl Into<String>,
        source_path: impl Into<String>,
        relevance_score: f64,
    ) -> Self {
        let content = content.into();
        let source_path = source_path.into();
        let file_type = Path::new(&source_path)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Self {
            size_tokens: estimate_tokens(&content),
            language: detect_language(&source_path).map(str::to_string),
            file_type,
            source_path,
            content,
            relevance_score,
            metadata: Properties::new(),
        }
    }

    /// Properties stored on the chunk's graph node
    pub fn to_properties(&self) -> Properties {
        let value = json!({
            "content": self.content,
            "source_path": self.source_path,
            "file_type": self.file_type,
            "language": self.language,
            "size_tokens": self.size_tokens,
            "relevance_score": self.relevance_score,
            "metadata": self.metadata,
        });
        match value {
            Value::Object(map) => map,
            _ => Properties::new(),
        }
    }

    /// Rebuild a chunk from graph node properties
    ///
    /// Missing keys fall back to empty values; a missing relevance reads as 0.
    pub fn from_properties(props: &Properties) -> Self {
        let text = |key: &str| {
            props
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            content: text("content"),
            source_path: text("source_path"),
            file_type: text("file_type"),
            language: props
                .get("language")
                .and_then(Value::as_str)
                .map(str::to_string),
            size_tokens: props
                .get("size_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            relevance_score: props
                .get("relevance_score")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            metadata: props
                .get("metadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// Everything an extractor produced for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Source identity, usually its URL
    pub source_id: String,
    pub source_type: String,
    pub total_chunks: u64,
    pub total_tokens: u64,
    /// Sorted by descending relevance
    pub chunks: Vec<KnowledgeChunk>,
    #[serde(default)]
    pub extraction_metadata: Properties,
}

impl ExtractionResult {
    /// Build a result, ranking chunks by relevance and computing totals
    pub fn new(
        source_id: impl Into<String>,
        source_type: impl Into<String>,
        mut chunks: Vec<KnowledgeChunk>,
        extraction_metadata: Properties,
    ) -> Self {
        chunks.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

        Self {
            source_id: source_id.into(),
            source_type: source_type.into(),
            total_chunks: chunks.len() as u64,
            total_tokens: chunks.iter().map(|c| c.size_tokens).sum(),
            chunks,
            extraction_metadata,
        }
    }

    /// An empty result carrying an error message in its metadata
    pub fn failed(
        source_id: impl Into<String>,
        source_type: impl Into<String>,
        error: &Error,
    ) -> Self {
        let mut metadata = Properties::new();
        metadata.insert("error".to_string(), Value::String(error.to_string()));
        Self::new(source_id, source_type, Vec::new(), metadata)
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Drop chunks below the extraction gate and recompute totals
    pub fn retain_relevant(&mut self, threshold: f64) {
        self.chunks
            .retain(|c| RelevanceScorer::passes_extraction_gate(c.relevance_score, threshold));
        self.total_chunks = self.chunks.len() as u64;
        self.total_tokens = self.chunks.iter().map(|c| c.size_tokens).sum();
    }
}

/// A source of knowledge chunks
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract ranked chunks from a source
    async fn extract(&self, source: &str) -> Result<ExtractionResult>;

    /// Whether a source is reachable and in a supported format
    async fn validate_source(&self, source: &str) -> bool;
}

/// Programming or markup language for a file path, by extension
pub fn detect_language(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_string_lossy().to_lowercase();
    let language = match ext.as_str() {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "jsx" => "jsx",
        "tsx" => "tsx",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "go" => "go",
        "rs" => "rust",
        "php" => "php",
        "rb" => "ruby",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "xml" => "xml",
        "html" => "html",
        "css" => "css",
        "sql" => "sql",
        "sh" => "bash",
        "md" => "markdown",
        "rst" => "rst",
        "txt" => "text",
        _ => return None,
    };
    Some(language)
}

/// Rough token count: four characters per token
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}
