//! Dataset sample and batch types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::Properties;

/// Content type used to pick templates when none are requested
pub const DEFAULT_CONTENT_TYPE: &str = "code";

/// Options for one dataset generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingOptions {
    /// Cap on samples per template type
    pub max_samples_per_template: usize,
    /// Chunks below this relevance are not sampled
    pub min_relevance_score: f64,
    /// Shuffle the knowledge list independently for each template
    pub randomize: bool,
    /// Makes shuffling reproducible
    pub seed: Option<u64>,
    /// Content type passed to template selection
    pub content_type: String,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            max_samples_per_template: 50,
            min_relevance_score: 0.2,
            randomize: true,
            seed: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

impl SamplingOptions {
    pub fn max_samples(mut self, max: usize) -> Self {
        self.max_samples_per_template = max;
        self
    }

    pub fn min_relevance(mut self, min: f64) -> Self {
        self.min_relevance_score = min;
        self
    }

    /// Keep the relevance ranking instead of shuffling
    pub fn ordered(mut self) -> Self {
        self.randomize = false;
        self
    }

    pub fn seeded(mut self, seed: u64) -> Self {
        self.randomize = true;
        self.seed = Some(seed);
        self
    }
}

/// One training sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSample {
    pub id: String,
    pub agent_name: String,
    pub template_type: String,
    pub prompt: String,
    pub expected_response: String,
    pub metadata: Properties,
    pub created_at: DateTime<Utc>,
}

/// Parameters a batch was generated with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub template_type: String,
    pub max_samples: usize,
    pub agent_name: String,
    /// Lowest relevance among the chunks selected for this batch
    pub min_relevance_score: f64,
    /// Highest relevance among the chunks selected for this batch
    pub max_relevance_score: f64,
}

/// Samples for one agent and template type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetBatch {
    pub agent_name: String,
    pub template_type: String,
    pub samples: Vec<DatasetSample>,
    pub total_samples: usize,
    pub generation_config: GenerationConfig,
    pub created_at: DateTime<Utc>,
}

impl DatasetBatch {
    pub fn new(
        agent_name: impl Into<String>,
        template_type: impl Into<String>,
        samples: Vec<DatasetSample>,
        generation_config: GenerationConfig,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            template_type: template_type.into(),
            total_samples: samples.len(),
            samples,
            generation_config,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Running totals across generation calls
///
/// Owned by the caller and passed into each call, so independent samplers
/// never share counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub total_samples: usize,
    pub samples_by_agent: BTreeMap<String, usize>,
    pub samples_by_template: BTreeMap<String, usize>,
    pub failed_generations: usize,
}

impl GenerationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_batch(&mut self, batch: &DatasetBatch) {
        let count = batch.samples.len();
        self.total_samples += count;
        *self
            .samples_by_agent
            .entry(batch.agent_name.clone())
            .or_default() += count;
        *self
            .samples_by_template
            .entry(batch.template_type.clone())
            .or_default() += count;
    }

    pub(crate) fn record_failure(&mut self) {
        self.failed_generations += 1;
    }
}

/// Flattened instruction-following record for training pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub instruction: String,
    pub input: String,
    pub output: String,
    pub metadata: Properties,
}

impl From<&DatasetSample> for TrainingRecord {
    fn from(sample: &DatasetSample) -> Self {
        let mut metadata = Properties::new();
        metadata.insert("agent_name".into(), sample.agent_name.clone().into());
        metadata.insert("template_type".into(), sample.template_type.clone().into());
        metadata.insert("sample_id".into(), sample.id.clone().into());
        for (key, value) in &sample.metadata {
            metadata.insert(key.clone(), value.clone());
        }

        Self {
            instruction: sample.prompt.clone(),
            input: String::new(),
            output: sample.expected_response.clone(),
            metadata,
        }
    }
}
