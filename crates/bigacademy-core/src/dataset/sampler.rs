//! Dataset sampling engine

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::templates::{PromptRequest, ResponseGenerator, TemplateProvider};
use super::types::{DatasetBatch, DatasetSample, GenerationConfig, GenerationStats, SamplingOptions};
use crate::error::Result;
use crate::graph::types::format_timestamp;
use crate::graph::Properties;
use crate::profile::AgentProfile;
use crate::retrieval::{KnowledgeRetrieval, RetrievedChunk};

/// Turns an agent's ranked knowledge into templated training batches
#[derive(Clone)]
pub struct DatasetSampler {
    retrieval: KnowledgeRetrieval,
    templates: Arc<dyn TemplateProvider>,
    responder: Arc<dyn ResponseGenerator>,
}

impl DatasetSampler {
    pub fn new(
        retrieval: KnowledgeRetrieval,
        templates: Arc<dyn TemplateProvider>,
        responder: Arc<dyn ResponseGenerator>,
    ) -> Self {
        Self {
            retrieval,
            templates,
            responder,
        }
    }

    /// Generate one batch per template type that yields at least one sample
    ///
    /// Without explicit `template_types` the template provider picks the ones
    /// suitable for the agent. Failed samples are counted in `stats` and
    /// skipped. Storage errors abort the call.
    pub async fn generate_dataset(
        &self,
        profile: &AgentProfile,
        template_types: Option<&[String]>,
        options: &SamplingOptions,
        stats: &mut GenerationStats,
    ) -> Result<Vec<DatasetBatch>> {
        let template_types: Vec<String> = match template_types {
            Some(types) => types.to_vec(),
            None => self
                .templates
                .suitable_templates(profile, &options.content_type),
        };

        let knowledge = self
            .retrieval
            .get_agent_knowledge(&profile.name, options.min_relevance_score)
            .await?;

        if knowledge.is_empty() {
            info!(
                agent = %profile.name,
                min_relevance = options.min_relevance_score,
                "No knowledge chunks to sample"
            );
            return Ok(Vec::new());
        }

        debug!(
            agent = %profile.name,
            chunks = knowledge.len(),
            templates = ?template_types,
            "Generating dataset"
        );

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut batches = Vec::new();
        for template_type in &template_types {
            let mut selection: Vec<&RetrievedChunk> = knowledge.iter().collect();
            if options.randomize {
                selection.shuffle(&mut rng);
            }
            selection.truncate(options.max_samples_per_template);

            match self
                .generate_batch(profile, template_type, &selection, options, stats)
                .await
            {
                Some(batch) => {
                    stats.record_batch(&batch);
                    batches.push(batch);
                }
                None => {
                    warn!(agent = %profile.name, template = %template_type, "No samples generated");
                }
            }
        }

        info!(
            agent = %profile.name,
            batches = batches.len(),
            samples = batches.iter().map(DatasetBatch::len).sum::<usize>(),
            failed_total = stats.failed_generations,
            "Dataset generation complete"
        );
        Ok(batches)
    }

    async fn generate_batch(
        &self,
        profile: &AgentProfile,
        template_type: &str,
        selection: &[&RetrievedChunk],
        options: &SamplingOptions,
        stats: &mut GenerationStats,
    ) -> Option<DatasetBatch> {
        let mut samples = Vec::with_capacity(selection.len());

        for (index, retrieved) in selection.iter().enumerate() {
            match self.generate_sample(profile, template_type, retrieved, index).await {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    stats.record_failure();
                    warn!(
                        agent = %profile.name,
                        template = %template_type,
                        sample_index = index,
                        error = %e,
                        "Sample generation failed, skipping"
                    );
                }
            }
        }

        if samples.is_empty() {
            return None;
        }

        let relevances = selection.iter().map(|r| r.relevance());
        let config = GenerationConfig {
            template_type: template_type.to_string(),
            max_samples: options.max_samples_per_template,
            agent_name: profile.name.clone(),
            min_relevance_score: relevances.clone().fold(f64::INFINITY, f64::min),
            max_relevance_score: relevances.fold(f64::NEG_INFINITY, f64::max),
        };

        Some(DatasetBatch::new(&profile.name, template_type, samples, config))
    }

    async fn generate_sample(
        &self,
        profile: &AgentProfile,
        template_type: &str,
        retrieved: &RetrievedChunk,
        index: usize,
    ) -> Result<DatasetSample> {
        let mut parameters = BTreeMap::new();
        parameters.insert("question_type".to_string(), json!("professional"));
        parameters.insert("sample_index".to_string(), json!(index));

        let request = PromptRequest {
            template_type,
            profile,
            chunk: &retrieved.chunk,
            source: &retrieved.source,
            parameters,
        };

        let prompt = self.templates.build_prompt(&request)?;
        let expected_response = self.responder.generate_response(&request, &prompt).await?;
        let now = Utc::now();

        Ok(DatasetSample {
            id: Uuid::new_v4().to_string(),
            agent_name: profile.name.clone(),
            template_type: template_type.to_string(),
            prompt,
            expected_response,
            metadata: sample_metadata(profile, template_type, retrieved, &now),
            created_at: now,
        })
    }
}

fn sample_metadata(
    profile: &AgentProfile,
    template_type: &str,
    retrieved: &RetrievedChunk,
    now: &chrono::DateTime<Utc>,
) -> Properties {
    let chunk = &retrieved.chunk;
    match json!({
        "source_path": chunk.source_path,
        "source_url": retrieved.source.url,
        "relevance_score": chunk.relevance_score,
        "chunk_tokens": chunk.size_tokens,
        "file_type": chunk.file_type,
        "language": chunk.language,
        "template_type": template_type,
        "agent_role": profile.role.title,
        "agent_technologies": profile.technologies,
        "agent_focus_areas": profile.focus_areas,
        "generation_timestamp": format_timestamp(now),
    }) {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}
