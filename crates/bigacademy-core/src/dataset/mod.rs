//! Dataset generation
//!
//! Samples an agent's ranked knowledge into templated training batches and
//! writes them out for training pipelines.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bigacademy_core::dataset::{
//!     export, DatasetSampler, GenerationStats, PlaceholderResponder, SamplingOptions,
//!     TemplateRegistry,
//! };
//!
//! let sampler =
//!     DatasetSampler::new(retrieval, Arc::new(registry), Arc::new(PlaceholderResponder));
//! let mut stats = GenerationStats::new();
//! let batches = sampler
//!     .generate_dataset(&profile, None, &SamplingOptions::default(), &mut stats)
//!     .await?;
//! export::save_batches(&batches, "datasets".as_ref(), export::ExportFormat::Jsonl)?;
//! ```

pub mod export;
pub mod sampler;
pub mod templates;
pub mod types;

pub use export::ExportFormat;
pub use sampler::DatasetSampler;
pub use templates::{
    PlaceholderResponder, PromptRequest, ResponseGenerator, TemplateConfig, TemplateProvider,
    TemplateRegistry, TemplateUsage,
};
pub use types::{
    DatasetBatch, DatasetSample, GenerationConfig, GenerationStats, SamplingOptions, TrainingRecord,
};
