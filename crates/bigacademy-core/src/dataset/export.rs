//! Dataset export
//!
//! Batches are written one file per batch, named
//! `{agent}_{template}_{YYYYmmdd_HHMMSS}.{ext}`, with a `_{n}` suffix when that
//! name is already taken:
//!
//! - **JSONL**: one sample per line
//! - **JSON**: the whole batch as one pretty-printed document
//!
//! Training exports flatten every sample of every batch into
//! instruction/input/output/metadata records, one per line.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::types::{DatasetBatch, TrainingRecord};
use crate::error::{Error, Result};

/// Batch file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Jsonl,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "jsonl" => Ok(Self::Jsonl),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!("Unsupported format: {}", other))),
        }
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// `{stem}.{ext}` in `dir`, or `{stem}_{n}.{ext}` for the first `n` not on disk or in `taken`
fn available_path(dir: &Path, stem: &str, ext: &str, taken: &[PathBuf]) -> PathBuf {
    let mut path = dir.join(format!("{}.{}", stem, ext));
    let mut suffix = 1;
    while taken.contains(&path) || path.exists() {
        path = dir.join(format!("{}_{}.{}", stem, suffix, ext));
        suffix += 1;
    }
    path
}

/// Write every batch into `output_dir`, creating it if needed
pub fn save_batches(
    batches: &[DatasetBatch],
    output_dir: &Path,
    format: ExportFormat,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)?;

    let stamp = timestamp();
    let mut written: Vec<PathBuf> = Vec::with_capacity(batches.len());
    for batch in batches {
        let stem = format!("{}_{}_{}", batch.agent_name, batch.template_type, stamp);
        let path = available_path(output_dir, &stem, format.extension(), &written);

        match format {
            ExportFormat::Jsonl => write_jsonl(batch, &path)?,
            ExportFormat::Json => write_json(batch, &path)?,
        }

        info!(path = %path.display(), samples = batch.samples.len(), "Saved dataset batch");
        written.push(path);
    }

    Ok(written)
}

/// One sample per line
pub fn write_jsonl(batch: &DatasetBatch, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for sample in &batch.samples {
        serde_json::to_writer(&mut writer, sample)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// The whole batch as a pretty-printed document
pub fn write_json(batch: &DatasetBatch, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, batch)?;
    writer.flush()?;
    Ok(())
}

/// Flatten all samples of all batches, in batch order
pub fn training_records(batches: &[DatasetBatch]) -> Vec<TrainingRecord> {
    batches
        .iter()
        .flat_map(|batch| batch.samples.iter().map(TrainingRecord::from))
        .collect()
}

/// Write training records to `path` as JSONL, returning how many were written
pub fn write_training_records(batches: &[DatasetBatch], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let records = training_records(batches);
    let mut writer = BufWriter::new(File::create(path)?);
    for record in &records {
        serde_json::to_writer(&mut writer, record)?;
        writeln!(writer)?;
    }
    writer.flush()?;

    info!(path = %path.display(), records = records.len(), "Saved training dataset");
    Ok(records.len())
}

/// Write training records to a timestamped file in `output_dir`
pub fn save_training_dataset(batches: &[DatasetBatch], output_dir: &Path) -> Result<PathBuf> {
    let stem = format!("training_dataset_{}", timestamp());
    let path = available_path(output_dir, &stem, "jsonl", &[]);
    write_training_records(batches, &path)?;
    Ok(path)
}
