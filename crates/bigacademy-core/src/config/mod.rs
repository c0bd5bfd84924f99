//! Configuration management with file persistence

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::SamplingOptions;
use crate::ingestion::IngestionConfig;
use crate::scoring::{RelevanceScorer, EXTRACTION_THRESHOLD};
use crate::storage::{default_database_path, DatabaseConfig};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "BIGACADEMY_CONFIG_DIR";

/// BigAcademy configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub extraction: ExtractionConfig,
    pub ingestion: IngestionConfig,
    pub dataset: DatasetConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub relevance_threshold: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: EXTRACTION_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub output_dir: PathBuf,
    pub max_samples_per_template: usize,
    pub min_relevance_score: f64,
    pub randomize: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        let sampling = SamplingOptions::default();
        Self {
            output_dir: PathBuf::from("datasets"),
            max_samples_per_template: sampling.max_samples_per_template,
            min_relevance_score: sampling.min_relevance_score,
            randomize: sampling.randomize,
        }
    }
}

impl DatasetConfig {
    /// Sampling options seeded from these settings
    pub fn sampling_options(&self) -> SamplingOptions {
        SamplingOptions {
            max_samples_per_template: self.max_samples_per_template,
            min_relevance_score: self.min_relevance_score,
            randomize: self.randomize,
            ..Default::default()
        }
    }
}

impl ExtractionConfig {
    /// Whether a chunk's overall relevance clears the configured gate
    pub fn keeps(&self, relevance: f64) -> bool {
        RelevanceScorer::passes_extraction_gate(relevance, self.relevance_threshold)
    }
}

impl StorageConfig {
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::with_path(&self.database_path).max_connections(self.max_connections)
    }
}

fn check_unit_range(name: &str, value: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be between 0.0 and 1.0, got {}", name, value));
    }
    Ok(())
}

fn parse_unit(name: &str, value: &str) -> anyhow::Result<f64> {
    let parsed: f64 = value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", name, value))?;
    check_unit_range(name, parsed)?;
    Ok(parsed)
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("bigacademy")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if there is no file
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path` as pretty TOML
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        check_unit_range("extraction.relevance_threshold", self.extraction.relevance_threshold)?;
        check_unit_range("ingestion.skill_threshold", self.ingestion.skill_threshold)?;
        check_unit_range("dataset.min_relevance_score", self.dataset.min_relevance_score)?;

        if self.dataset.max_samples_per_template == 0 {
            return Err(anyhow!("dataset.max_samples_per_template must be at least 1"));
        }
        if self.storage.max_connections == 0 {
            return Err(anyhow!("storage.max_connections must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "storage.database_path" => Ok(self.storage.database_path.display().to_string()),
            "storage.max_connections" => Ok(self.storage.max_connections.to_string()),

            "extraction.relevance_threshold" => Ok(self.extraction.relevance_threshold.to_string()),

            "ingestion.skill_threshold" => Ok(self.ingestion.skill_threshold.to_string()),
            "ingestion.reuse_existing_concepts" => {
                Ok(self.ingestion.reuse_existing_concepts.to_string())
            }

            "dataset.output_dir" => Ok(self.dataset.output_dir.display().to_string()),
            "dataset.max_samples_per_template" => {
                Ok(self.dataset.max_samples_per_template.to_string())
            }
            "dataset.min_relevance_score" => Ok(self.dataset.min_relevance_score.to_string()),
            "dataset.randomize" => Ok(self.dataset.randomize.to_string()),

            _ => Err(anyhow!("Unknown configuration key: {}", key)),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "storage.database_path" => {
                self.storage.database_path = PathBuf::from(value);
            }
            "storage.max_connections" => {
                let max: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("max_connections must be at least 1"));
                }
                self.storage.max_connections = max;
            }

            "extraction.relevance_threshold" => {
                self.extraction.relevance_threshold = parse_unit(key, value)?;
            }

            "ingestion.skill_threshold" => {
                self.ingestion.skill_threshold = parse_unit(key, value)?;
            }
            "ingestion.reuse_existing_concepts" => {
                self.ingestion.reuse_existing_concepts = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }

            "dataset.output_dir" => {
                self.dataset.output_dir = PathBuf::from(value);
            }
            "dataset.max_samples_per_template" => {
                let max: usize = value
                    .parse()
                    .with_context(|| format!("Invalid max_samples_per_template value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("max_samples_per_template must be at least 1"));
                }
                self.dataset.max_samples_per_template = max;
            }
            "dataset.min_relevance_score" => {
                self.dataset.min_relevance_score = parse_unit(key, value)?;
            }
            "dataset.randomize" => {
                self.dataset.randomize = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }

            _ => return Err(anyhow!("Unknown configuration key: {}", key)),
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "storage.database_path",
            "storage.max_connections",
            "extraction.relevance_threshold",
            "ingestion.skill_threshold",
            "ingestion.reuse_existing_concepts",
            "dataset.output_dir",
            "dataset.max_samples_per_template",
            "dataset.min_relevance_score",
            "dataset.randomize",
        ];

        keys.into_iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }
}
