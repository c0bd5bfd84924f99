//! Agent profiles
//!
//! A profile names an agent persona and describes what it should learn:
//! technologies, focus areas and keyword filters per skill category. Loading
//! profiles from files is left to callers; the types are serde-friendly.

use std::collections::BTreeMap;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::graph::Properties;
use crate::scoring::KeywordFilters;

/// Role an agent plays
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleDefinition {
    pub title: String,
    pub description: String,
    pub responsibilities: Vec<String>,
    pub identity_prompt: String,
    pub communication_style: String,
    pub decision_authority: Vec<String>,
    pub domain_expertise: Vec<String>,
}

impl RoleDefinition {
    /// Role identity block used in generated prompts
    pub fn identity_context(&self) -> String {
        format!(
            "Role: {}\nDescription: {}\nIdentity: {}\nCommunication Style: {}\nExpertise: {}",
            self.title,
            self.description,
            self.identity_prompt,
            self.communication_style,
            self.domain_expertise.join(", ")
        )
    }
}

/// Agent profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent name
    pub name: String,
    pub role: RoleDefinition,
    pub technologies: Vec<String>,
    /// Source kind to list of source locations
    pub knowledge_sources: BTreeMap<String, Vec<String>>,
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub file_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Skill category to keywords
    #[serde(default)]
    pub knowledge_filters: KeywordFilters,
}

impl AgentProfile {
    /// Create a profile with just a name and role; fill the rest with the builder methods
    pub fn new(name: impl Into<String>, role: RoleDefinition) -> Self {
        Self {
            name: name.into(),
            role,
            ..Default::default()
        }
    }

    pub fn with_technologies<I, S>(mut self, technologies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.technologies = technologies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_focus_areas<I, S>(mut self, focus_areas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.focus_areas = focus_areas.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_knowledge_source(mut self, kind: impl Into<String>, sources: Vec<String>) -> Self {
        self.knowledge_sources.insert(kind.into(), sources);
        self
    }

    pub fn with_knowledge_filter<I, S>(mut self, category: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.knowledge_filters
            .insert(category.into(), keywords.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_file_patterns<I, S>(mut self, include: I, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_patterns = include.into_iter().map(Into::into).collect();
        self.exclude_patterns = exclude.into_iter().map(Into::into).collect();
        self
    }

    /// Check required fields, returning one message per problem
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("Profile name is required".to_string());
        }
        if self.role.title.is_empty() {
            errors.push("Role title is required".to_string());
        }
        if self.role.identity_prompt.is_empty() {
            errors.push("Role identity prompt is required".to_string());
        }
        if self.technologies.is_empty() {
            errors.push("At least one technology must be specified".to_string());
        }
        if self.focus_areas.is_empty() {
            errors.push("At least one focus area must be specified".to_string());
        }
        if self.knowledge_sources.is_empty() {
            errors.push("Knowledge sources must be specified".to_string());
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Whether a source file should be extracted for this agent
    ///
    /// Exclude patterns win. With no include patterns every other path is
    /// included. `*` also matches `/`.
    pub fn includes_path(&self, path: &str) -> Result<bool> {
        for pattern in &self.exclude_patterns {
            if compile_pattern(pattern)?.matches(path) {
                return Ok(false);
            }
        }

        if self.file_patterns.is_empty() {
            return Ok(true);
        }

        for pattern in &self.file_patterns {
            if compile_pattern(pattern)?.matches(path) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether any of the agent's technologies occurs in `tech_name`
    pub fn matches_technology(&self, tech_name: &str) -> bool {
        let lowered = tech_name.to_lowercase();
        self.technologies
            .iter()
            .any(|tech| lowered.contains(&tech.to_lowercase()))
    }

    /// Whether any focus area occurs in `content`
    pub fn matches_focus_area(&self, content: &str) -> bool {
        let lowered = content.to_lowercase();
        self.focus_areas
            .iter()
            .any(|area| lowered.contains(&area.to_lowercase()))
    }

    /// Agent summary used as prompt context
    pub fn knowledge_context(&self) -> String {
        format!(
            "Agent: {}\nTechnologies: {}\nFocus Areas: {}\n{}",
            self.name,
            self.technologies.join(", "),
            self.focus_areas.join(", "),
            self.role.identity_context()
        )
    }

    /// Properties stored on the agent's graph node
    pub fn agent_properties(&self) -> Properties {
        let value = json!({
            "name": self.name,
            "title": self.role.title,
            "description": self.role.description,
            "identity_prompt": self.role.identity_prompt,
            "communication_style": self.role.communication_style,
            "technologies": self.technologies,
            "focus_areas": self.focus_areas,
            "domain_expertise": self.role.domain_expertise,
        });
        match value {
            Value::Object(map) => map,
            _ => Properties::new(),
        }
    }
}

fn compile_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| Error::InvalidInput(format!("Invalid glob pattern '{}': {}", pattern, e)))
}
