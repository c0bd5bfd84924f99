//! Prompt templates and response generation
//!
//! The sampler talks to two collaborators:
//! - a [`TemplateProvider`] that picks templates for an agent and renders prompts
//! - a [`ResponseGenerator`] that produces the expected answer for a prompt
//!
//! [`TemplateRegistry`] and [`PlaceholderResponder`] are in-memory
//! implementations. Loading template definitions from disk is up to callers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::extraction::KnowledgeChunk;
use crate::profile::AgentProfile;
use crate::retrieval::SourceInfo;

/// Matches every agent in [`TemplateUsage::suitable_for`]
pub const ALL_AGENTS: &str = "all_agents";
/// Matches every content type in [`TemplateUsage::content_types`]
pub const ALL_CONTENT: &str = "all";

/// Everything needed to render one sample's prompt
#[derive(Debug, Clone)]
pub struct PromptRequest<'a> {
    pub template_type: &'a str,
    pub profile: &'a AgentProfile,
    pub chunk: &'a KnowledgeChunk,
    pub source: &'a SourceInfo,
    /// Extra parameters; these win over every other variable
    pub parameters: BTreeMap<String, Value>,
}

/// Chooses and renders prompt templates
pub trait TemplateProvider: Send + Sync {
    /// Template types suitable for an agent and content type, in registration order
    fn suitable_templates(&self, profile: &AgentProfile, content_type: &str) -> Vec<String>;

    /// Render the prompt for one sample
    fn build_prompt(&self, request: &PromptRequest<'_>) -> Result<String>;
}

/// Produces the expected response for a rendered prompt
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate_response(&self, request: &PromptRequest<'_>, prompt: &str) -> Result<String>;
}

/// A prompt template, one section per heading
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub template_type: String,
    pub description: String,
    pub system_prompt: String,
    pub knowledge_context: String,
    pub task_instruction: String,
    pub response_format: String,
    /// Variables the template expects
    pub variables: Vec<String>,
}

/// Who a template is for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateUsage {
    /// Role patterns, or `all_agents`
    pub suitable_for: Vec<String>,
    /// Content types, or `all`
    pub content_types: Vec<String>,
    pub output_format: String,
}

impl Default for TemplateUsage {
    fn default() -> Self {
        Self {
            suitable_for: vec![ALL_AGENTS.to_string()],
            content_types: vec![ALL_CONTENT.to_string()],
            output_format: "text".to_string(),
        }
    }
}

impl TemplateUsage {
    /// Restrict to agents whose role title or focus areas contain one of `patterns`
    pub fn for_roles<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            suitable_for: patterns.into_iter().map(Into::into).collect(),
            content_types: Vec::new(),
            ..Default::default()
        }
    }

    pub fn with_content_types<I, S>(mut self, content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_types = content_types.into_iter().map(Into::into).collect();
        self
    }

    fn suits(&self, profile: &AgentProfile, content_type: &str) -> bool {
        if self.suitable_for.iter().any(|p| p == ALL_AGENTS) {
            return true;
        }

        let role = profile.role.title.to_lowercase();
        let focus: Vec<String> = profile
            .focus_areas
            .iter()
            .map(|area| area.to_lowercase())
            .collect();
        let role_match = self.suitable_for.iter().any(|pattern| {
            role.contains(pattern.as_str())
                || focus.iter().any(|area| area.contains(pattern.as_str()))
        });

        role_match
            || self
                .content_types
                .iter()
                .any(|t| t == content_type || t == ALL_CONTENT)
    }
}

#[derive(Debug, Clone)]
struct RegisteredTemplate {
    config: TemplateConfig,
    usage: TemplateUsage,
}

/// In-memory [`TemplateProvider`]
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<RegisteredTemplate>,
    default_parameters: BTreeMap<String, Value>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template, replacing one with the same type but keeping its position
    pub fn register(&mut self, config: TemplateConfig, usage: TemplateUsage) {
        let entry = RegisteredTemplate { config, usage };
        match self
            .templates
            .iter_mut()
            .find(|t| t.config.template_type == entry.config.template_type)
        {
            Some(existing) => *existing = entry,
            None => self.templates.push(entry),
        }
    }

    pub fn with_template(mut self, config: TemplateConfig, usage: TemplateUsage) -> Self {
        self.register(config, usage);
        self
    }

    /// Parameter applied to every prompt unless a request overrides it
    pub fn with_default_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.default_parameters.insert(key.into(), value.into());
        self
    }

    pub fn template_types(&self) -> Vec<String> {
        self.templates
            .iter()
            .map(|t| t.config.template_type.clone())
            .collect()
    }

    pub fn get(&self, template_type: &str) -> Option<&TemplateConfig> {
        self.find(template_type).map(|t| &t.config)
    }

    pub fn usage(&self, template_type: &str) -> Option<&TemplateUsage> {
        self.find(template_type).map(|t| &t.usage)
    }

    fn find(&self, template_type: &str) -> Option<&RegisteredTemplate> {
        self.templates
            .iter()
            .find(|t| t.config.template_type == template_type)
    }

    /// Declared variables of a template that `provided` lacks
    pub fn missing_variables(
        &self,
        template_type: &str,
        provided: &BTreeMap<String, Value>,
    ) -> Result<Vec<String>> {
        let template = self
            .get(template_type)
            .ok_or_else(|| Error::TemplateNotFound(template_type.to_string()))?;

        Ok(template
            .variables
            .iter()
            .filter(|var| !provided.contains_key(*var))
            .cloned()
            .collect())
    }

    /// All variables available to a request's template, lowest precedence first:
    /// role, agent, chunk, source, registry defaults, request parameters
    pub fn template_variables(&self, request: &PromptRequest<'_>) -> BTreeMap<String, Value> {
        let profile = request.profile;
        let role = &profile.role;
        let chunk = request.chunk;

        let mut vars: BTreeMap<String, Value> = BTreeMap::new();
        let mut set = |key: &str, value: Value| {
            vars.insert(key.to_string(), value);
        };

        set("role.title", role.title.clone().into());
        set("role.description", role.description.clone().into());
        set("role.domain_expertise", role.domain_expertise.join(", ").into());
        set("role.communication_style", role.communication_style.clone().into());
        set("role.identity_prompt", role.identity_prompt.clone().into());

        set("technologies", profile.technologies.join(", ").into());
        set("focus_areas", profile.focus_areas.join(", ").into());

        set("chunk.content", chunk.content.clone().into());
        set("chunk.source_path", chunk.source_path.clone().into());
        set("chunk.file_type", chunk.file_type.clone().into());
        set(
            "chunk.language",
            chunk.language.clone().unwrap_or_else(|| "text".to_string()).into(),
        );
        set("chunk.relevance_score", chunk.relevance_score.into());
        set("chunk.size_tokens", chunk.size_tokens.into());

        set("source.url", request.source.url.clone().into());
        set("source.type", request.source.source_type.clone().into());

        for (key, value) in self.default_parameters.iter().chain(&request.parameters) {
            vars.insert(key.clone(), value.clone());
        }
        vars
    }
}

impl TemplateProvider for TemplateRegistry {
    fn suitable_templates(&self, profile: &AgentProfile, content_type: &str) -> Vec<String> {
        self.templates
            .iter()
            .filter(|t| t.usage.suits(profile, content_type))
            .map(|t| t.config.template_type.clone())
            .collect()
    }

    fn build_prompt(&self, request: &PromptRequest<'_>) -> Result<String> {
        let template = self
            .get(request.template_type)
            .ok_or_else(|| Error::TemplateNotFound(request.template_type.to_string()))?;
        let vars = self.template_variables(request);

        let sections = [
            ("System Prompt", &template.system_prompt),
            ("Knowledge Context", &template.knowledge_context),
            ("Task", &template.task_instruction),
            ("Expected Response Format", &template.response_format),
        ];

        let rendered: Vec<String> = sections
            .iter()
            .filter(|(_, body)| !body.is_empty())
            .map(|(heading, body)| format!("# {}\n{}", heading, fill_placeholders(body, &vars)))
            .collect();

        Ok(rendered.join("\n\n"))
    }
}

/// Replace `{name}` with the variable's value; unknown names stay as written
pub fn fill_placeholders(text: &str, vars: &BTreeMap<String, Value>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match after.find('}') {
            Some(0) => {
                out.push_str("{}");
                rest = &after[1..];
            }
            Some(close) => {
                let name = &after[..close];
                match vars.get(name) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Deterministic stand-in for an LLM
///
/// Answers mention the agent's role, focus areas and technologies so samples
/// stay recognisably agent-specific.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderResponder;

fn leading(items: &[String], n: usize) -> String {
    items.iter().take(n).cloned().collect::<Vec<_>>().join(", ")
}

impl PlaceholderResponder {
    pub fn respond(
        &self,
        template_type: &str,
        profile: &AgentProfile,
        chunk: &KnowledgeChunk,
    ) -> String {
        let title = &profile.role.title;
        let focus = leading(&profile.focus_areas, 2);
        let language = chunk.language.as_deref().unwrap_or("text");

        match template_type {
            "question_answer" => format!(
                "**Question:** How would you implement this functionality as an Expert {title}?\n\n\
                 **Answer:** As an Expert {title}, I would approach this implementation by focusing on {focus}. \
                 The solution should leverage {techs} technologies to ensure scalability and maintainability.",
                techs = leading(&profile.technologies, 3),
            ),
            "code_review" => format!(
                "**Code Review Summary:**\n\n\
                 **Overall Assessment:** This code demonstrates solid understanding of {language} fundamentals.\n\n\
                 **Strengths:**\n- Clean structure and readable implementation\n- Appropriate use of {language} patterns\n\n\
                 **Areas for Improvement:**\n- Consider adding error handling\n- Add comprehensive documentation\n\
                 - Implement proper testing coverage\n\n\
                 **Additional Recommendations:**\nBased on my expertise in {focus}, I recommend implementing proper logging and monitoring.\n\n\
                 Review conducted by: Expert {title}"
            ),
            "implementation_task" => format!(
                "**Implementation Task:**\n\n\
                 **Requirements:**\n- Implement using {techs}\n- Follow {focus} best practices\n\n\
                 Implemented by: Expert {title}",
                techs = leading(&profile.technologies, 2),
            ),
            "debugging_scenario" => format!(
                "**Debugging Scenario:**\n\n\
                 **Debugging Process:**\n1. **Problem Analysis:** Applied systematic debugging approach\n\
                 2. **Root Cause:** Identified the core issue\n3. **Solution:** Implemented proper fix\n\
                 4. **Prevention:** Recommended best practices\n\n\
                 Debugged by: Expert {title}"
            ),
            "multi_turn_conversation" => format!(
                "**Multi-Turn Conversation:**\n\n\
                 **Turn 1:**\n*Client:* [Initial request]\n*Expert {title}:* [Professional guidance]\n\n\
                 **Turn 2:**\n*Client:* [Follow-up question]\n*Expert {title}:* [Detailed technical response]\n\n\
                 **Conversation Summary:**\nTechnologies Discussed: {techs}",
                techs = leading(&profile.technologies, 3),
            ),
            _ => format!("Professional response from Expert {title}"),
        }
    }
}

#[async_trait]
impl ResponseGenerator for PlaceholderResponder {
    async fn generate_response(
        &self,
        request: &PromptRequest<'_>,
        _prompt: &str,
    ) -> Result<String> {
        Ok(self.respond(request.template_type, request.profile, request.chunk))
    }
}
