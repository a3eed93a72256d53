//! Configuration stored under `.agentflow/config.toml`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::tools::BUILTIN_TOOLS;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".agentflow/config.toml";

const JSON_ONLY_REMINDER: &str = "Reminder that only JSON responses are acceptable as we need to parse them using code. DO NOT INCLUDE ADDITIONAL EXPLANATION OR ANALYSIS.";

/// Top-level configuration (TOML).
///
/// Missing fields default to the folder-analysis setup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Agent that receives the initial prompt.
    pub entry_agent: String,

    pub workflow: WorkflowSettings,

    pub backend: BackendConfig,

    pub agents: Vec<AgentDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Generation attempts per planning step before reporting a parse failure.
    pub max_parse_attempts: u32,

    /// Maximum nesting of delegated workflows below the entry agent.
    pub max_delegation_depth: u32,

    /// Wall-clock budget in seconds for starting new delegations (0 disables).
    pub delegation_timeout_secs: u64,

    /// Replace the remaining plan with each follow-up plan instead of appending.
    pub replace_pending_on_follow_up: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_parse_attempts: 3,
            max_delegation_depth: 8,
            delegation_timeout_secs: 30 * 60,
            replace_pending_on_follow_up: false,
        }
    }
}

/// How the conversation is handed to the backend command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendInput {
    /// Plain `[role]` transcript.
    #[default]
    Text,
    /// `{"model": ..., "messages": [...]}` document.
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Command to execute per generation (e.g. `["ollama","run","{model}"]`).
    pub command: Vec<String>,

    pub input: BackendInput,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,

    /// Discard backend stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "ollama".to_string(),
                "run".to_string(),
                "{model}".to_string(),
            ],
            input: BackendInput::Text,
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// One configured agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentDefinition {
    pub name: String,
    /// Shown to supervisors that may delegate to this agent.
    pub description: String,
    /// Role-specific content of the system prompt.
    pub instructions: String,
    pub model: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub subordinates: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            entry_agent: "DirectoryAnalyzer".to_string(),
            workflow: WorkflowSettings::default(),
            backend: BackendConfig::default(),
            agents: vec![
                AgentDefinition {
                    name: "DirectoryAnalyzer".to_string(),
                    description: "Analyzes the specified directory by listing its contents and providing summaries of text files.".to_string(),
                    instructions: format!(
                        "Analyze the specified directory by listing its contents and providing summaries of text files. {JSON_ONLY_REMINDER}"
                    ),
                    model: "deepseek-r1:14b".to_string(),
                    tools: vec!["ls".to_string(), "cd".to_string()],
                    subordinates: vec!["text_analyzer".to_string()],
                },
                AgentDefinition {
                    name: "text_analyzer".to_string(),
                    description: format!(
                        "Analyzes text files one at a time, providing detailed content summaries. Cannot process multiple files at once. {JSON_ONLY_REMINDER}"
                    ),
                    instructions: "Analyze text files and provide detailed summaries of their contents.".to_string(),
                    model: "deepseek-r1:14b".to_string(),
                    tools: vec!["read_file".to_string()],
                    subordinates: Vec::new(),
                },
            ],
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workflow.max_parse_attempts == 0 {
            return Err(anyhow!("workflow.max_parse_attempts must be > 0"));
        }
        if self.workflow.max_delegation_depth == 0 {
            return Err(anyhow!("workflow.max_delegation_depth must be > 0"));
        }
        if self.backend.command.is_empty() || self.backend.command[0].trim().is_empty() {
            return Err(anyhow!("backend.command must be a non-empty array"));
        }
        if self.backend.timeout_secs == 0 {
            return Err(anyhow!("backend.timeout_secs must be > 0"));
        }
        if self.backend.output_limit_bytes == 0 {
            return Err(anyhow!("backend.output_limit_bytes must be > 0"));
        }
        if self.agents.is_empty() {
            return Err(anyhow!("at least one agent must be configured"));
        }

        let mut names = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(anyhow!("agent names must not be empty"));
            }
            if !names.insert(agent.name.as_str()) {
                return Err(anyhow!("duplicate agent name '{}'", agent.name));
            }
        }
        if !names.contains(self.entry_agent.as_str()) {
            return Err(anyhow!(
                "entry_agent '{}' is not a configured agent",
                self.entry_agent
            ));
        }
        for agent in &self.agents {
            for tool in &agent.tools {
                if !BUILTIN_TOOLS.contains(&tool.as_str()) {
                    return Err(anyhow!(
                        "agent '{}' lists unknown tool '{}' (available: {})",
                        agent.name,
                        tool,
                        BUILTIN_TOOLS.join(", ")
                    ));
                }
            }
            for sub in &agent.subordinates {
                if !names.contains(sub.as_str()) {
                    return Err(anyhow!(
                        "agent '{}' lists unknown subordinate '{}'",
                        agent.name,
                        sub
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AppConfig::default()`.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        let cfg = AppConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AppConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
