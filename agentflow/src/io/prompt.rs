//! System prompt rendering for agents.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::json;

use crate::core::parser::response_schema;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

/// A named capability listed in the system prompt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    pub description: String,
}

impl Capability {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Inputs for one agent's system prompt.
#[derive(Debug, Clone, Default)]
pub struct SystemPromptInput {
    pub name: String,
    pub instructions: String,
    pub tools: Vec<Capability>,
    pub agents: Vec<Capability>,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        Self { env }
    }

    fn render_system(&self, input: &SystemPromptInput) -> Result<String> {
        let mut tools = input.tools.clone();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        let mut agents = input.agents.clone();
        agents.sort_by(|a, b| a.name.cmp(&b.name));

        let template = self.env.get_template("system")?;
        let rendered = template.render(context! {
            name => input.name.trim(),
            instructions => input.instructions.trim(),
            tools => tools,
            agents => agents,
            schema => response_schema().trim(),
            examples => examples()?,
        })?;
        Ok(rendered)
    }
}

/// Render the system prompt sent as the first message of an agent's history.
pub fn render_system_prompt(input: &SystemPromptInput) -> Result<String> {
    PromptEngine::new().render_system(input)
}

fn examples() -> Result<Vec<String>> {
    let samples = [
        json!({
            "activity": "Directory Analysis",
            "tasks": [
                {
                    "title": "Change Directory",
                    "description": "Navigate to the target directory for analysis.",
                    "task_type": "tool",
                    "tool_name": "cd",
                    "tool_params": {"path": "./target_dir"}
                },
                {
                    "title": "List Directory Contents",
                    "description": "List all files in the current directory.",
                    "task_type": "tool",
                    "tool_name": "ls",
                    "tool_params": {}
                }
            ]
        }),
        json!({
            "activity": "Summarize File",
            "tasks": [{
                "title": "Delegate summary",
                "description": "Ask a helper agent to summarize one file.",
                "task_type": "agent",
                "agent_name": "name of an agent from your available agents",
                "instructions": "Read notes.txt and summarize its contents in a paragraph."
            }]
        }),
        json!({
            "activity": "Report Results",
            "tasks": [{
                "title": "Final report",
                "description": "Return the findings to the caller.",
                "task_type": "completion",
                "result": "The directory contains three text files about project planning."
            }]
        }),
    ];
    samples
        .iter()
        .map(|sample| serde_json::to_string_pretty(sample).map_err(Into::into))
        .collect()
}
