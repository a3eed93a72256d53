//! Test-only helpers: a scripted model backend and task/agent fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::agents::AgentSet;
use crate::io::backend::{Backend, GenerateRequest, Message};
use crate::io::config::AgentDefinition;

/// A generation call as seen by [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub agent: String,
    pub model: String,
    pub messages: Vec<Message>,
}

impl RecordedRequest {
    /// Content of the last message (the prompt that triggered the call).
    pub fn prompt(&self) -> &str {
        self.messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    pub fn mentions(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.content.contains(needle))
    }
}

/// Backend returning canned responses in order; errors once they run out.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(Into::into).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }
}

impl Backend for ScriptedBackend {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
        self.requests.borrow_mut().push(RecordedRequest {
            agent: request.agent.to_string(),
            model: request.model.to_string(),
            messages: request.messages.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted backend exhausted (agent {})", request.agent))
    }
}

pub fn tool_task(title: &str, tool: &str, params: Value) -> Value {
    json!({
        "title": title,
        "description": format!("{title} using {tool}"),
        "task_type": "tool",
        "tool_name": tool,
        "tool_params": params,
    })
}

pub fn agent_task(agent: &str, instructions: &str) -> Value {
    json!({
        "title": format!("Delegate to {agent}"),
        "description": format!("Ask {agent} for help"),
        "task_type": "agent",
        "agent_name": agent,
        "instructions": instructions,
    })
}

pub fn completion_task(result: &str) -> Value {
    json!({
        "title": "Report",
        "description": "Report the final result",
        "task_type": "completion",
        "result": result,
    })
}

/// Serialized planning response.
pub fn breakdown(activity: &str, tasks: Vec<Value>) -> String {
    json!({ "activity": activity, "tasks": tasks }).to_string()
}

pub fn agent_def(name: &str, tools: &[&str], subordinates: &[&str]) -> AgentDefinition {
    AgentDefinition {
        name: name.to_string(),
        description: format!("{name} test agent"),
        instructions: format!("You are {name}. Respond with JSON task lists."),
        model: "test-model".to_string(),
        tools: tools.iter().map(|s| s.to_string()).collect(),
        subordinates: subordinates.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn agent_set(definitions: &[AgentDefinition], cwd: &Path) -> AgentSet {
    AgentSet::from_definitions(definitions, cwd).expect("test agents should build")
}

/// Temporary directory populated with `(relative path, contents)` files.
pub fn workspace_with_files(files: &[(&str, &str)]) -> Result<TempDir> {
    let dir = tempfile::tempdir()?;
    for (path, contents) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, contents)?;
    }
    Ok(dir)
}
