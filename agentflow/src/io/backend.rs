//! Model backend abstraction.
//!
//! The [`Backend`] trait decouples the workflow from the model transport.
//! Backends are constructed explicitly and passed into the workflow; tests use
//! scripted backends that return canned responses without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::io::config::{BackendConfig, BackendInput};
use crate::io::process::run_command_with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry in an agent's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, name: &str) -> Self {
        Self {
            role,
            content: content.into(),
            name: Some(name.to_string()),
        }
    }
}

/// Parameters for a single generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    /// Name of the agent asking.
    pub agent: &'a str,
    /// Model identifier configured for the agent.
    pub model: &'a str,
    /// Full conversation history, oldest first.
    pub messages: &'a [Message],
}

/// Abstraction over model backends.
pub trait Backend {
    /// Return the raw model output for the conversation in `request`.
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String>;
}

/// Backend that runs a local command and reads the response from stdout.
///
/// The conversation is written to stdin, either as a plain transcript or as
/// a `{"model", "messages"}` JSON document.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    command: Vec<String>,
    input: BackendInput,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            command: config.command.clone(),
            input: config.input,
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn build_command(&self, model: &str) -> Result<Command> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("backend command is empty"))?;
        let mut cmd = Command::new(program.replace("{model}", model));
        cmd.args(args.iter().map(|arg| arg.replace("{model}", model)));
        Ok(cmd)
    }
}

impl Backend for CommandBackend {
    #[instrument(skip_all, fields(agent = request.agent, model = request.model, messages = request.messages.len()))]
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
        let cmd = self.build_command(request.model)?;
        let stdin = render_input(self.input, request)?;

        let output =
            run_command_with_timeout(cmd, Some(stdin.as_bytes()), self.timeout, self.output_limit_bytes)
                .context("run backend command")?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "backend command timed out");
            return Err(anyhow!("backend command timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(exit_code = ?output.status.code(), "backend command failed");
            return Err(anyhow!(
                "backend command failed with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }

        let response = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if response.is_empty() {
            return Err(anyhow!("backend returned an empty response"));
        }
        debug!(bytes = response.len(), "backend response received");
        Ok(response)
    }
}

fn render_input(input: BackendInput, request: &GenerateRequest<'_>) -> Result<String> {
    match input {
        BackendInput::Text => Ok(render_transcript(request.messages)),
        BackendInput::Json => {
            let payload = serde_json::json!({
                "model": request.model,
                "messages": request.messages,
            });
            serde_json::to_string(&payload).context("serialize backend request")
        }
    }
}

/// Plain-text transcript, one `[role]` block per message.
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|msg| format!("[{}]\n{}", msg.role.as_str(), msg.content.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> Vec<Message> {
        vec![
            Message::new(Role::System, "You plan tasks.", "planner"),
            Message::new(Role::User, "List the files.", "planner"),
        ]
    }

    fn backend(command: &[&str], input: BackendInput) -> CommandBackend {
        CommandBackend::new(&BackendConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            input,
            timeout_secs: 5,
            output_limit_bytes: 10_000,
        })
    }

    #[test]
    fn transcript_has_role_blocks() {
        let text = render_transcript(&messages());
        assert_eq!(text, "[system]\nYou plan tasks.\n\n[user]\nList the files.");
    }

    #[test]
    fn json_input_carries_model_and_messages() {
        let msgs = messages();
        let request = GenerateRequest {
            agent: "planner",
            model: "tiny",
            messages: &msgs,
        };
        let raw = render_input(BackendInput::Json, &request).expect("render");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["model"], "tiny");
        assert_eq!(value["messages"][1]["role"], "user");
    }

    #[cfg(unix)]
    #[test]
    fn command_backend_echoes_stdin() {
        let msgs = messages();
        let request = GenerateRequest {
            agent: "planner",
            model: "tiny",
            messages: &msgs,
        };
        let response = backend(&["cat"], BackendInput::Text)
            .generate(&request)
            .expect("generate");
        assert!(response.contains("List the files."));
    }

    #[cfg(unix)]
    #[test]
    fn command_backend_substitutes_model() {
        let msgs = messages();
        let request = GenerateRequest {
            agent: "planner",
            model: "tiny",
            messages: &msgs,
        };
        let response = backend(&["echo", "model={model}"], BackendInput::Text)
            .generate(&request)
            .expect("generate");
        assert_eq!(response, "model=tiny");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_an_error() {
        let msgs = messages();
        let request = GenerateRequest {
            agent: "planner",
            model: "tiny",
            messages: &msgs,
        };
        let err = backend(&["false"], BackendInput::Text)
            .generate(&request)
            .unwrap_err();
        assert!(err.to_string().contains("failed with status"));
    }
}
