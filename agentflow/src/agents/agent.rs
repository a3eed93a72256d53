//! A single agent: conversation history, tools and known subordinates.

use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::core::notes::{completed_summary, subordinate_result_note, tool_result_note};
use crate::core::state::AgentState;
use crate::core::task::Task;
use crate::io::backend::{Backend, GenerateRequest, Message, Role, render_transcript};
use crate::io::tools::{ToolError, ToolRegistry};

use super::AgentId;

#[derive(Debug)]
pub struct Agent {
    name: String,
    description: String,
    model: String,
    system_prompt: String,
    tools: ToolRegistry,
    subordinates: BTreeMap<String, AgentId>,
    messages: Vec<Message>,
    state: AgentState,
}

impl Agent {
    pub(super) fn new(
        name: String,
        description: String,
        model: String,
        system_prompt: String,
        tools: ToolRegistry,
        subordinates: BTreeMap<String, AgentId>,
    ) -> Self {
        Self {
            name,
            description,
            model,
            system_prompt,
            tools,
            subordinates,
            messages: Vec::new(),
            state: AgentState::Idle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Set the state, returning the previous one.
    pub fn set_state(&mut self, state: AgentState) -> AgentState {
        std::mem::replace(&mut self.state, state)
    }

    /// Resolve a delegation target among this agent's declared subordinates.
    pub fn subordinate(&self, name: &str) -> Option<AgentId> {
        self.subordinates.get(name).copied()
    }

    /// Ask the model for the next plan.
    ///
    /// History grows as: system prompt (first call only), completed-task
    /// summary (if any), `prompt`, model response. The prompt stays in the
    /// history even when the backend fails.
    #[instrument(skip_all, fields(agent = %self.name))]
    pub fn generate_response(
        &mut self,
        backend: &dyn Backend,
        prompt: &str,
        completed: &[Task],
    ) -> Result<String> {
        if self.messages.is_empty() {
            let system = Message::new(Role::System, self.system_prompt.clone(), &self.name);
            self.messages.push(system);
        }
        if let Some(summary) = completed_summary(completed) {
            self.push(Role::System, summary);
        }
        self.push(Role::User, prompt.to_string());

        debug!(
            "messages being sent to the model:\n{}",
            render_transcript(&self.messages)
        );

        let response = backend.generate(&GenerateRequest {
            agent: &self.name,
            model: &self.model,
            messages: &self.messages,
        })?;
        self.push(Role::Assistant, response.clone());
        Ok(response)
    }

    pub fn tool_requires_approval(&self, name: &str) -> Result<bool, ToolError> {
        self.tools.requires_approval(name)
    }

    /// Run a tool and return its textual result. Failures come back as `Error: ...`.
    pub fn execute_tool(&mut self, name: &str, params: &Map<String, Value>) -> String {
        match self.tools.execute(name, params) {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => format!("Error: {err:#}"),
            Err(err) => format!("Error: {err}"),
        }
    }

    pub fn record_tool_result(&mut self, tool_name: &str, result: &str) {
        self.push(Role::System, tool_result_note(tool_name, result));
    }

    pub fn record_subordinate_result(&mut self, agent_name: &str, result: &str) {
        self.push(Role::System, subordinate_result_note(agent_name, result));
    }

    pub fn record_note(&mut self, note: String) {
        self.push(Role::System, note);
    }

    fn push(&mut self, role: Role, content: String) {
        let message = Message::new(role, content, &self.name);
        self.messages.push(message);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::io::tools::BUILTIN_TOOLS;

    struct Echo {
        seen: RefCell<Vec<usize>>,
    }

    impl Backend for Echo {
        fn generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
            self.seen.borrow_mut().push(request.messages.len());
            Ok(format!("reply from {}", request.model))
        }
    }

    fn agent() -> Agent {
        Agent::new(
            "planner".to_string(),
            "Plans things".to_string(),
            "tiny".to_string(),
            "SYSTEM".to_string(),
            ToolRegistry::from_names(BUILTIN_TOOLS, ".").expect("tools"),
            BTreeMap::new(),
        )
    }

    #[test]
    fn system_prompt_is_sent_once_and_summary_precedes_prompt() {
        let backend = Echo {
            seen: RefCell::new(Vec::new()),
        };
        let mut agent = agent();

        agent.generate_response(&backend, "first", &[]).expect("first");
        let done = Task::completion("Done", "Finished", "ok").expect("task");
        agent
            .generate_response(&backend, "second", std::slice::from_ref(&done))
            .expect("second");

        let roles: Vec<Role> = agent.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::System,
                Role::User,
                Role::Assistant,
            ]
        );
        assert_eq!(agent.messages()[0].content, "SYSTEM");
        assert!(agent.messages()[3].content.contains("Previously Completed Tasks"));
        assert_eq!(agent.messages()[5].content, "reply from tiny");
        assert_eq!(*backend.seen.borrow(), vec![2, 5]);
    }

    #[test]
    fn unknown_tool_is_reported_as_text() {
        let mut agent = agent();
        let out = agent.execute_tool("teleport", &Map::new());
        assert_eq!(out, "Error: Tool 'teleport' not found");
    }

    #[test]
    fn failing_tool_is_reported_as_text() {
        let mut agent = agent();
        let out = agent.execute_tool("read_file", &Map::new());
        assert!(out.starts_with("Error: "), "{out}");
    }

    #[test]
    fn results_are_recorded_as_system_notes() {
        let mut agent = agent();
        agent.record_tool_result("ls", "a.txt");
        agent.record_subordinate_result("helper", "summary");
        assert!(agent.messages().iter().all(|m| m.role == Role::System));
        assert!(agent.messages()[1].content.contains("Agent: helper"));
    }
}
