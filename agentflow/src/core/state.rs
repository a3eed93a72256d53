//! Observable agent state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What an agent is doing right now. Diagnostic context, not a control input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Thinking,
    ExecutingTask,
    WaitingForAgent,
    WaitingForApproval,
}

impl AgentState {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Thinking => "thinking",
            AgentState::ExecutingTask => "executing_task",
            AgentState::WaitingForAgent => "waiting_for_agent",
            AgentState::WaitingForApproval => "waiting_for_approval",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
