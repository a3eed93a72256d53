//! Progress events emitted by the workflow engine.
//!
//! Events are product output (what the CLI prints), separate from `tracing`
//! diagnostics. Every event carries the delegation depth it happened at.

use std::fmt;

use crate::core::state::AgentState;
use crate::core::task::TaskType;

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    StateChanged {
        depth: u32,
        agent: String,
        from: AgentState,
        to: AgentState,
    },
    PlanReceived {
        depth: u32,
        agent: String,
        activity: String,
        tasks: usize,
    },
    ParseRetry {
        depth: u32,
        agent: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    ParseFailed {
        depth: u32,
        agent: String,
        attempts: u32,
        error: String,
        raw: String,
    },
    TaskStarted {
        depth: u32,
        number: usize,
        title: String,
        description: String,
        task_type: TaskType,
        owner: String,
        remaining: usize,
    },
    ToolFinished {
        depth: u32,
        agent: String,
        tool: String,
        result: String,
    },
    Delegating {
        depth: u32,
        agent: String,
        subordinate: String,
        instructions: String,
    },
    SubordinateMissing {
        depth: u32,
        agent: String,
        subordinate: String,
    },
    DelegationRefused {
        depth: u32,
        agent: String,
        subordinate: String,
        reason: String,
    },
    SubordinateResult {
        depth: u32,
        agent: String,
        subordinate: String,
        result: String,
    },
    NoSubordinateResult {
        depth: u32,
        agent: String,
        subordinate: String,
    },
    Completed {
        depth: u32,
        agent: String,
        result: String,
    },
    PendingDiscarded {
        depth: u32,
        agent: String,
        count: usize,
    },
}

impl WorkflowEvent {
    pub fn depth(&self) -> u32 {
        match self {
            WorkflowEvent::StateChanged { depth, .. }
            | WorkflowEvent::PlanReceived { depth, .. }
            | WorkflowEvent::ParseRetry { depth, .. }
            | WorkflowEvent::ParseFailed { depth, .. }
            | WorkflowEvent::TaskStarted { depth, .. }
            | WorkflowEvent::ToolFinished { depth, .. }
            | WorkflowEvent::Delegating { depth, .. }
            | WorkflowEvent::SubordinateMissing { depth, .. }
            | WorkflowEvent::DelegationRefused { depth, .. }
            | WorkflowEvent::SubordinateResult { depth, .. }
            | WorkflowEvent::NoSubordinateResult { depth, .. }
            | WorkflowEvent::Completed { depth, .. }
            | WorkflowEvent::PendingDiscarded { depth, .. } => *depth,
        }
    }

    /// State transitions are noisy; the CLI only shows them when verbose.
    pub fn is_state_change(&self) -> bool {
        matches!(self, WorkflowEvent::StateChanged { .. })
    }
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = "  ".repeat(self.depth() as usize);
        f.write_str(&indent)?;
        match self {
            WorkflowEvent::StateChanged {
                agent, from, to, ..
            } => write!(f, "[{agent}] {from} -> {to}"),
            WorkflowEvent::PlanReceived {
                agent,
                activity,
                tasks,
                ..
            } => write!(f, "[{agent}] Activity: {activity} ({tasks} task(s))"),
            WorkflowEvent::ParseRetry {
                agent,
                attempt,
                max_attempts,
                error,
                ..
            } => write!(
                f,
                "[{agent}] Could not parse response (attempt {attempt}/{max_attempts}): {error}"
            ),
            WorkflowEvent::ParseFailed {
                agent,
                attempts,
                error,
                raw,
                ..
            } => write!(
                f,
                "[{agent}] Giving up after {attempts} unparseable response(s): {error}\n{indent}Raw response:\n{raw}"
            ),
            WorkflowEvent::TaskStarted {
                number,
                title,
                description,
                task_type,
                owner,
                remaining,
                ..
            } => write!(
                f,
                "Task {number} [{task_type}] {title} (owner: {owner}, {remaining} pending)\n{indent}  {description}"
            ),
            WorkflowEvent::ToolFinished {
                agent, tool, result, ..
            } => write!(f, "[{agent}] {tool} -> {}", preview(result)),
            WorkflowEvent::Delegating {
                agent,
                subordinate,
                instructions,
                ..
            } => write!(f, "[{agent}] Delegating to {subordinate}: {instructions}"),
            WorkflowEvent::SubordinateMissing {
                agent, subordinate, ..
            } => write!(
                f,
                "[{agent}] Subordinate agent '{subordinate}' not found, skipping task"
            ),
            WorkflowEvent::DelegationRefused {
                agent,
                subordinate,
                reason,
                ..
            } => write!(
                f,
                "[{agent}] Delegation to {subordinate} refused: {reason}"
            ),
            WorkflowEvent::SubordinateResult {
                agent,
                subordinate,
                result,
                ..
            } => write!(
                f,
                "[{agent}] Result from {subordinate}: {}",
                preview(result)
            ),
            WorkflowEvent::NoSubordinateResult {
                agent, subordinate, ..
            } => write!(
                f,
                "[{agent}] No result available from {subordinate}"
            ),
            WorkflowEvent::Completed { agent, result, .. } => {
                write!(f, "[{agent}] Completed: {result}")
            }
            WorkflowEvent::PendingDiscarded { agent, count, .. } => write!(
                f,
                "[{agent}] Discarded {count} pending task(s) after completion"
            ),
        }
    }
}

fn preview(text: &str) -> String {
    let flat = text.trim().replace('\n', " | ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}
