//! Recursive workflow engine.
//!
//! One invocation owns one [`TaskQueue`] and drives a single agent:
//!
//! 1. Ask the agent for a plan (retrying unparseable responses with a
//!    correction prompt, up to `max_parse_attempts`) and enqueue it.
//! 2. Drain the queue in FIFO order, dispatching on the task variant:
//!    tools run and feed their result back for a follow-up plan, delegations
//!    run a nested invocation on the subordinate, a completion ends the run
//!    and discards whatever is still pending.
//!
//! Nested invocations share a [`DelegationBudget`] so runaway delegation
//! chains are refused instead of recursing forever.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::agents::{AgentId, AgentSet};
use crate::core::budget::DelegationBudget;
use crate::core::notes::{
    correction_prompt, delegation_refused_note, subordinate_follow_up, tool_follow_up,
};
use crate::core::parser::{ParseError, ResponseParser};
use crate::core::queue::{QueueError, TaskQueue};
use crate::core::state::AgentState;
use crate::core::task::{Task, TaskBreakdown, TaskError, TaskKind, normalize_path_separators};
use crate::events::WorkflowEvent;
use crate::io::backend::Backend;
use crate::io::config::WorkflowSettings;
use crate::io::tools::{Approver, CANCELLED_BY_USER};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("backend failed for agent `{agent}`: {message}")]
    Backend { agent: String, message: String },
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Task(#[from] TaskError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub max_parse_attempts: u32,
    pub max_delegation_depth: u32,
    /// `None` disables the wall-clock budget for delegations.
    pub delegation_timeout: Option<Duration>,
    pub replace_pending_on_follow_up: bool,
}

impl From<&WorkflowSettings> for WorkflowConfig {
    fn from(settings: &WorkflowSettings) -> Self {
        Self {
            max_parse_attempts: settings.max_parse_attempts,
            max_delegation_depth: settings.max_delegation_depth,
            delegation_timeout: (settings.delegation_timeout_secs > 0)
                .then(|| Duration::from_secs(settings.delegation_timeout_secs)),
            replace_pending_on_follow_up: settings.replace_pending_on_follow_up,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::from(&WorkflowSettings::default())
    }
}

/// How a workflow invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// A completion task was processed.
    Completed,
    /// The queue ran dry without a completion task.
    Drained,
    /// A planning step exhausted its parse attempts.
    ParseFailed {
        attempts: u32,
        error: String,
        raw: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowOutcome {
    pub status: WorkflowStatus,
    pub final_result: Option<String>,
    /// Handled tasks, in the order they were handled.
    pub completed: Vec<Task>,
    /// Activity names of every accepted plan.
    pub activities: Vec<String>,
}

type Observer<'a> = Box<dyn FnMut(&WorkflowEvent) + 'a>;

/// Engine holding the collaborators shared by every nested invocation.
pub struct Workflow<'a> {
    backend: &'a dyn Backend,
    approver: &'a dyn Approver,
    parser: ResponseParser,
    config: WorkflowConfig,
    observer: Option<Observer<'a>>,
}

/// Per-invocation state.
struct Invocation {
    agent: AgentId,
    name: String,
    budget: DelegationBudget,
    queue: TaskQueue,
    activities: Vec<String>,
}

impl Invocation {
    fn depth(&self) -> u32 {
        self.budget.depth()
    }

    fn finish(self, status: WorkflowStatus, final_result: Option<String>) -> WorkflowOutcome {
        WorkflowOutcome {
            status,
            final_result,
            completed: self.queue.into_completed(),
            activities: self.activities,
        }
    }
}

struct ParseFailure {
    attempts: u32,
    error: ParseError,
    raw: String,
}

impl ParseFailure {
    fn into_status(self) -> WorkflowStatus {
        WorkflowStatus::ParseFailed {
            attempts: self.attempts,
            error: self.error.to_string(),
            raw: self.raw,
        }
    }
}

enum Plan {
    Ready(TaskBreakdown),
    Failed(ParseFailure),
}

enum Step {
    Continue,
    Finished(String),
    ParseFailed(ParseFailure),
}

impl<'a> Workflow<'a> {
    pub fn new(backend: &'a dyn Backend, approver: &'a dyn Approver, config: WorkflowConfig) -> Self {
        Self {
            backend,
            approver,
            parser: ResponseParser::new(),
            config,
            observer: None,
        }
    }

    /// Receive every [`WorkflowEvent`] as it happens.
    pub fn with_observer(mut self, observer: impl FnMut(&WorkflowEvent) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Run `agent` on `prompt` until it completes, drains its queue or fails to plan.
    ///
    /// Parse failures are reported through [`WorkflowStatus::ParseFailed`];
    /// only backend failures and queue misuse surface as errors.
    pub fn run(
        &mut self,
        agents: &mut AgentSet,
        agent: AgentId,
        prompt: &str,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let budget = DelegationBudget::new(
            self.config.max_delegation_depth,
            self.config.delegation_timeout,
        );
        self.run_with_budget(agents, agent, prompt, budget)
    }

    #[instrument(skip_all, fields(agent = agents.get(agent).name(), depth = budget.depth()))]
    fn run_with_budget(
        &mut self,
        agents: &mut AgentSet,
        agent: AgentId,
        prompt: &str,
        budget: DelegationBudget,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let prompt = normalize_path_separators(prompt);
        let mut inv = Invocation {
            agent,
            name: agents.get(agent).name().to_string(),
            budget,
            queue: TaskQueue::new(),
            activities: Vec::new(),
        };
        info!("workflow started");

        match self.plan(agents, &inv, &prompt)? {
            Plan::Ready(breakdown) => self.admit(&mut inv, breakdown, false)?,
            Plan::Failed(failure) => {
                self.transition(agents, &inv, AgentState::Idle);
                return Ok(inv.finish(failure.into_status(), None));
            }
        }

        let mut final_result = None;
        let mut failure = None;
        while let Some(task) = inv.queue.dequeue_next()? {
            self.emit(WorkflowEvent::TaskStarted {
                depth: inv.depth(),
                number: inv.queue.completed().len() + 1,
                title: task.title().to_string(),
                description: task.description().to_string(),
                task_type: task.task_type(),
                owner: task.owner_agent().unwrap_or(&inv.name).to_string(),
                remaining: inv.queue.pending_len(),
            });
            info!(title = task.title(), task_type = %task.task_type(), "dispatching task");

            let step = match task.kind() {
                TaskKind::Tool {
                    tool_name,
                    tool_params,
                } => self.run_tool(agents, &mut inv, tool_name, tool_params)?,
                TaskKind::Agent {
                    agent_name,
                    instructions,
                } => self.delegate(agents, &mut inv, agent_name, instructions)?,
                TaskKind::Completion { result } => {
                    self.emit(WorkflowEvent::Completed {
                        depth: inv.depth(),
                        agent: inv.name.clone(),
                        result: result.clone(),
                    });
                    self.discard_pending(&mut inv, "completion");
                    Step::Finished(result.clone())
                }
            };

            inv.queue.complete_current();
            self.transition(agents, &inv, AgentState::Idle);

            match step {
                Step::Continue => {}
                Step::Finished(result) => {
                    final_result = Some(result);
                    break;
                }
                Step::ParseFailed(parse_failure) => {
                    self.discard_pending(&mut inv, "unparseable follow-up");
                    failure = Some(parse_failure);
                    break;
                }
            }
        }

        let status = match (failure, &final_result) {
            (Some(failure), _) => failure.into_status(),
            (None, Some(_)) => WorkflowStatus::Completed,
            (None, None) => WorkflowStatus::Drained,
        };
        info!(?status, "workflow finished");
        Ok(inv.finish(status, final_result))
    }

    /// Generate and parse a plan, re-prompting with a correction on parse errors.
    fn plan(
        &mut self,
        agents: &mut AgentSet,
        inv: &Invocation,
        prompt: &str,
    ) -> Result<Plan, WorkflowError> {
        let max_attempts = self.config.max_parse_attempts.max(1);
        let mut prompt = prompt.to_string();
        let mut attempt = 1;
        loop {
            self.transition(agents, inv, AgentState::Thinking);
            let raw = agents
                .get_mut(inv.agent)
                .generate_response(self.backend, &prompt, inv.queue.completed())
                .map_err(|err| WorkflowError::Backend {
                    agent: inv.name.clone(),
                    message: format!("{err:#}"),
                })?;

            match self.parser.parse(&raw) {
                Ok(breakdown) => return Ok(Plan::Ready(breakdown)),
                Err(parse_error) if attempt < max_attempts => {
                    warn!(attempt, max_attempts, error = %parse_error, "unparseable response, requesting correction");
                    self.emit(WorkflowEvent::ParseRetry {
                        depth: inv.depth(),
                        agent: inv.name.clone(),
                        attempt,
                        max_attempts,
                        error: parse_error.to_string(),
                    });
                    prompt = correction_prompt(&parse_error.to_string());
                    attempt += 1;
                }
                Err(parse_error) => {
                    error!(attempts = attempt, error = %parse_error, raw = %raw, "giving up on unparseable response");
                    self.emit(WorkflowEvent::ParseFailed {
                        depth: inv.depth(),
                        agent: inv.name.clone(),
                        attempts: attempt,
                        error: parse_error.to_string(),
                        raw: raw.clone(),
                    });
                    return Ok(Plan::Failed(ParseFailure {
                        attempts: attempt,
                        error: parse_error,
                        raw,
                    }));
                }
            }
        }
    }

    fn admit(
        &mut self,
        inv: &mut Invocation,
        breakdown: TaskBreakdown,
        replace_pending: bool,
    ) -> Result<(), WorkflowError> {
        let (activity, tasks) = breakdown.into_parts();
        if replace_pending {
            let dropped = inv.queue.clear_pending();
            if dropped > 0 {
                debug!(dropped, "follow-up plan replaces pending tasks");
            }
        }
        info!(activity = %activity, tasks = tasks.len(), "plan received");
        self.emit(WorkflowEvent::PlanReceived {
            depth: inv.depth(),
            agent: inv.name.clone(),
            activity: activity.clone(),
            tasks: tasks.len(),
        });
        inv.queue.enqueue_many(&inv.name, tasks)?;
        inv.activities.push(activity);
        Ok(())
    }

    fn follow_up(
        &mut self,
        agents: &mut AgentSet,
        inv: &mut Invocation,
        prompt: &str,
    ) -> Result<Step, WorkflowError> {
        match self.plan(agents, inv, prompt)? {
            Plan::Ready(breakdown) => {
                let replace = self.config.replace_pending_on_follow_up;
                self.admit(inv, breakdown, replace)?;
                Ok(Step::Continue)
            }
            Plan::Failed(failure) => Ok(Step::ParseFailed(failure)),
        }
    }

    fn run_tool(
        &mut self,
        agents: &mut AgentSet,
        inv: &mut Invocation,
        tool_name: &str,
        params: &Map<String, Value>,
    ) -> Result<Step, WorkflowError> {
        self.transition(agents, inv, AgentState::ExecutingTask);
        let result = self.execute_tool(agents, inv, tool_name, params);
        self.emit(WorkflowEvent::ToolFinished {
            depth: inv.depth(),
            agent: inv.name.clone(),
            tool: tool_name.to_string(),
            result: result.clone(),
        });
        agents
            .get_mut(inv.agent)
            .record_tool_result(tool_name, &result);

        // Completed before the follow-up so its summary includes this task.
        inv.queue.complete_current();
        self.follow_up(agents, inv, &tool_follow_up(tool_name))
    }

    fn execute_tool(
        &mut self,
        agents: &mut AgentSet,
        inv: &Invocation,
        tool_name: &str,
        params: &Map<String, Value>,
    ) -> String {
        match agents.get(inv.agent).tool_requires_approval(tool_name) {
            Ok(true) => {
                self.transition(agents, inv, AgentState::WaitingForApproval);
                let approved = self
                    .approver
                    .approve(&inv.name, tool_name, params)
                    .unwrap_or_else(|err| {
                        let message = format!("{err:#}");
                        warn!(error = %message, "approval prompt failed, treating as refusal");
                        false
                    });
                self.transition(agents, inv, AgentState::ExecutingTask);
                if !approved {
                    info!(tool = tool_name, "tool execution refused");
                    return CANCELLED_BY_USER.to_string();
                }
            }
            Ok(false) => {}
            Err(err) => {
                warn!(tool = tool_name, "unknown tool requested");
                return format!("Error: {err}");
            }
        }
        agents.get_mut(inv.agent).execute_tool(tool_name, params)
    }

    fn delegate(
        &mut self,
        agents: &mut AgentSet,
        inv: &mut Invocation,
        subordinate: &str,
        instructions: &str,
    ) -> Result<Step, WorkflowError> {
        self.transition(agents, inv, AgentState::WaitingForAgent);

        let Some(sub_id) = agents.get(inv.agent).subordinate(subordinate) else {
            warn!(subordinate, "subordinate agent not found, skipping delegation");
            self.emit(WorkflowEvent::SubordinateMissing {
                depth: inv.depth(),
                agent: inv.name.clone(),
                subordinate: subordinate.to_string(),
            });
            return Ok(Step::Continue);
        };

        let nested_budget = match inv.budget.descend() {
            Ok(budget) => budget,
            Err(err) => {
                warn!(subordinate, error = %err, "delegation refused");
                agents
                    .get_mut(inv.agent)
                    .record_note(delegation_refused_note(subordinate, &err.to_string()));
                self.emit(WorkflowEvent::DelegationRefused {
                    depth: inv.depth(),
                    agent: inv.name.clone(),
                    subordinate: subordinate.to_string(),
                    reason: err.to_string(),
                });
                return Ok(Step::Continue);
            }
        };

        info!(subordinate, "delegating");
        self.emit(WorkflowEvent::Delegating {
            depth: inv.depth(),
            agent: inv.name.clone(),
            subordinate: subordinate.to_string(),
            instructions: instructions.to_string(),
        });
        let nested = self.run_with_budget(agents, sub_id, instructions, nested_budget)?;

        let result = nested
            .completed
            .last()
            .and_then(|task| task.result())
            .map(str::to_string);
        let Some(result) = result else {
            warn!(subordinate, "no result available from subordinate");
            self.emit(WorkflowEvent::NoSubordinateResult {
                depth: inv.depth(),
                agent: inv.name.clone(),
                subordinate: subordinate.to_string(),
            });
            return Ok(Step::Continue);
        };

        self.emit(WorkflowEvent::SubordinateResult {
            depth: inv.depth(),
            agent: inv.name.clone(),
            subordinate: subordinate.to_string(),
            result: result.clone(),
        });
        agents
            .get_mut(inv.agent)
            .record_subordinate_result(subordinate, &result);
        inv.queue.complete_current();
        self.follow_up(agents, inv, &subordinate_follow_up(subordinate))
    }

    fn discard_pending(&mut self, inv: &mut Invocation, reason: &str) {
        let discarded = inv.queue.clear_pending();
        if discarded > 0 {
            info!(discarded, reason, "discarding pending tasks");
            self.emit(WorkflowEvent::PendingDiscarded {
                depth: inv.depth(),
                agent: inv.name.clone(),
                count: discarded,
            });
        }
    }

    fn transition(&mut self, agents: &mut AgentSet, inv: &Invocation, state: AgentState) {
        let from = agents.get_mut(inv.agent).set_state(state);
        if from != state {
            debug!(from = %from, to = %state, "agent state changed");
            self.emit(WorkflowEvent::StateChanged {
                depth: inv.depth(),
                agent: inv.name.clone(),
                from,
                to: state,
            });
        }
    }

    fn emit(&mut self, event: WorkflowEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
    }
}
