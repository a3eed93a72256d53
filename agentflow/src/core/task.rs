//! Typed task model shared by the parser, the queue and the workflow.
//!
//! The variant set is closed: a task either invokes a tool, delegates to a
//! subordinate agent, or signals completion of the workflow. Construction
//! (including deserialization) validates the fields of each variant, so a
//! `Task` value is always well-formed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Minimum non-blank characters a delegation must carry to be actionable.
pub const MIN_INSTRUCTIONS_CHARS: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("unknown task type `{0}` (expected tool, agent or completion)")]
    UnknownType(String),
    #[error("task field `{0}` must not be empty")]
    EmptyField(&'static str),
    #[error("agent instructions too short ({len} chars, need at least {min})")]
    InstructionsTooShort { len: usize, min: usize },
    #[error("task list must contain at least one task")]
    EmptyBreakdown,
    #[error("task `{title}` is already owned by `{owner}`")]
    OwnerAlreadyAssigned { title: String, owner: String },
}

/// Discriminant of the closed task variant set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Tool,
    Agent,
    Completion,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Tool => "tool",
            TaskType::Agent => "agent",
            TaskType::Completion => "completion",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool" => Ok(TaskType::Tool),
            "agent" => Ok(TaskType::Agent),
            "completion" => Ok(TaskType::Completion),
            other => Err(TaskError::UnknownType(other.to_string())),
        }
    }
}

/// Variant-specific payload, tagged on the wire by `task_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "lowercase")]
pub enum TaskKind {
    Tool {
        tool_name: String,
        #[serde(default)]
        tool_params: Map<String, Value>,
    },
    Agent {
        agent_name: String,
        instructions: String,
    },
    Completion {
        result: String,
    },
}

impl TaskKind {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskKind::Tool { .. } => TaskType::Tool,
            TaskKind::Agent { .. } => TaskType::Agent,
            TaskKind::Completion { .. } => TaskType::Completion,
        }
    }
}

/// Wire shape of a task before validation.
#[derive(Debug, Deserialize)]
struct TaskSpec {
    title: String,
    description: String,
    #[serde(flatten)]
    kind: TaskKind,
}

/// One executable unit of work.
///
/// `owner_agent` is unset until the task is admitted to a queue and can be
/// assigned exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskSpec")]
pub struct Task {
    title: String,
    description: String,
    #[serde(flatten)]
    kind: TaskKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_agent: Option<String>,
}

impl Task {
    /// Build a validated task. Tool parameter strings get forward-slash paths.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        kind: TaskKind,
    ) -> Result<Self, TaskError> {
        let title = title.into();
        let description = description.into();
        require_text("title", &title)?;
        require_text("description", &description)?;

        let kind = match kind {
            TaskKind::Tool {
                tool_name,
                tool_params,
            } => {
                require_text("tool_name", &tool_name)?;
                TaskKind::Tool {
                    tool_name,
                    tool_params: normalize_params(tool_params),
                }
            }
            TaskKind::Agent {
                agent_name,
                instructions,
            } => {
                require_text("agent_name", &agent_name)?;
                let len = instructions.trim().chars().count();
                if len < MIN_INSTRUCTIONS_CHARS {
                    return Err(TaskError::InstructionsTooShort {
                        len,
                        min: MIN_INSTRUCTIONS_CHARS,
                    });
                }
                TaskKind::Agent {
                    agent_name,
                    instructions,
                }
            }
            TaskKind::Completion { result } => {
                require_text("result", &result)?;
                TaskKind::Completion { result }
            }
        };

        Ok(Self {
            title,
            description,
            kind,
            owner_agent: None,
        })
    }

    pub fn tool(
        title: impl Into<String>,
        description: impl Into<String>,
        tool_name: impl Into<String>,
        tool_params: Map<String, Value>,
    ) -> Result<Self, TaskError> {
        Self::new(
            title,
            description,
            TaskKind::Tool {
                tool_name: tool_name.into(),
                tool_params,
            },
        )
    }

    pub fn agent(
        title: impl Into<String>,
        description: impl Into<String>,
        agent_name: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Result<Self, TaskError> {
        Self::new(
            title,
            description,
            TaskKind::Agent {
                agent_name: agent_name.into(),
                instructions: instructions.into(),
            },
        )
    }

    pub fn completion(
        title: impl Into<String>,
        description: impl Into<String>,
        result: impl Into<String>,
    ) -> Result<Self, TaskError> {
        Self::new(
            title,
            description,
            TaskKind::Completion {
                result: result.into(),
            },
        )
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn task_type(&self) -> TaskType {
        self.kind.task_type()
    }

    pub fn owner_agent(&self) -> Option<&str> {
        self.owner_agent.as_deref()
    }

    /// Result text for completion tasks.
    pub fn result(&self) -> Option<&str> {
        match &self.kind {
            TaskKind::Completion { result } => Some(result),
            _ => None,
        }
    }

    /// Record the agent responsible for this task. Allowed once.
    pub fn assign_owner(&mut self, owner: &str) -> Result<(), TaskError> {
        if let Some(existing) = &self.owner_agent {
            return Err(TaskError::OwnerAlreadyAssigned {
                title: self.title.clone(),
                owner: existing.clone(),
            });
        }
        self.owner_agent = Some(owner.to_string());
        Ok(())
    }
}

impl TryFrom<TaskSpec> for Task {
    type Error = TaskError;

    fn try_from(spec: TaskSpec) -> Result<Self, Self::Error> {
        Task::new(spec.title, spec.description, spec.kind)
    }
}

#[derive(Debug, Deserialize)]
struct BreakdownSpec {
    activity: String,
    tasks: Vec<Task>,
}

/// A named batch of tasks returned by one planning call. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BreakdownSpec")]
pub struct TaskBreakdown {
    activity: String,
    tasks: Vec<Task>,
}

impl TaskBreakdown {
    pub fn new(activity: impl Into<String>, tasks: Vec<Task>) -> Result<Self, TaskError> {
        let activity = activity.into();
        require_text("activity", &activity)?;
        if tasks.is_empty() {
            return Err(TaskError::EmptyBreakdown);
        }
        Ok(Self { activity, tasks })
    }

    pub fn activity(&self) -> &str {
        &self.activity
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn into_parts(self) -> (String, Vec<Task>) {
        (self.activity, self.tasks)
    }
}

impl TryFrom<BreakdownSpec> for TaskBreakdown {
    type Error = TaskError;

    fn try_from(spec: BreakdownSpec) -> Result<Self, Self::Error> {
        TaskBreakdown::new(spec.activity, spec.tasks)
    }
}

/// Replace backslash path separators with forward slashes.
pub fn normalize_path_separators(text: &str) -> String {
    text.replace('\\', "/")
}

fn normalize_params(params: Map<String, Value>) -> Map<String, Value> {
    params
        .into_iter()
        .map(|(key, value)| (key, normalize_value(value)))
        .collect()
}

fn normalize_value(value: Value) -> Value {
    match value {
        Value::String(s) if s.contains('\\') => Value::String(normalize_path_separators(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        Value::Object(map) => Value::Object(normalize_params(map)),
        other => other,
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), TaskError> {
    if value.trim().is_empty() {
        return Err(TaskError::EmptyField(field));
    }
    Ok(())
}
