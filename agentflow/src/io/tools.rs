//! Built-in tools agents can invoke from `tool` tasks.
//!
//! Each agent owns a [`ToolRegistry`] holding only the tools it was configured
//! with, plus its own working directory (changed by `cd`). Tool failures are
//! returned as errors and rendered by the agent as `Error: ...` text for the
//! model to react to.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

/// Names accepted in an agent's `tools` list.
pub const BUILTIN_TOOLS: &[&str] = &["ls", "cd", "read_file", "create_file", "create_folder"];

/// Result text when the approval gate refuses a tool.
pub const CANCELLED_BY_USER: &str = "Tool execution cancelled by user";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    NotFound(String),
    #[error("'{0}' parameter is required")]
    MissingParam(&'static str),
}

/// Mutable state shared by the tools of one agent.
#[derive(Debug, Clone)]
pub struct ToolContext {
    cwd: PathBuf,
}

impl ToolContext {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Resolve `path` against the working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.cwd.join(candidate)
        }
    }
}

pub trait Tool {
    fn description(&self) -> &'static str;

    fn requires_approval(&self) -> bool {
        false
    }

    fn execute(&self, ctx: &mut ToolContext, params: &Map<String, Value>) -> Result<String>;
}

/// Decides whether a tool that needs approval may run.
pub trait Approver {
    fn approve(&self, agent: &str, tool: &str, params: &Map<String, Value>) -> Result<bool>;
}

/// Asks on the terminal and reads `y`/`n` from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinApprover;

impl Approver for StdinApprover {
    fn approve(&self, agent: &str, tool: &str, params: &Map<String, Value>) -> Result<bool> {
        let params = Value::Object(params.clone());
        let mut stderr = std::io::stderr().lock();
        write!(
            stderr,
            "{agent} wants to run `{tool}` with {params}. Approve? (y/n): "
        )
        .context("write approval prompt")?;
        stderr.flush().context("flush approval prompt")?;

        let mut answer = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("read approval answer")?;
        Ok(answer.trim().eq_ignore_ascii_case("y"))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl Approver for AutoApprove {
    fn approve(&self, _agent: &str, _tool: &str, _params: &Map<String, Value>) -> Result<bool> {
        Ok(true)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl Approver for DenyAll {
    fn approve(&self, _agent: &str, _tool: &str, _params: &Map<String, Value>) -> Result<bool> {
        Ok(false)
    }
}

/// Tools available to one agent, keyed by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
    ctx: ToolContext,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl ToolRegistry {
    pub fn empty(cwd: impl Into<PathBuf>) -> Self {
        Self {
            tools: BTreeMap::new(),
            ctx: ToolContext::new(cwd),
        }
    }

    /// Registry holding the named built-in tools.
    pub fn from_names<S: AsRef<str>>(names: &[S], cwd: impl Into<PathBuf>) -> Result<Self, ToolError> {
        let mut registry = Self::empty(cwd);
        for name in names {
            let name = name.as_ref();
            let tool = builtin(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
            registry.register(name, tool);
        }
        Ok(registry)
    }

    pub fn register(&mut self, name: &str, tool: Box<dyn Tool>) {
        self.tools.insert(name.to_string(), tool);
    }

    /// `(name, description)` pairs sorted by name.
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        self.tools
            .iter()
            .map(|(name, tool)| (name.as_str(), tool.description()))
            .collect()
    }

    pub fn requires_approval(&self, name: &str) -> Result<bool, ToolError> {
        self.get(name).map(|tool| tool.requires_approval())
    }

    pub fn cwd(&self) -> &Path {
        self.ctx.cwd()
    }

    /// Run a tool. The outer error is a lookup failure, the inner one a tool failure.
    #[instrument(skip(self, params))]
    pub fn execute(
        &mut self,
        name: &str,
        params: &Map<String, Value>,
    ) -> Result<Result<String>, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let result = tool.execute(&mut self.ctx, params);
        debug!(ok = result.is_ok(), "tool finished");
        Ok(result)
    }

    fn get(&self, name: &str) -> Result<&dyn Tool, ToolError> {
        self.tools
            .get(name)
            .map(|tool| tool.as_ref())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }
}

fn builtin(name: &str) -> Option<Box<dyn Tool>> {
    let tool: Box<dyn Tool> = match name {
        "ls" => Box::new(ListDirectory),
        "cd" => Box::new(ChangeDirectory),
        "read_file" => Box::new(ReadFile),
        "create_file" => Box::new(CreateFile),
        "create_folder" => Box::new(CreateFolder),
        _ => return None,
    };
    Some(tool)
}

fn str_param<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

struct ListDirectory;

impl Tool for ListDirectory {
    fn description(&self) -> &'static str {
        "List the contents of a directory. Params: {\"path\": optional directory, defaults to the current directory}"
    }

    fn execute(&self, ctx: &mut ToolContext, params: &Map<String, Value>) -> Result<String> {
        let dir = ctx.resolve(str_param(params, "path").unwrap_or("."));
        let entries =
            fs::read_dir(&dir).with_context(|| format!("list directory {}", dir.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() {
                name.push('/');
            }
            names.push(name);
        }
        if names.is_empty() {
            return Ok("(empty directory)".to_string());
        }
        names.sort();
        Ok(names.join("\n"))
    }
}

struct ChangeDirectory;

impl Tool for ChangeDirectory {
    fn description(&self) -> &'static str {
        "Change the current working directory. Params: {\"path\": directory to switch to}"
    }

    fn execute(&self, ctx: &mut ToolContext, params: &Map<String, Value>) -> Result<String> {
        let path = str_param(params, "path").ok_or(ToolError::MissingParam("path"))?;
        let target = ctx.resolve(path);
        if !target.is_dir() {
            bail!("{} is not a directory", target.display());
        }
        ctx.cwd = target;
        Ok(format!("Changed directory to {}", ctx.cwd.display()))
    }
}

struct ReadFile;

impl Tool for ReadFile {
    fn description(&self) -> &'static str {
        "Read the contents of a text file. Params: {\"path\" or \"file_path\": file to read}"
    }

    fn execute(&self, ctx: &mut ToolContext, params: &Map<String, Value>) -> Result<String> {
        let path = str_param(params, "path")
            .or_else(|| str_param(params, "file_path"))
            .ok_or(ToolError::MissingParam("path"))?;
        let file = ctx.resolve(path);
        fs::read_to_string(&file).with_context(|| format!("read file {}", file.display()))
    }
}

struct CreateFile;

impl Tool for CreateFile {
    fn description(&self) -> &'static str {
        "Create a file with the given content. Params: {\"file_path\": file to create, \"content\": text}"
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut ToolContext, params: &Map<String, Value>) -> Result<String> {
        let path = str_param(params, "file_path").ok_or(ToolError::MissingParam("file_path"))?;
        let content = params.get("content").and_then(Value::as_str).unwrap_or("");
        let file = ctx.resolve(path);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&file, content).with_context(|| format!("write file {}", file.display()))?;
        Ok(format!("Successfully created file: {path}"))
    }
}

struct CreateFolder;

impl Tool for CreateFolder {
    fn description(&self) -> &'static str {
        "Create a folder, including missing parents. Params: {\"path\": folder to create}"
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut ToolContext, params: &Map<String, Value>) -> Result<String> {
        let path = str_param(params, "path").ok_or(ToolError::MissingParam("path"))?;
        let dir = ctx.resolve(path);
        fs::create_dir_all(&dir).with_context(|| format!("create folder {}", dir.display()))?;
        Ok(format!("Successfully created folder: {path}"))
    }
}
