//! Run artefacts written with `run --log-dir`.
//!
//! Layout:
//! - `outcome.json`: status, final result, activities, completed tasks, duration;
//!   or the error that stopped the run.
//! - `transcripts/<agent>.json`: full message history of each agent.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::io::backend::Message;
use crate::workflow::WorkflowOutcome;

#[derive(Debug, Clone)]
pub struct RunLogPaths {
    pub dir: PathBuf,
    pub outcome_path: PathBuf,
    pub transcripts_dir: PathBuf,
}

impl RunLogPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            outcome_path: dir.join("outcome.json"),
            transcripts_dir: dir.join("transcripts"),
        }
    }

    pub fn transcript_path(&self, agent: &str) -> PathBuf {
        self.transcripts_dir.join(format!("{}.json", file_stem(agent)))
    }
}

/// One agent's conversation as recorded at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript<'a> {
    pub agent: &'a str,
    pub model: &'a str,
    pub messages: &'a [Message],
}

/// How the logged run ended.
#[derive(Debug, Clone, Copy)]
pub enum RunResult<'a> {
    Finished(&'a WorkflowOutcome),
    /// The workflow returned an error before producing an outcome.
    Failed(&'a str),
}

#[derive(Serialize)]
struct OutcomeRecord<'a> {
    entry_agent: &'a str,
    duration_ms: u64,
    #[serde(flatten)]
    outcome: Option<&'a WorkflowOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

pub struct RunLogRequest<'a> {
    pub dir: &'a Path,
    pub entry_agent: &'a str,
    pub duration_ms: u64,
    pub result: RunResult<'a>,
    pub transcripts: &'a [Transcript<'a>],
}

pub fn write_run_log(request: &RunLogRequest<'_>) -> Result<RunLogPaths> {
    let paths = RunLogPaths::new(request.dir);
    fs::create_dir_all(&paths.transcripts_dir)
        .with_context(|| format!("create run log dir {}", paths.transcripts_dir.display()))?;

    let (outcome, error) = match request.result {
        RunResult::Finished(outcome) => (Some(outcome), None),
        RunResult::Failed(error) => (None, Some(error)),
    };
    write_json(
        &paths.outcome_path,
        &OutcomeRecord {
            entry_agent: request.entry_agent,
            duration_ms: request.duration_ms,
            outcome,
            error,
        },
    )?;
    for transcript in request.transcripts {
        write_json(&paths.transcript_path(transcript.agent), transcript)?;
    }
    Ok(paths)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize run log")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

fn file_stem(agent: &str) -> String {
    agent
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::Task;
    use crate::io::backend::Role;
    use crate::workflow::WorkflowStatus;

    #[test]
    fn paths_are_stable() {
        let paths = RunLogPaths::new(Path::new("logs"));
        assert_eq!(paths.outcome_path, Path::new("logs/outcome.json"));
        assert_eq!(
            paths.transcript_path("text analyzer/v2"),
            Path::new("logs/transcripts/text_analyzer_v2.json")
        );
    }

    #[test]
    fn writes_outcome_and_transcripts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut done = Task::completion("Report", "Final report", "all good").expect("task");
        done.assign_owner("planner").expect("owner");
        let outcome = WorkflowOutcome {
            status: WorkflowStatus::Completed,
            final_result: Some("all good".to_string()),
            completed: vec![done],
            activities: vec!["Reporting".to_string()],
        };
        let messages = vec![Message::new(Role::User, "go", "planner")];
        let transcripts = [Transcript {
            agent: "planner",
            model: "tiny",
            messages: &messages,
        }];

        let paths = write_run_log(&RunLogRequest {
            dir: temp.path(),
            entry_agent: "planner",
            duration_ms: 12,
            result: RunResult::Finished(&outcome),
            transcripts: &transcripts,
        })
        .expect("write run log");

        let raw = fs::read_to_string(&paths.outcome_path).expect("read outcome");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["status"]["state"], "completed");
        assert_eq!(value["final_result"], "all good");
        assert_eq!(value["completed"][0]["owner_agent"], "planner");
        assert_eq!(value["duration_ms"], 12);
        assert!(value.get("error").is_none());
        assert!(paths.transcript_path("planner").is_file());
    }

    #[test]
    fn failed_run_records_error_and_transcripts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let messages = vec![Message::new(Role::User, "go", "planner")];
        let transcripts = [Transcript {
            agent: "planner",
            model: "tiny",
            messages: &messages,
        }];

        let paths = write_run_log(&RunLogRequest {
            dir: temp.path(),
            entry_agent: "planner",
            duration_ms: 3,
            result: RunResult::Failed("backend failed for agent `planner`: boom"),
            transcripts: &transcripts,
        })
        .expect("write run log");

        let raw = fs::read_to_string(&paths.outcome_path).expect("read outcome");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["error"], "backend failed for agent `planner`: boom");
        assert!(value.get("status").is_none());
        let transcript = fs::read_to_string(paths.transcript_path("planner")).expect("transcript");
        assert!(transcript.contains("\"go\""));
    }
}
