//! Command-line entry point for agentflow.
//!
//! Loads `.agentflow/config.toml`, builds the configured agents and runs a
//! workflow on the entry agent, printing progress as it goes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use agentflow::agents::AgentSet;
use agentflow::core::parser::{ResponseParser, response_schema};
use agentflow::core::task::TaskKind;
use agentflow::exit_codes;
use agentflow::io::backend::CommandBackend;
use agentflow::io::config::{AppConfig, DEFAULT_CONFIG_PATH, load_config, write_config};
use agentflow::io::run_log::{RunLogRequest, RunResult, Transcript, write_run_log};
use agentflow::io::tools::{Approver, AutoApprove, StdinApprover};
use agentflow::logging::{self, Verbosity};
use agentflow::workflow::{Workflow, WorkflowConfig, WorkflowOutcome, WorkflowStatus};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "agentflow",
    version,
    about = "Run planning agents that break work into tool, delegation and completion tasks"
)]
struct Cli {
    /// Config file to use.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run a workflow on the entry agent (or `--agent`).
    Run(RunArgs),
    /// Parse a saved model response and print the tasks it contains.
    Check {
        /// File holding the raw model response.
        file: PathBuf,
    },
    /// Print the JSON schema model responses must follow.
    Schema,
}

#[derive(Args)]
struct RunArgs {
    /// Prompt for the agent.
    #[arg(required_unless_present = "path", conflicts_with = "path")]
    prompt: Option<String>,

    /// Analyze the contents of this directory.
    #[arg(long)]
    path: Option<String>,

    /// Agent to start with instead of the configured entry agent.
    #[arg(long)]
    agent: Option<String>,

    /// Approve every tool that asks for approval.
    #[arg(short, long)]
    yes: bool,

    /// Write outcome and transcripts to this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Show workflow milestones and state changes.
    #[arg(short, long)]
    verbose: bool,

    /// Show per-call detail, including the messages sent to the model.
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run(args) => cmd_run(&cli.config, args),
        Command::Check { file } => cmd_check(&file),
        Command::Schema => {
            println!("{}", response_schema().trim_end());
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        println!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &AppConfig::default())
        .with_context(|| format!("write {}", config_path.display()))?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(config_path: &Path, args: RunArgs) -> Result<i32> {
    let verbosity = Verbosity::from_flags(args.verbose, args.debug);
    logging::init(verbosity);

    let cfg = load_config(config_path)?;
    let prompt = match (args.prompt, args.path) {
        (Some(prompt), _) => prompt,
        (None, Some(path)) => format!("Analyze the contents of {path}"),
        (None, None) => bail!("provide a PROMPT or --path"),
    };

    let cwd = std::env::current_dir().context("resolve working directory")?;
    let mut agents = AgentSet::from_definitions(&cfg.agents, &cwd)?;
    let agent_name = args.agent.unwrap_or_else(|| cfg.entry_agent.clone());
    let entry = agents
        .id(&agent_name)
        .ok_or_else(|| anyhow!("unknown agent '{agent_name}'"))?;

    let backend = CommandBackend::new(&cfg.backend);
    let approver: Box<dyn Approver> = if args.yes {
        Box::new(AutoApprove)
    } else {
        Box::new(StdinApprover)
    };
    let show_states = verbosity != Verbosity::Quiet;

    let started = Instant::now();
    let result = Workflow::new(
        &backend,
        &*approver,
        WorkflowConfig::from(&cfg.workflow),
    )
    .with_observer(|event| {
        if show_states || !event.is_state_change() {
            println!("{event}");
        }
    })
    .run(&mut agents, entry, &prompt);
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if let Some(dir) = &args.log_dir {
        let transcripts: Vec<Transcript<'_>> = agents
            .iter()
            .filter(|agent| !agent.messages().is_empty())
            .map(|agent| Transcript {
                agent: agent.name(),
                model: agent.model(),
                messages: agent.messages(),
            })
            .collect();
        let error;
        let logged = match &result {
            Ok(outcome) => RunResult::Finished(outcome),
            Err(err) => {
                error = err.to_string();
                RunResult::Failed(&error)
            }
        };
        let paths = write_run_log(&RunLogRequest {
            dir,
            entry_agent: &agent_name,
            duration_ms,
            result: logged,
            transcripts: &transcripts,
        })?;
        println!("run log written to {}", paths.dir.display());
    }

    // Logged first so a failed run keeps its transcripts.
    let outcome = result?;
    Ok(report(&outcome))
}

fn report(outcome: &WorkflowOutcome) -> i32 {
    match &outcome.status {
        WorkflowStatus::Completed => {
            println!();
            println!("Final result:");
            println!("{}", outcome.final_result.as_deref().unwrap_or_default());
            exit_codes::OK
        }
        WorkflowStatus::Drained => {
            eprintln!(
                "workflow finished after {} task(s) without a result",
                outcome.completed.len()
            );
            exit_codes::NO_RESULT
        }
        WorkflowStatus::ParseFailed {
            attempts, error, ..
        } => {
            eprintln!("workflow stopped: no parseable response after {attempts} attempt(s): {error}");
            exit_codes::PARSE_FAILED
        }
    }
}

fn cmd_check(file: &Path) -> Result<i32> {
    let raw = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let breakdown = match ResponseParser::new().parse(&raw) {
        Ok(breakdown) => breakdown,
        Err(err) => {
            eprintln!("invalid response: {err}");
            return Ok(exit_codes::INVALID);
        }
    };

    println!("Activity: {}", breakdown.activity());
    for (index, task) in breakdown.tasks().iter().enumerate() {
        println!(
            "{}. [{}] {}: {}",
            index + 1,
            task.task_type(),
            task.title(),
            task.description()
        );
        match task.kind() {
            TaskKind::Tool {
                tool_name,
                tool_params,
            } => println!(
                "   tool: {tool_name} {}",
                serde_json::Value::Object(tool_params.clone())
            ),
            TaskKind::Agent {
                agent_name,
                instructions,
            } => println!("   agent: {agent_name}: {instructions}"),
            TaskKind::Completion { result } => println!("   result: {result}"),
        }
    }
    Ok(exit_codes::OK)
}
