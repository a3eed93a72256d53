//! Side-effecting collaborators: config, model backend, tools, prompts and run logs.

pub mod backend;
pub mod config;
pub mod process;
pub mod prompt;
pub mod run_log;
pub mod tools;
