//! Orchestration of planning agents driven by a language model.
//!
//! An agent asks the model for a JSON task breakdown, runs the tasks in
//! order (tools, delegations to subordinate agents, completion) and feeds
//! every result back into its conversation to plan the next step. The
//! architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (task model, queue, response
//!   parsing, prompt notes, delegation budget). No I/O.
//! - **[`io`]**: Side-effecting collaborators (config, model backend process,
//!   tools, prompt templates, run logs). Isolated behind traits so tests can
//!   script them.
//!
//! [`agents`] holds the configured agents, and [`workflow`] runs the
//! recursive state machine over them, reporting progress as [`events`].

pub mod agents;
pub mod core;
pub mod events;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
