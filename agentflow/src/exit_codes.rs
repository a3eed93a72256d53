//! Stable exit codes for agentflow CLI commands.

/// Command succeeded; for `run`, a completion task was reached.
pub const OK: i32 = 0;
/// Invalid config, arguments or response file, or a backend failure.
pub const INVALID: i32 = 1;
/// `agentflow run` gave up on an unparseable model response.
pub const PARSE_FAILED: i32 = 2;
/// `agentflow run` drained its task queue without a completion task.
pub const NO_RESULT: i32 = 3;
