//! Helpers for running child processes with timeouts and bounded output.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Stdin is written and stdout/stderr are read on their own threads while the
/// timeout runs, so a child that never reads its input is still killed on
/// time. `output_limit_bytes` bounds the amount of stdout/stderr stored in
/// memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let (stdout, stderr, child_stdin) = match take_pipes(&mut child, stdin.is_some()) {
        Ok(pipes) => pipes,
        Err(e) => {
            reap(&mut child);
            return Err(e);
        }
    };

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));
    let stdin_handle = child_stdin.zip(stdin).map(|(pipe, input)| {
        let input = input.to_vec();
        thread::spawn(move || write_stdin(pipe, &input))
    });

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
        Err(e) => {
            reap(&mut child);
            return Err(e).context("wait for command");
        }
    };

    let (stdout, stdout_truncated) = join_thread(stdout_handle, "stdout").context("join stdout")?;
    let (stderr, stderr_truncated) = join_thread(stderr_handle, "stderr").context("join stderr")?;
    if let Some(handle) = stdin_handle {
        let written = join_thread(handle, "stdin");
        // A killed child leaves the writer with a closed pipe.
        if let Err(e) = written
            && !timed_out
        {
            return Err(e);
        }
    }

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

type Pipes = (ChildStdout, ChildStderr, Option<ChildStdin>);

fn take_pipes(child: &mut Child, with_stdin: bool) -> Result<Pipes> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdin = if with_stdin {
        Some(
            child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?,
        )
    } else {
        None
    };
    Ok((stdout, stderr, stdin))
}

/// Kill and wait for a child we are abandoning, so it does not outlive the call.
fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(err = %e, "kill failed");
    }
    if let Err(e) = child.wait() {
        debug!(err = %e, "wait after kill failed");
    }
}

fn write_stdin(mut pipe: ChildStdin, input: &[u8]) -> Result<()> {
    // A child that exits without reading its input closes the pipe early.
    match pipe.write_all(input) {
        Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e).context("write stdin"),
        _ => Ok(()),
    }
}

fn join_thread<T>(handle: thread::JoinHandle<Result<T>>, stream: &str) -> Result<T> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{stream} thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn output_beyond_limit_is_counted_as_truncated() {
        let mut cmd = Command::new("printf");
        cmd.arg("0123456789");
        let output = run_command_with_timeout(cmd, None, Duration::from_secs(5), 4).expect("run");
        assert_eq!(output.stdout, b"0123");
        assert_eq!(output.stdout_truncated, 6);
        assert!(output.status.success());
    }

    #[test]
    fn slow_command_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let output =
            run_command_with_timeout(cmd, None, Duration::from_millis(100), 1024).expect("run");
        assert!(output.timed_out);
    }

    #[test]
    fn stdin_is_delivered_to_the_child() {
        let cmd = Command::new("cat");
        let input = b"hello agent".as_slice();
        let output =
            run_command_with_timeout(cmd, Some(input), Duration::from_secs(5), 1024).expect("run");
        assert_eq!(output.stdout, b"hello agent");
        assert!(!output.timed_out);
    }

    #[test]
    fn unread_stdin_larger_than_pipe_still_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let input = vec![b'x'; 4 * 1024 * 1024];
        let output = run_command_with_timeout(
            cmd,
            Some(input.as_slice()),
            Duration::from_millis(200),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
    }
}
