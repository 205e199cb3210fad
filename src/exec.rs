//! Command execution for hardware/software check probes.
use std::process::{Child, Command, Output, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;
use wait_timeout::ChildExt as _;

/// Result of a command execution.
#[derive(Debug)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, if the process was not killed by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Failure to run a check command to completion.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The program could not be started.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that could not be started.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Waiting for the process failed.
    #[error("failed waiting for {program}: {source}")]
    Wait {
        /// Program being waited on.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The process outlived its deadline and was killed.
    #[error("{program} killed after {}ms", .elapsed.as_millis())]
    TimedOut {
        /// Program that was killed.
        program: String,
        /// Time the process was allowed to run.
        elapsed: Duration,
    },
}

/// Build the shell invocation for a check expression.
///
/// Checks are written for PowerShell on Windows; elsewhere they run under
/// `sh -c` so templates can be exercised on development machines.
#[must_use]
pub fn shell_command(script: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("powershell");
        cmd.args(["-NoProfile", "-NonInteractive", "-Command", script]);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }
}

/// Run a check script, allowing failure (returns the result without bailing).
///
/// When `deadline` is set the process is killed once it passes.
///
/// # Errors
///
/// Returns an error if the shell cannot be started, waiting fails, or the
/// deadline is reached.
pub fn run_script(script: &str, deadline: Option<Instant>) -> Result<ExecResult, ExecError> {
    let cmd = shell_command(script);
    run_until(cmd, deadline)
}

/// Run `cmd` to completion or until `deadline`, capturing its output.
///
/// Output pipes are drained on helper threads so a chatty process cannot
/// block on a full pipe while we wait for it.
///
/// # Errors
///
/// See [`run_script`].
pub fn run_until(mut cmd: Command, deadline: Option<Instant>) -> Result<ExecResult, ExecError> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let started = Instant::now();

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        cmd.process_group(0);
    }

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match deadline {
        Some(deadline) => {
            let budget = deadline.saturating_duration_since(Instant::now());
            let waited = child
                .wait_timeout(budget)
                .map_err(|source| ExecError::Wait {
                    program: program.clone(),
                    source,
                })?;
            if let Some(status) = waited {
                status
            } else {
                kill(&mut child);
                return Err(ExecError::TimedOut {
                    program,
                    elapsed: started.elapsed(),
                });
            }
        }
        None => child.wait().map_err(|source| ExecError::Wait {
            program: program.clone(),
            source,
        })?,
    };

    Ok(ExecResult {
        stdout: join(stdout),
        stderr: join(stderr),
        success: status.success(),
        code: status.code(),
    })
}

fn drain<R: std::io::Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).ok();
            String::from_utf8_lossy(&buf).to_string()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Kill `child` and its descendants.
///
/// On Unix the child leads its own process group and the whole group is
/// signalled; on Windows `taskkill /T` walks the process tree.
fn kill(child: &mut Child) {
    tree_kill_command(child.id())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .ok();
    child.kill().ok();
    child.wait().ok();
}

fn tree_kill_command(pid: u32) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("taskkill");
        cmd.args(["/T", "/F", "/PID", &pid.to_string()]);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("kill");
        cmd.args(["-KILL", "--", &format!("-{pid}")]);
        cmd
    }
}
