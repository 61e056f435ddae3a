//! Shell command execution with a hard timeout.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tracing::{debug, info};

/// Human-readable failure information produced by a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    /// Short message, stored as the record's `error`.
    pub message: String,
    /// Longer form, stored as the record's `errorDetails`.
    pub details: String,
}

/// What happened to a command, consumed by ordinary branching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    TimedOut(Diagnostics),
    LaunchFailed(Diagnostics),
}

/// Trait for anything that can execute a job's command.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command`, killing it if it outlives `timeout`.
    async fn run(&self, command: &str, timeout: Duration) -> Outcome;
}

/// Runs commands through `<shell> -c`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

#[async_trait::async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Outcome {
        info!(%command, shell = %self.shell, ?timeout, "running command");

        let child = tokio::process::Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout kills the child.
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return Outcome::LaunchFailed(Diagnostics {
                    message: format!("failed to launch '{}': {}", self.shell, e),
                    details: format!("{e:?}"),
                })
            }
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let exit_code = exit_code_of(output.status);
                debug!(exit_code, "command exited");
                Outcome::Completed {
                    exit_code,
                    stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                }
            }
            Ok(Err(e)) => Outcome::LaunchFailed(Diagnostics {
                message: format!("failed to collect output of '{command}': {e}"),
                details: format!("{e:?}"),
            }),
            Err(_) => Outcome::TimedOut(Diagnostics {
                message: format!(
                    "Command '{}' timed out after {} seconds",
                    command,
                    timeout.as_secs_f64()
                ),
                details: format!("TimeoutExpired {{ cmd: {command:?}, timeout: {timeout:?} }}"),
            }),
        }
    }
}

/// Exit code of a finished child. Death by signal maps to `128 + signal`,
/// as shells report it.
fn exit_code_of(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completed_with_trimmed_output() {
        let runner = ShellRunner::default();
        let outcome = runner
            .run("echo hi; echo oops >&2", Duration::from_secs(10))
            .await;
        assert_eq!(
            outcome,
            Outcome::Completed {
                exit_code: 0,
                stdout: "hi".into(),
                stderr: "oops".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_code() {
        let runner = ShellRunner::default();
        match runner.run("exit 7", Duration::from_secs(10)).await {
            Outcome::Completed { exit_code, .. } => assert_eq!(exit_code, 7),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let runner = ShellRunner::default();
        let start = std::time::Instant::now();
        let outcome = runner.run("sleep 5", Duration::from_millis(300)).await;
        assert!(start.elapsed() < Duration::from_secs(4));
        match outcome {
            Outcome::TimedOut(diag) => assert!(diag.message.contains("timed out")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_shell_is_launch_failure() {
        let runner = ShellRunner::new("/nonexistent/shell");
        match runner.run("true", Duration::from_secs(1)).await {
            Outcome::LaunchFailed(diag) => assert!(diag.message.contains("/nonexistent/shell")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
