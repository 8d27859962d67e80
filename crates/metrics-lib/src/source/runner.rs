//! External command execution
//!
//! The kubectl source talks to the outside world only through
//! [`CommandRunner`], so its parsing and fallback rules can be tested with a
//! scripted runner instead of a real binary.

use crate::error::CommandError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured result of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit status was zero
    pub success: bool,
    /// Exit code, `None` if killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program and captures its output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, giving up after `timeout`
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as tokio child processes
///
/// A child still running when the timeout expires is killed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(source)) => Err(CommandError::Io {
                program: program.to_string(),
                source,
            }),
            Err(_) => Err(CommandError::Timeout {
                program: program.to_string(),
                timeout,
            }),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_process_runner_captures_stdout() {
        let output = ProcessRunner
            .run("sh", &["-c", "echo node-a 250m 6%"], Duration::from_secs(5))
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.code, Some(0));
        assert_eq!(output.stdout.trim(), "node-a 250m 6%");
    }

    #[tokio::test]
    async fn test_process_runner_reports_exit_code() {
        let output = ProcessRunner
            .run("sh", &["-c", "echo boom >&2; exit 3"], Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stderr.trim(), "boom");
    }

    #[tokio::test]
    async fn test_process_runner_missing_program() {
        let result = ProcessRunner
            .run("definitely-not-a-real-kubectl", &[], Duration::from_secs(5))
            .await;

        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_process_runner_timeout() {
        let started = std::time::Instant::now();
        let result = ProcessRunner
            .run("sleep", &["10"], Duration::from_millis(100))
            .await;

        assert!(matches!(result, Err(CommandError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
