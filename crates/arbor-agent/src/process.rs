//! Subprocess-based agent runner
//!
//! Runs a configured agent program once per invocation, feeding the prompt
//! on stdin and capturing its full output. The run is bounded by the step
//! timeout; expiry kills the child and reports an ordinary failed result.

use crate::runner::{AgentRunner, SANDBOX_ENV_VAR};
use crate::types::RunResult;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

const MAX_ERROR_BYTES: usize = 4000;

/// Agent runner that spawns an external program per invocation
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    args: Vec<String>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

#[async_trait]
impl AgentRunner for ProcessRunner {
    #[instrument(skip(self, prompt), fields(program = %self.program))]
    async fn run(
        &self,
        prompt: &str,
        timeout: Duration,
        working_dir: &Path,
        sandbox: Option<&str>,
    ) -> RunResult {
        debug!("Spawning agent process ({} byte prompt)", prompt.len());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(handle) = sandbox {
            cmd.env(SANDBOX_ENV_VAR, handle);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return RunResult::failure(format!("Failed to spawn {}: {}", self.program, e))
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            // An agent that exits without reading stdin closes the pipe;
            // that is its prerogative, not a run failure
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                warn!("Failed to write prompt to agent stdin: {}", e);
            }
        }

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => {
                // Dropping the in-flight future kills the child (kill_on_drop)
                warn!("Agent timed out after {}s, killing", timeout.as_secs());
                RunResult::failure(format!("Agent timed out after {}s", timeout.as_secs()))
            }
            Ok(Err(e)) => RunResult::failure(format!("Failed to wait for agent: {}", e)),
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();

                if output.status.success() {
                    RunResult::ok(stdout)
                } else {
                    RunResult::failure_with_output(
                        stdout,
                        format!(
                            "Agent exited with {}: {}",
                            output.status,
                            truncate(stderr.trim(), MAX_ERROR_BYTES)
                        ),
                    )
                }
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &s[..end])
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prompt_flows_through_stdin() {
        let runner = ProcessRunner::new("cat");
        let result = runner
            .run(
                "implement the parser",
                Duration::from_secs(5),
                Path::new("."),
                None,
            )
            .await;

        assert!(result.success);
        assert_eq!(result.output, "implement the parser");
    }

    #[tokio::test]
    async fn test_timeout_is_a_failed_result_not_an_error() {
        let runner = ProcessRunner::new("sleep").with_args(vec!["10".to_string()]);
        let result = runner
            .run("prompt", Duration::from_millis(100), Path::new("."), None)
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure_with_output_retained() {
        let runner = ProcessRunner::new("sh").with_args(vec![
            "-c".to_string(),
            "echo partial work; echo broke >&2; exit 3".to_string(),
        ]);
        let result = runner
            .run("prompt", Duration::from_secs(5), Path::new("."), None)
            .await;

        assert!(!result.success);
        assert!(result.output.contains("partial work"));
        assert!(result.error.unwrap().contains("broke"));
    }

    #[tokio::test]
    async fn test_missing_program_is_failure() {
        let runner = ProcessRunner::new("definitely-not-a-real-agent-binary");
        let result = runner
            .run("prompt", Duration::from_secs(1), Path::new("."), None)
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Failed to spawn"));
    }

    #[tokio::test]
    async fn test_sandbox_handle_reaches_child_env() {
        let runner = ProcessRunner::new("sh").with_args(vec![
            "-c".to_string(),
            format!("printf %s \"${}\"", SANDBOX_ENV_VAR),
        ]);
        let result = runner
            .run(
                "prompt",
                Duration::from_secs(5),
                Path::new("."),
                Some("sbx-42"),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.output, "sbx-42");
    }
}
