//! Timeout-bounded execution of a task's test commands

use crate::parse::{parse_counts, TestCounts};
use arbor_core::{TaskNode, TestCommand, TestKind, SANDBOX_ENV_VAR};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Hard fallback when neither the command nor the runner declares a timeout
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of one test command run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub kind: TestKind,
    pub command: String,
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock runtime of the command
    pub runtime: Duration,
    /// Timeout expiry is reported identically to a non-zero exit
    pub timed_out: bool,
    /// Best-effort parsed counts; absence is not an error
    pub counts: Option<TestCounts>,
}

/// Overall node outcome: the logical AND of all command results
pub fn overall_passed(results: &[TestResult]) -> bool {
    results.iter().all(|r| r.passed)
}

/// Runs a task's declared test commands through the shell
pub struct TestRunner {
    working_dir: PathBuf,
    default_timeout: Duration,
    sandbox: Option<String>,
}

impl TestRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            default_timeout: DEFAULT_TEST_TIMEOUT,
            sandbox: None,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_sandbox(mut self, sandbox: impl Into<String>) -> Self {
        self.sandbox = Some(sandbox.into());
        self
    }

    /// Run each declared test command, or the fallback when none is declared
    ///
    /// Every command runs regardless of earlier failures: a failing unit
    /// suite does not suppress the integration suite's output, and all
    /// outputs are retained for the failure log.
    #[instrument(skip(self, node), fields(task_id = %node.id))]
    pub async fn run_tests(
        &self,
        node: &TaskNode,
        fallback_command: Option<&str>,
    ) -> Vec<TestResult> {
        let commands: Vec<TestCommand> = if node.test_commands.is_empty() {
            match fallback_command {
                Some(command) => vec![TestCommand::new(TestKind::Unit, command)],
                None => {
                    debug!("No test commands declared and no fallback; nothing to run");
                    return Vec::new();
                }
            }
        } else {
            node.test_commands.clone()
        };

        let mut results = Vec::with_capacity(commands.len());
        for command in &commands {
            let timeout = command.timeout.unwrap_or(self.default_timeout);
            results.push(self.run_one(command, timeout).await);
        }
        results
    }

    async fn run_one(&self, test: &TestCommand, timeout: Duration) -> TestResult {
        debug!("Running {} test: {}", test.kind, test.command);

        let mut cmd = Command::new("sh");
        cmd.args(["-c", &test.command])
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(sandbox) = &self.sandbox {
            cmd.env(SANDBOX_ENV_VAR, sandbox);
        }

        let started = Instant::now();
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return TestResult {
                    kind: test.kind,
                    command: test.command.clone(),
                    passed: false,
                    stdout: String::new(),
                    stderr: format!("Failed to spawn test command: {}", e),
                    runtime: started.elapsed(),
                    timed_out: false,
                    counts: None,
                }
            }
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => {
                // Dropping the in-flight future kills the child (kill_on_drop)
                warn!(
                    "Test command timed out after {}s: {}",
                    timeout.as_secs(),
                    test.command
                );
                TestResult {
                    kind: test.kind,
                    command: test.command.clone(),
                    passed: false,
                    stdout: String::new(),
                    stderr: format!("Timed out after {}s", timeout.as_secs()),
                    runtime: started.elapsed(),
                    timed_out: true,
                    counts: None,
                }
            }
            Ok(Err(e)) => TestResult {
                kind: test.kind,
                command: test.command.clone(),
                passed: false,
                stdout: String::new(),
                stderr: format!("Failed to wait for test command: {}", e),
                runtime: started.elapsed(),
                timed_out: false,
                counts: None,
            },
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let framework = test.framework.as_deref();

                // Frameworks disagree about which stream the summary uses
                let counts = parse_counts(&stdout, framework)
                    .or_else(|| parse_counts(&stderr, framework));

                TestResult {
                    kind: test.kind,
                    command: test.command.clone(),
                    passed: output.status.success(),
                    stdout,
                    stderr,
                    runtime: started.elapsed(),
                    timed_out: false,
                    counts,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::TaskNode;

    fn node_with_commands(commands: Vec<TestCommand>) -> TaskNode {
        TaskNode::new("T001", "test node").with_test_commands(commands)
    }

    fn runner() -> TestRunner {
        TestRunner::new(".")
    }

    #[tokio::test]
    async fn test_passing_command() {
        let node = node_with_commands(vec![TestCommand::new(TestKind::Unit, "true")]);
        let results = runner().run_tests(&node, None).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].passed);
        assert!(overall_passed(&results));
    }

    #[tokio::test]
    async fn test_and_semantics_and_output_retention() {
        let node = node_with_commands(vec![
            TestCommand::new(TestKind::Unit, "echo unit ok"),
            TestCommand::new(TestKind::Integration, "echo integration broke >&2; exit 1"),
        ]);
        let results = runner().run_tests(&node, None).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].passed);
        assert!(!results[1].passed);
        // One failure fails the node, both outputs survive
        assert!(!overall_passed(&results));
        assert!(results[0].stdout.contains("unit ok"));
        assert!(results[1].stderr.contains("integration broke"));
    }

    #[tokio::test]
    async fn test_timeout_reported_like_nonzero_exit() {
        let node = node_with_commands(vec![
            TestCommand::new(TestKind::E2e, "sleep 10").with_timeout(Duration::from_millis(100)),
        ]);
        let results = runner().run_tests(&node, None).await;

        assert!(!results[0].passed);
        assert!(results[0].timed_out);
        assert!(!overall_passed(&results));
    }

    #[tokio::test]
    async fn test_fallback_command_used_when_none_declared() {
        let node = TaskNode::new("T001", "no declared tests");
        let results = runner().run_tests(&node, Some("echo fallback ran")).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, TestKind::Unit);
        assert!(results[0].stdout.contains("fallback ran"));
    }

    #[tokio::test]
    async fn test_no_commands_no_fallback_is_vacuously_passing() {
        let node = TaskNode::new("T001", "nothing to test");
        let results = runner().run_tests(&node, None).await;

        assert!(results.is_empty());
        assert!(overall_passed(&results));
    }

    #[tokio::test]
    async fn test_counts_parsed_when_output_matches() {
        let node = node_with_commands(vec![TestCommand::new(
            TestKind::Unit,
            "echo 'test result: ok. 4 passed; 0 failed; 1 ignored; finished in 0.01s'",
        )
        .with_framework("cargo")]);
        let results = runner().run_tests(&node, None).await;

        let counts = results[0].counts.unwrap();
        assert_eq!(counts.passed, 4);
        assert_eq!(counts.skipped, 1);
    }

    #[tokio::test]
    async fn test_unparseable_output_does_not_fail_a_passing_step() {
        let node = node_with_commands(vec![TestCommand::new(TestKind::Unit, "echo all fine")]);
        let results = runner().run_tests(&node, None).await;

        assert!(results[0].passed);
        assert!(results[0].counts.is_none());
    }

    #[tokio::test]
    async fn test_sandbox_handle_reaches_test_env() {
        let node = node_with_commands(vec![TestCommand::new(
            TestKind::Unit,
            format!("printf %s \"${}\"", SANDBOX_ENV_VAR),
        )]);
        let results = TestRunner::new(".")
            .with_sandbox("sbx-7")
            .run_tests(&node, None)
            .await;

        assert!(results[0].stdout.contains("sbx-7"));
    }
}
