//! The single-task executor
//!
//! Runs one ready task through implement → test → review with bounded
//! retries, committing every transition. The executor holds no state a
//! crash could lose: the ready set, the resume point, and retry feedback
//! are all reconstructed from commit history at the start of every
//! invocation, so a process killed mid-attempt resumes at exactly the step
//! after its last durable commit.

use crate::approval::{ApprovalPolicy, MarkerApproval};
use crate::artifacts::{write_phase_log, write_report, write_test_log};
use crate::prompt::{build_implement_prompt, build_review_prompt};
use arbor_agent::AgentRunner;
use arbor_core::{GardenResult, Result, TaskNode, TaskReport, TaskState, TaskTree};
use arbor_git::{
    format_commit_message, keys, task_state_from_trailers, FeedbackCollector, GitExecutor,
    GitRepo, ReviewVerdict, StateScanner, Step, StepOutcome, Trailers,
};
use arbor_validation::{overall_passed, TestResult, TestRunner, DEFAULT_TEST_TIMEOUT};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_IMPLEMENT_TIMEOUT: Duration = Duration::from_secs(1800);
const DEFAULT_REVIEW_TIMEOUT: Duration = Duration::from_secs(600);

/// Configuration for the single-task executor
#[derive(Debug, Clone)]
pub struct GardenConfig {
    /// Command run when a task declares no test commands
    pub fallback_test_command: Option<String>,
    /// Attempt budget per task (attempt = one implement→test→review pass)
    pub max_retries: usize,
    pub report_dir: PathBuf,
    pub log_dir: PathBuf,
    pub implement_timeout: Duration,
    pub review_timeout: Duration,
    /// Default per-test-command timeout
    pub test_timeout: Duration,
    /// Opaque sandbox handle, forwarded verbatim to runners and tests
    pub sandbox: Option<String>,
}

impl GardenConfig {
    pub fn new(report_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            fallback_test_command: None,
            max_retries: DEFAULT_MAX_RETRIES,
            report_dir: report_dir.into(),
            log_dir: log_dir.into(),
            implement_timeout: DEFAULT_IMPLEMENT_TIMEOUT,
            review_timeout: DEFAULT_REVIEW_TIMEOUT,
            test_timeout: DEFAULT_TEST_TIMEOUT,
            sandbox: None,
        }
    }

    pub fn with_fallback_test_command(mut self, command: impl Into<String>) -> Self {
        self.fallback_test_command = Some(command.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_implement_timeout(mut self, timeout: Duration) -> Self {
        self.implement_timeout = timeout;
        self
    }

    pub fn with_review_timeout(mut self, timeout: Duration) -> Self {
        self.review_timeout = timeout;
        self
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    pub fn with_sandbox(mut self, sandbox: impl Into<String>) -> Self {
        self.sandbox = Some(sandbox.into());
        self
    }
}

/// Where the state machine enters or continues for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Implement,
    Test,
    Review,
    Complete,
}

/// Single-task executor: tends exactly one ready task per invocation
pub struct Garden<E: GitExecutor + Clone> {
    repo: GitRepo<E>,
    scanner: StateScanner<E>,
    feedback: FeedbackCollector<E>,
    implementer: Arc<dyn AgentRunner>,
    reviewer: Arc<dyn AgentRunner>,
    approval: Box<dyn ApprovalPolicy>,
    working_dir: PathBuf,
    config: GardenConfig,
}

impl<E: GitExecutor + Clone> Garden<E> {
    /// Create an executor over a repository and two runner handles
    ///
    /// The implement and review handles may be the same concrete value.
    pub fn new(
        executor: E,
        working_dir: impl Into<PathBuf>,
        implementer: Arc<dyn AgentRunner>,
        reviewer: Arc<dyn AgentRunner>,
        config: GardenConfig,
    ) -> Self {
        Self {
            repo: GitRepo::new(executor.clone()),
            scanner: StateScanner::new(executor.clone()),
            feedback: FeedbackCollector::new(executor),
            implementer,
            reviewer,
            approval: Box::new(MarkerApproval::default()),
            working_dir: working_dir.into(),
            config,
        }
    }

    /// Override how review approval is detected
    pub fn with_approval_policy(mut self, policy: Box<dyn ApprovalPolicy>) -> Self {
        self.approval = policy;
        self
    }

    /// Select and execute the next ready task
    ///
    /// Returns the no-ready-task result, without committing anything, when
    /// every leaf is either complete or blocked; that is a normal outcome,
    /// not an error. Only environment failures (VCS, I/O) return `Err`.
    #[instrument(skip(self, tree))]
    pub async fn run(&self, tree: &TaskTree) -> Result<GardenResult> {
        let ref_name = self.repo.current_ref().await?;
        let run_start = self.repo.head().await?;

        let completed = self.scanner.scan_completed_tasks(tree, &ref_name).await?;
        let Some(task) = select_ready(tree, &completed) else {
            debug!("No ready task on {}", ref_name);
            return Ok(GardenResult::no_ready_task());
        };

        info!("Tending {} ({})", task.id, task.name);

        // History decides where this task left off
        let trailers = self.scanner.get_task_trailers(&ref_name, &task.id).await?;
        let state = task_state_from_trailers(&trailers);
        let last_attempt = parse_retry(&trailers);

        let (mut phase, mut attempt) = match state {
            TaskState::Pending => (Phase::Implement, 0),
            TaskState::Implementing => (Phase::Implement, last_attempt + 1),
            TaskState::Testing => (Phase::Test, last_attempt),
            TaskState::Reviewing => {
                if is_approved_awaiting_complete(&trailers) {
                    (Phase::Complete, last_attempt)
                } else {
                    (Phase::Review, last_attempt)
                }
            }
            TaskState::Complete => {
                // Scanner said incomplete but trailers say complete: another
                // writer got here first; report it done without committing
                return Ok(GardenResult::completed(&task.id));
            }
            TaskState::Failed => {
                // Terminal states are set exactly once and never revised
                return Ok(GardenResult::failed(
                    &task.id,
                    format!("task {} already failed", task.id),
                ));
            }
        };

        debug!(
            "Resuming {} at {:?} (attempt {})",
            task.id, phase, attempt
        );

        loop {
            if phase == Phase::Implement && attempt >= self.config.max_retries {
                return self.exhaust(task, &ref_name).await;
            }

            match phase {
                Phase::Implement => {
                    if self.implement_step(task, &ref_name, attempt).await? {
                        phase = Phase::Test;
                    } else {
                        attempt += 1;
                    }
                }
                Phase::Test => {
                    if self.test_step(task, &ref_name, attempt).await? {
                        phase = Phase::Review;
                    } else {
                        attempt += 1;
                        phase = Phase::Implement;
                    }
                }
                Phase::Review => {
                    if self
                        .review_step(task, &ref_name, &run_start, attempt)
                        .await?
                    {
                        phase = Phase::Complete;
                    } else {
                        attempt += 1;
                        phase = Phase::Implement;
                    }
                }
                Phase::Complete => {
                    return self.complete_pass(task, &ref_name, attempt).await;
                }
            }
        }
    }

    /// One implement call: prompt, agent run, transcript log, durable commit
    async fn implement_step(&self, task: &TaskNode, ref_name: &str, attempt: usize) -> Result<bool> {
        let feedback = if attempt > 0 {
            self.feedback.collect_feedback(&task.id, ref_name).await?
        } else {
            String::new()
        };

        let prompt = build_implement_prompt(task, attempt, self.config.max_retries, &feedback);
        let result = self
            .implementer
            .run(
                &prompt,
                self.config.implement_timeout,
                &self.working_dir,
                self.config.sandbox.as_deref(),
            )
            .await;

        let mut sections = vec![("PROMPT", prompt.as_str()), ("OUTPUT", result.output.as_str())];
        if let Some(error) = result.error.as_deref() {
            sections.push(("ERROR", error));
        }
        write_phase_log(&self.config.log_dir, &task.id, "implement", &sections)?;

        let outcome = if result.success {
            StepOutcome::Pass
        } else {
            StepOutcome::Fail
        };
        let body = if result.success {
            None
        } else {
            Some(
                result
                    .error
                    .clone()
                    .unwrap_or_else(|| "agent call failed".to_string()),
            )
        };

        let message = format_commit_message(
            ref_name,
            &task.id,
            Step::Implement,
            &format!("attempt {} {}", attempt, outcome),
            body.as_deref(),
            &[
                (keys::STEP, Step::Implement.to_string()),
                (keys::RESULT, outcome.to_string()),
                (keys::RETRY, attempt.to_string()),
            ],
        );
        self.repo.commit_all(&message).await?;

        if !result.success {
            warn!("Implement attempt {} failed for {}", attempt, task.id);
        }
        Ok(result.success)
    }

    /// One test pass: run every declared command, commit the AND outcome
    async fn test_step(&self, task: &TaskNode, ref_name: &str, attempt: usize) -> Result<bool> {
        let mut runner =
            TestRunner::new(&self.working_dir).with_default_timeout(self.config.test_timeout);
        if let Some(sandbox) = &self.config.sandbox {
            runner = runner.with_sandbox(sandbox);
        }

        let results = runner
            .run_tests(task, self.config.fallback_test_command.as_deref())
            .await;
        let passed = overall_passed(&results);
        let outcome = if passed {
            StepOutcome::Pass
        } else {
            StepOutcome::Fail
        };

        let mut trailers = vec![
            (keys::STEP, Step::Test.to_string()),
            (keys::TEST, outcome.to_string()),
            (keys::RETRY, attempt.to_string()),
        ];

        // Trailer stats come from the primary (first declared) result
        if let Some(primary) = results.first() {
            trailers.push((keys::TEST_TYPE, primary.kind.to_string()));
            trailers.push((
                keys::TEST_RUNTIME,
                format!("{:.2}s", primary.runtime.as_secs_f64()),
            ));
            if let Some(counts) = primary.counts {
                trailers.push((keys::TEST_PASSED, counts.passed.to_string()));
                trailers.push((keys::TEST_FAILED, counts.failed.to_string()));
                trailers.push((keys::TEST_SKIPPED, counts.skipped.to_string()));
            }
        }

        let body = if passed {
            None
        } else {
            Some(failure_summary(&results))
        };

        if !passed {
            let log_path = write_test_log(&self.config.log_dir, &task.id, &results)?;
            trailers.push((keys::TEST_LOG, log_path.display().to_string()));
            warn!("Tests failed for {} (attempt {})", task.id, attempt);
        }

        let message = format_commit_message(
            ref_name,
            &task.id,
            Step::Test,
            &format!("attempt {} {}", attempt, outcome),
            body.as_deref(),
            &trailers,
        );
        self.repo.commit_all(&message).await?;
        Ok(passed)
    }

    /// One review pass: diff since run start, reviewer verdict, commit
    async fn review_step(
        &self,
        task: &TaskNode,
        ref_name: &str,
        run_start: &str,
        attempt: usize,
    ) -> Result<bool> {
        let head = self.repo.head().await?;
        let diff = self.repo.diff_stat(run_start, &head).await?;

        let prompt = build_review_prompt(task, &diff, &self.approval.instruction());
        let result = self
            .reviewer
            .run(
                &prompt,
                self.config.review_timeout,
                &self.working_dir,
                self.config.sandbox.as_deref(),
            )
            .await;

        // A failed reviewer call cannot approve anything
        let approved = result.success && self.approval.is_approved(&result.output);
        let verdict = if approved {
            ReviewVerdict::Approved
        } else {
            ReviewVerdict::Rejected
        };

        let mut sections = vec![("PROMPT", prompt.as_str()), ("OUTPUT", result.output.as_str())];
        if let Some(error) = result.error.as_deref() {
            sections.push(("ERROR", error));
        }
        let log_path = write_phase_log(&self.config.log_dir, &task.id, "review", &sections)?;

        // The rejection body is what the next attempt's feedback quotes
        let body = if approved {
            None
        } else if result.output.is_empty() {
            Some(
                result
                    .error
                    .clone()
                    .unwrap_or_else(|| "review call failed".to_string()),
            )
        } else {
            Some(result.output.clone())
        };

        let message = format_commit_message(
            ref_name,
            &task.id,
            Step::Review,
            &format!("attempt {} {}", attempt, verdict),
            body.as_deref(),
            &[
                (keys::STEP, Step::Review.to_string()),
                (keys::REVIEW, verdict.to_string()),
                (keys::RETRY, attempt.to_string()),
                (keys::REVIEW_LOG, log_path.display().to_string()),
            ],
        );
        self.repo.commit_all(&message).await?;

        if !approved {
            warn!("Review rejected {} (attempt {})", task.id, attempt);
        }
        Ok(approved)
    }

    /// Terminal success: report file plus the complete/pass commit
    async fn complete_pass(
        &self,
        task: &TaskNode,
        ref_name: &str,
        attempt: usize,
    ) -> Result<GardenResult> {
        let report = TaskReport {
            task_id: task.id.clone(),
            result: "pass".to_string(),
            retries: attempt,
        };
        let report_path = write_report(&self.config.report_dir, &report)?;

        let message = format_commit_message(
            ref_name,
            &task.id,
            Step::Complete,
            "pass",
            None,
            &[
                (keys::STEP, Step::Complete.to_string()),
                (keys::RESULT, StepOutcome::Pass.to_string()),
                (keys::REPORT, report_path.display().to_string()),
            ],
        );
        self.repo.commit_all(&message).await?;

        info!("Task {} complete (attempt {})", task.id, attempt);
        Ok(GardenResult::completed(&task.id))
    }

    /// Terminal failure: the attempt budget is spent
    async fn exhaust(&self, task: &TaskNode, ref_name: &str) -> Result<GardenResult> {
        let max_retries = self.config.max_retries;
        let report = TaskReport {
            task_id: task.id.clone(),
            result: "fail".to_string(),
            retries: max_retries,
        };
        let report_path = write_report(&self.config.report_dir, &report)?;

        let error = format!("failed after {} retries", max_retries);
        let message = format_commit_message(
            ref_name,
            &task.id,
            Step::Complete,
            &error,
            None,
            &[
                (keys::STEP, Step::Complete.to_string()),
                (keys::RESULT, StepOutcome::Fail.to_string()),
                (keys::REPORT, report_path.display().to_string()),
            ],
        );
        self.repo.commit_all(&message).await?;

        warn!("Task {} {}", task.id, error);
        Ok(GardenResult::failed(&task.id, error))
    }
}

/// First id in execution order that is incomplete with all deps complete
fn select_ready<'a>(tree: &'a TaskTree, completed: &HashSet<String>) -> Option<&'a TaskNode> {
    tree.execution_order()
        .iter()
        .filter(|id| !completed.contains(*id))
        .find(|id| {
            tree.leaf_dependencies(id.as_str())
                .iter()
                .all(|dep| completed.contains(dep))
        })
        .and_then(|id| tree.get(id))
}

fn parse_retry(trailers: &Trailers) -> usize {
    trailers
        .get(keys::RETRY)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Approved review whose complete commit is still owed
fn is_approved_awaiting_complete(trailers: &Trailers) -> bool {
    let step = trailers
        .get(keys::STEP)
        .and_then(|s| s.parse::<Step>().ok());
    let verdict = trailers
        .get(keys::REVIEW)
        .and_then(|s| s.parse::<ReviewVerdict>().ok());
    step == Some(Step::Review) && verdict == Some(ReviewVerdict::Approved)
}

fn failure_summary(results: &[TestResult]) -> String {
    results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| {
            let detail = if r.timed_out {
                format!("timed out after {:.0}s", r.runtime.as_secs_f64())
            } else if !r.stderr.trim().is_empty() {
                r.stderr.trim().to_string()
            } else {
                r.stdout.trim().to_string()
            };
            format!("{} `{}` failed:\n{}", r.kind, r.command, detail)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
