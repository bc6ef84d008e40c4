//! The scheduling loop
//!
//! Repeatedly invokes the single-task executor until nothing is ready or a
//! task fails. The loop adds no semantics of its own: N external executor
//! invocations over an N-task tree produce an identical final state and
//! completion order to one scheduler run.

use crate::garden::Garden;
use arbor_core::{Result, SchedulerResult, TaskTree};
use arbor_git::GitExecutor;
use tracing::{info, instrument, warn};

/// Drives the executor until the tree is done or a task fails
pub struct Gardener<E: GitExecutor + Clone> {
    garden: Garden<E>,
}

impl<E: GitExecutor + Clone> Gardener<E> {
    pub fn new(garden: Garden<E>) -> Self {
        Self { garden }
    }

    /// Run tasks to completion
    ///
    /// "no ready task" ends the loop with success and the accumulated
    /// completion order. Any other failure stops the loop immediately and
    /// propagates with partial progress. Environment errors from the
    /// executor propagate unmodified.
    #[instrument(skip(self, tree))]
    pub async fn run(&self, tree: &TaskTree) -> Result<SchedulerResult> {
        let mut order: Vec<String> = Vec::new();

        loop {
            let result = self.garden.run(tree).await?;

            if result.is_no_ready_task() {
                info!("Scheduler done: {} tasks completed", order.len());
                return Ok(SchedulerResult {
                    success: true,
                    tasks_completed: order.len(),
                    order,
                    error: None,
                });
            }

            if !result.success {
                warn!(
                    "Scheduler stopping after failure: {:?} ({} tasks completed)",
                    result.error,
                    order.len()
                );
                return Ok(SchedulerResult {
                    success: false,
                    tasks_completed: order.len(),
                    order,
                    error: result.error,
                });
            }

            if let Some(task_id) = result.task_id {
                info!("Completed {}", task_id);
                order.push(task_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garden::GardenConfig;
    use arbor_agent::ScriptedRunner;
    use arbor_core::TaskNode;
    use arbor_git::{InMemoryGit, StateScanner};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn two_task_tree() -> TaskTree {
        TaskTree::new(vec![
            TaskNode::new("T001", "first"),
            TaskNode::new("T002", "second").with_depends_on(vec!["T001".to_string()]),
        ])
        .unwrap()
    }

    fn test_config(dir: &TempDir) -> GardenConfig {
        GardenConfig::new(dir.path().join("reports"), dir.path().join("logs"))
            .with_fallback_test_command("true")
            .with_max_retries(2)
    }

    fn make_garden(
        git: InMemoryGit,
        implementer: ScriptedRunner,
        reviewer: ScriptedRunner,
        config: GardenConfig,
    ) -> Garden<InMemoryGit> {
        Garden::new(git, ".", Arc::new(implementer), Arc::new(reviewer), config)
    }

    #[tokio::test]
    async fn test_dependent_pair_completes_in_order() {
        let dir = TempDir::new().unwrap();
        let git = InMemoryGit::new();
        let gardener = Gardener::new(make_garden(
            git.clone(),
            ScriptedRunner::always("implemented"),
            ScriptedRunner::always("APPROVED"),
            test_config(&dir),
        ));

        let result = gardener.run(&two_task_tree()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.tasks_completed, 2);
        assert_eq!(result.order, vec!["T001", "T002"]);
        assert!(result.error.is_none());

        // Both tasks reached complete/pass in history
        let scanner = StateScanner::new(git);
        let completed = scanner
            .scan_completed_tasks(&two_task_tree(), "main")
            .await
            .unwrap();
        assert!(completed.contains("T001"));
        assert!(completed.contains("T002"));
    }

    #[tokio::test]
    async fn test_empty_tree_is_immediate_success() {
        let dir = TempDir::new().unwrap();
        let gardener = Gardener::new(make_garden(
            InMemoryGit::new(),
            ScriptedRunner::always("unused"),
            ScriptedRunner::always("unused"),
            test_config(&dir),
        ));

        let tree = TaskTree::new(Vec::new()).unwrap();
        let result = gardener.run(&tree).await.unwrap();

        assert!(result.success);
        assert_eq!(result.tasks_completed, 0);
        assert!(result.order.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_task_stops_loop_with_failure() {
        let dir = TempDir::new().unwrap();
        let git = InMemoryGit::new();
        let gardener = Gardener::new(make_garden(
            git.clone(),
            ScriptedRunner::always("implemented"),
            ScriptedRunner::always("Rejected: does not compile"),
            test_config(&dir),
        ));

        let result = gardener.run(&two_task_tree()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.tasks_completed, 0);
        assert!(result.error.unwrap().contains("2 retries"));
    }

    #[tokio::test]
    async fn test_failure_preserves_partial_progress() {
        let dir = TempDir::new().unwrap();
        let git = InMemoryGit::new();
        // First review (T001) approves, every later review rejects
        let reviewer = ScriptedRunner::new()
            .with_result(arbor_agent::RunResult::ok("APPROVED"))
            .with_result(arbor_agent::RunResult::ok("Rejected: missing tests"));

        let gardener = Gardener::new(make_garden(
            git.clone(),
            ScriptedRunner::always("implemented"),
            reviewer,
            test_config(&dir),
        ));

        let result = gardener.run(&two_task_tree()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.tasks_completed, 1);
        assert_eq!(result.order, vec!["T001"]);
        assert!(result.error.unwrap().contains("2 retries"));
    }

    #[tokio::test]
    async fn test_scheduler_equals_external_executor_loop() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();

        // One scheduler run...
        let git_a = InMemoryGit::new();
        let gardener = Gardener::new(make_garden(
            git_a.clone(),
            ScriptedRunner::always("implemented"),
            ScriptedRunner::always("APPROVED"),
            test_config(&dir_a),
        ));
        let scheduled = gardener.run(&two_task_tree()).await.unwrap();

        // ...versus invoking the executor externally until nothing is ready
        let git_b = InMemoryGit::new();
        let garden = make_garden(
            git_b.clone(),
            ScriptedRunner::always("implemented"),
            ScriptedRunner::always("APPROVED"),
            test_config(&dir_b),
        );
        let mut external_order = Vec::new();
        loop {
            let result = garden.run(&two_task_tree()).await.unwrap();
            if result.is_no_ready_task() {
                break;
            }
            assert!(result.success);
            external_order.push(result.task_id.unwrap());
        }

        assert_eq!(scheduled.order, external_order);

        // Identical completed sets and per-task terminal states
        let completed_a = StateScanner::new(git_a)
            .scan_completed_tasks(&two_task_tree(), "main")
            .await
            .unwrap();
        let completed_b = StateScanner::new(git_b)
            .scan_completed_tasks(&two_task_tree(), "main")
            .await
            .unwrap();
        assert_eq!(completed_a, completed_b);
    }

    #[tokio::test]
    async fn test_resumes_across_scheduler_invocations() {
        let dir = TempDir::new().unwrap();
        let git = InMemoryGit::new();

        // First scheduler run fails on T002
        let reviewer = ScriptedRunner::new()
            .with_result(arbor_agent::RunResult::ok("APPROVED"))
            .with_result(arbor_agent::RunResult::ok("Rejected: broken"));
        let gardener = Gardener::new(make_garden(
            git.clone(),
            ScriptedRunner::always("implemented"),
            reviewer,
            test_config(&dir),
        ));
        let first = gardener.run(&two_task_tree()).await.unwrap();
        assert!(!first.success);
        assert_eq!(first.order, vec!["T001"]);

        // A fresh scheduler against the same history does not redo T001;
        // it reports the already-failed T002 without new terminal commits
        let before = git.messages().len();
        let gardener = Gardener::new(make_garden(
            git.clone(),
            ScriptedRunner::always("implemented"),
            ScriptedRunner::always("APPROVED"),
            test_config(&dir),
        ));
        let second = gardener.run(&two_task_tree()).await.unwrap();

        assert!(!second.success);
        assert_eq!(second.tasks_completed, 0);
        assert!(second.error.unwrap().contains("already failed"));
        assert_eq!(git.messages().len(), before);
    }
}
