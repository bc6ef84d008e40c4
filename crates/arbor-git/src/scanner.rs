//! Task state reconstruction from commit history
//!
//! The scanner never holds state of its own: every question about task
//! progress is answered by reading the ref's history and parsing trailers.
//! The most recent matching commit (commit-graph order, not wall-clock) is
//! authoritative for a task.

use crate::command::GitExecutor;
use crate::repo::{CommitEntry, GitRepo};
use crate::trailer::{keys, parse_subject, parse_trailers, ReviewVerdict, Step, StepOutcome, Trailers};
use arbor_core::{Result, TaskState, TaskTree};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Reads task progress back out of commit history
pub struct StateScanner<E: GitExecutor> {
    repo: GitRepo<E>,
}

impl<E: GitExecutor> StateScanner<E> {
    pub fn new(executor: E) -> Self {
        Self {
            repo: GitRepo::new(executor),
        }
    }

    /// Ids of all leaf tasks whose most recent commit records complete/pass
    ///
    /// One log read serves every leaf; a task is complete iff its
    /// authoritative commit carries `Step: complete` and `Result: pass`.
    #[instrument(skip(self, tree))]
    pub async fn scan_completed_tasks(
        &self,
        tree: &TaskTree,
        ref_name: &str,
    ) -> Result<HashSet<String>> {
        let log = self.repo.log(ref_name).await?;
        let mut completed = HashSet::new();

        for task_id in tree.execution_order() {
            if let Some(entry) = latest_for_task(&log, task_id) {
                let trailers = parse_trailers(&entry.message);
                if task_state_from_trailers(&trailers) == TaskState::Complete {
                    completed.insert(task_id.clone());
                }
            }
        }

        debug!(
            "{} of {} leaf tasks complete",
            completed.len(),
            tree.execution_order().len()
        );
        Ok(completed)
    }

    /// Trailers of the single most recent commit for a task, or empty
    pub async fn get_task_trailers(&self, ref_name: &str, task_id: &str) -> Result<Trailers> {
        let log = self.repo.log(ref_name).await?;

        Ok(latest_for_task(&log, task_id)
            .map(|entry| parse_trailers(&entry.message))
            .unwrap_or_default())
    }

    /// Derived state of a task from its authoritative commit
    pub async fn task_state(&self, ref_name: &str, task_id: &str) -> Result<TaskState> {
        let trailers = self.get_task_trailers(ref_name, task_id).await?;
        Ok(task_state_from_trailers(&trailers))
    }
}

/// Most recent commit whose subject names the task, if any
fn latest_for_task<'a>(log: &'a [CommitEntry], task_id: &str) -> Option<&'a CommitEntry> {
    log.iter().find(|entry| {
        parse_subject(&entry.subject).is_some_and(|parts| parts.task_id == task_id)
    })
}

/// Pure decision table mapping a trailer set to a task state
///
/// Total over all inputs: trailer sets outside the documented table degrade
/// to Pending, so a malformed history row re-enters the state machine at the
/// implement step instead of wedging the scheduler.
pub fn task_state_from_trailers(trailers: &Trailers) -> TaskState {
    let step = trailers
        .get(keys::STEP)
        .and_then(|s| s.parse::<Step>().ok());

    let outcome = |key: &str| {
        trailers
            .get(key)
            .and_then(|s| s.parse::<StepOutcome>().ok())
    };

    match step {
        None => TaskState::Pending,
        Some(Step::Implement) => match outcome(keys::RESULT) {
            Some(StepOutcome::Pass) => TaskState::Testing,
            Some(StepOutcome::Fail) => TaskState::Implementing,
            None => TaskState::Pending,
        },
        Some(Step::Test) => match outcome(keys::TEST) {
            Some(StepOutcome::Pass) => TaskState::Reviewing,
            Some(StepOutcome::Fail) => TaskState::Implementing,
            None => TaskState::Pending,
        },
        Some(Step::Review) => {
            let verdict = trailers
                .get(keys::REVIEW)
                .and_then(|s| s.parse::<ReviewVerdict>().ok());
            match verdict {
                // Approved but not yet completed: the complete commit is
                // still owed, so the task remains in the reviewing stage
                Some(ReviewVerdict::Approved) => TaskState::Reviewing,
                Some(ReviewVerdict::Rejected) => TaskState::Implementing,
                None => TaskState::Pending,
            }
        }
        Some(Step::Complete) => match outcome(keys::RESULT) {
            Some(StepOutcome::Pass) => TaskState::Complete,
            Some(StepOutcome::Fail) => TaskState::Failed,
            None => TaskState::Pending,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::InMemoryGit;
    use crate::trailer::format_commit_message;
    use arbor_core::TaskNode;

    fn trailers_of(pairs: &[(&str, &str)]) -> Trailers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn two_task_tree() -> TaskTree {
        TaskTree::new(vec![
            TaskNode::new("T001", "first"),
            TaskNode::new("T002", "second")
                .with_depends_on(vec!["T001".to_string()]),
        ])
        .unwrap()
    }

    #[test]
    fn test_decision_table() {
        let cases: Vec<(Vec<(&str, &str)>, TaskState)> = vec![
            (vec![], TaskState::Pending),
            (
                vec![("Step", "implement"), ("Result", "fail")],
                TaskState::Implementing,
            ),
            (
                vec![("Step", "implement"), ("Result", "pass")],
                TaskState::Testing,
            ),
            (
                vec![("Step", "test"), ("Test", "fail")],
                TaskState::Implementing,
            ),
            (
                vec![("Step", "test"), ("Test", "pass")],
                TaskState::Reviewing,
            ),
            (
                vec![("Step", "review"), ("Review", "rejected")],
                TaskState::Implementing,
            ),
            (
                vec![("Step", "review"), ("Review", "approved")],
                TaskState::Reviewing,
            ),
            (
                vec![("Step", "complete"), ("Result", "pass")],
                TaskState::Complete,
            ),
            (
                vec![("Step", "complete"), ("Result", "fail")],
                TaskState::Failed,
            ),
        ];

        for (pairs, expected) in cases {
            let state = task_state_from_trailers(&trailers_of(&pairs));
            assert_eq!(state, expected, "for trailers {:?}", pairs);
        }
    }

    #[test]
    fn test_review_rejected_never_maps_to_complete() {
        let trailers = trailers_of(&[
            ("Step", "review"),
            ("Review", "rejected"),
            ("Retry", "1"),
        ]);
        assert_ne!(task_state_from_trailers(&trailers), TaskState::Complete);
    }

    #[test]
    fn test_undocumented_rows_degrade_to_pending() {
        for pairs in [
            vec![("Step", "implement")],
            vec![("Step", "test"), ("Test", "maybe")],
            vec![("Step", "launch")],
            vec![("Retry", "3")],
        ] {
            assert_eq!(
                task_state_from_trailers(&trailers_of(&pairs)),
                TaskState::Pending,
                "for trailers {:?}",
                pairs
            );
        }
    }

    #[tokio::test]
    async fn test_scan_completed_tasks() {
        let git = InMemoryGit::new();
        git.push_commit(&format_commit_message(
            "main",
            "T001",
            Step::Complete,
            "done",
            None,
            &[
                (keys::STEP, "complete".to_string()),
                (keys::RESULT, "pass".to_string()),
            ],
        ));

        let scanner = StateScanner::new(git);
        let completed = scanner
            .scan_completed_tasks(&two_task_tree(), "main")
            .await
            .unwrap();

        assert!(completed.contains("T001"));
        assert!(!completed.contains("T002"));
    }

    #[tokio::test]
    async fn test_most_recent_commit_wins() {
        let git = InMemoryGit::new();
        // Older complete/pass followed by... nothing newer: complete
        git.push_commit(&format_commit_message(
            "main",
            "T001",
            Step::Test,
            "tests failed",
            None,
            &[
                (keys::STEP, "test".to_string()),
                (keys::TEST, "fail".to_string()),
            ],
        ));
        git.push_commit(&format_commit_message(
            "main",
            "T001",
            Step::Complete,
            "done",
            None,
            &[
                (keys::STEP, "complete".to_string()),
                (keys::RESULT, "pass".to_string()),
            ],
        ));

        let scanner = StateScanner::new(git);
        let state = scanner.task_state("main", "T001").await.unwrap();
        assert_eq!(state, TaskState::Complete);
    }

    #[tokio::test]
    async fn test_unknown_task_has_empty_trailers() {
        let scanner = StateScanner::new(InMemoryGit::new());
        let trailers = scanner.get_task_trailers("main", "T999").await.unwrap();
        assert!(trailers.is_empty());
        assert_eq!(
            scanner.task_state("main", "T999").await.unwrap(),
            TaskState::Pending
        );
    }
}
